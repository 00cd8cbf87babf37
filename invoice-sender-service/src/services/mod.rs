pub mod billing;
pub mod builder;
pub mod handler;
pub mod metrics;

pub use billing::{BillingError, BillingProvider, MockBillingProvider, StripeClient};
pub use handler::{InvocationOutcome, InvoiceRequestHandler};
pub use metrics::{get_metrics, init_metrics};
