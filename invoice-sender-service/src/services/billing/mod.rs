pub mod mock;
pub mod stripe;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{Customer, Invoice, InvoiceItem, NewCustomer, NewInvoice, NewInvoiceItem};

pub use mock::{MockBillingProvider, ProviderCall};
pub use stripe::StripeClient;

#[derive(Debug, Error)]
pub enum BillingError {
    #[error("Billing provider not configured: {0}")]
    NotConfigured(String),

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Provider returned {status}: {code} - {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    #[error("Unexpected provider response: {0}")]
    Decode(#[from] serde_json::Error),
}

/// The slice of the billing provider's API this service drives.
#[async_trait]
pub trait BillingProvider: Send + Sync {
    async fn list_customers_by_email(&self, email: &str) -> Result<Vec<Customer>, BillingError>;

    async fn create_customer(&self, customer: &NewCustomer) -> Result<Customer, BillingError>;

    async fn create_invoice_item(
        &self,
        item: &NewInvoiceItem,
    ) -> Result<InvoiceItem, BillingError>;

    /// Creates an invoice pulling in every pending line item of the customer.
    async fn create_invoice(&self, invoice: &NewInvoice) -> Result<Invoice, BillingError>;

    /// Finalizes and emails the invoice to the customer.
    async fn send_invoice(&self, invoice_id: &str) -> Result<Invoice, BillingError>;

    fn name(&self) -> &'static str;
}
