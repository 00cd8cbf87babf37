use super::{BillingError, BillingProvider};
use crate::models::{
    Customer, Invoice, InvoiceItem, InvoiceStatus, NewCustomer, NewInvoice, NewInvoiceItem,
};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

/// A call received by [`MockBillingProvider`], in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderCall {
    ListCustomers { email: String },
    CreateCustomer(NewCustomer),
    CreateInvoiceItem(NewInvoiceItem),
    CreateInvoice(NewInvoice),
    SendInvoice { invoice_id: String },
}

#[derive(Default)]
struct MockState {
    customers: Vec<Customer>,
    invoices: HashMap<String, Invoice>,
    calls: Vec<ProviderCall>,
}

/// In-memory billing provider for local runs and tests.
///
/// Never leaves the process. Failures can be injected per operation. Built
/// with [`MockBillingProvider::new`] it records every call and keeps every
/// record; [`MockBillingProvider::fallback`] keeps nothing past the invoice
/// send, so it can serve traffic for the life of the process.
pub struct MockBillingProvider {
    state: Mutex<MockState>,
    retain_history: bool,
    next_id: AtomicU64,
    failing_descriptions: HashSet<String>,
    fail_customer_lookup: bool,
    fail_invoice_creation: bool,
    fail_send: bool,
    sent_status: InvoiceStatus,
}

impl Default for MockBillingProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBillingProvider {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState::default()),
            retain_history: true,
            next_id: AtomicU64::new(1),
            failing_descriptions: HashSet::new(),
            fail_customer_lookup: false,
            fail_invoice_creation: false,
            fail_send: false,
            sent_status: InvoiceStatus::Open,
        }
    }

    /// Stand-in used when no billing credentials are configured.
    pub fn fallback() -> Self {
        Self {
            retain_history: false,
            ..Self::new()
        }
    }

    /// Seed an existing customer returned by email lookups.
    pub fn with_customer(self, id: &str, email: &str) -> Self {
        self.lock().customers.push(Customer {
            id: id.to_string(),
            email: Some(email.to_string()),
            metadata: Default::default(),
        });
        self
    }

    /// Fail line item creation for items with this description.
    pub fn failing_item(mut self, description: &str) -> Self {
        self.failing_descriptions.insert(description.to_string());
        self
    }

    pub fn failing_customer_lookup(mut self) -> Self {
        self.fail_customer_lookup = true;
        self
    }

    pub fn failing_invoice_creation(mut self) -> Self {
        self.fail_invoice_creation = true;
        self
    }

    pub fn failing_send(mut self) -> Self {
        self.fail_send = true;
        self
    }

    /// Status reported by `send_invoice`. Defaults to `open`.
    pub fn with_sent_status(mut self, status: InvoiceStatus) -> Self {
        self.sent_status = status;
        self
    }

    pub fn calls(&self) -> Vec<ProviderCall> {
        self.lock().calls.clone()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record(&self, call: ProviderCall) {
        if self.retain_history {
            self.lock().calls.push(call);
        }
    }

    fn next_id(&self, prefix: &str) -> String {
        format!("{}_mock_{}", prefix, self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    fn rejected(message: &str) -> BillingError {
        BillingError::Api {
            status: 402,
            code: "mock_failure".to_string(),
            message: message.to_string(),
        }
    }
}

#[async_trait]
impl BillingProvider for MockBillingProvider {
    async fn list_customers_by_email(&self, email: &str) -> Result<Vec<Customer>, BillingError> {
        self.record(ProviderCall::ListCustomers {
            email: email.to_string(),
        });

        if self.fail_customer_lookup {
            return Err(Self::rejected("customer lookup failed"));
        }

        Ok(self
            .lock()
            .customers
            .iter()
            .filter(|c| c.email.as_deref() == Some(email))
            .cloned()
            .collect())
    }

    async fn create_customer(&self, customer: &NewCustomer) -> Result<Customer, BillingError> {
        self.record(ProviderCall::CreateCustomer(customer.clone()));

        let created = Customer {
            id: self.next_id("cus"),
            email: Some(customer.email.clone()),
            metadata: customer.metadata.clone(),
        };
        if self.retain_history {
            self.lock().customers.push(created.clone());
        }

        tracing::info!(customer_id = %created.id, "[MOCK] Customer would be created");
        Ok(created)
    }

    async fn create_invoice_item(
        &self,
        item: &NewInvoiceItem,
    ) -> Result<InvoiceItem, BillingError> {
        self.record(ProviderCall::CreateInvoiceItem(item.clone()));

        if self.failing_descriptions.contains(&item.description) {
            return Err(Self::rejected("invoice item rejected"));
        }

        Ok(InvoiceItem {
            id: self.next_id("ii"),
            customer: item.customer.clone(),
            amount: item.amount,
            currency: item.currency.clone(),
            description: Some(item.description.clone()),
        })
    }

    async fn create_invoice(&self, invoice: &NewInvoice) -> Result<Invoice, BillingError> {
        self.record(ProviderCall::CreateInvoice(invoice.clone()));

        if self.fail_invoice_creation {
            return Err(Self::rejected("invoice creation failed"));
        }

        let created = Invoice {
            id: self.next_id("in"),
            customer: invoice.customer.clone(),
            status: Some(InvoiceStatus::Draft),
            hosted_invoice_url: None,
            collection_method: Some(invoice.collection_method),
        };
        self.lock()
            .invoices
            .insert(created.id.clone(), created.clone());
        Ok(created)
    }

    async fn send_invoice(&self, invoice_id: &str) -> Result<Invoice, BillingError> {
        self.record(ProviderCall::SendInvoice {
            invoice_id: invoice_id.to_string(),
        });

        if self.fail_send {
            return Err(Self::rejected("invoice could not be sent"));
        }

        let mut state = self.lock();
        let stored = if self.retain_history {
            state.invoices.get(invoice_id).cloned()
        } else {
            state.invoices.remove(invoice_id)
        };
        let mut invoice = stored.ok_or_else(|| BillingError::Api {
            status: 404,
            code: "resource_missing".to_string(),
            message: format!("No such invoice: {}", invoice_id),
        })?;
        invoice.status = Some(self.sent_status);
        invoice.hosted_invoice_url = Some(format!("https://invoice.mock/{}", invoice_id));

        if self.retain_history {
            state
                .invoices
                .insert(invoice.id.clone(), invoice.clone());
        }

        tracing::info!(invoice_id = %invoice_id, "[MOCK] Invoice would be sent");
        Ok(invoice)
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}
