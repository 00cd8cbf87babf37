//! Invoice request payload and billing provider resources.
//!
//! `InvoiceRequest` is what a trigger record decodes to. Everything else here
//! mirrors a remote billing resource; this service owns none of them and only
//! keeps the references returned by the provider for the length of one
//! invocation.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use validator::Validate;

/// Metadata key stamped on customers created by this service.
pub const PROVENANCE_KEY: &str = "createdFrom";

/// Metadata value stamped on customers created by this service.
pub const PROVENANCE_NOTE: &str = "Created by invoice-sender-service";

/// Parsed trigger payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct InvoiceRequest {
    /// Email of the payer. Used to look up or create the customer.
    #[validate(length(min = 1))]
    pub email: String,
    /// Billable lines, in the order they appeared in the record.
    #[validate(length(min = 1))]
    pub items: Vec<OrderItem>,
}

/// One billable line of an invoice request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    /// Amount in the smallest currency unit (cents for USD).
    pub amount: i64,
    /// ISO currency code, passed to the provider verbatim.
    pub currency: String,
    pub description: String,
}

/// Why a payload was rejected before any remote call was made.
#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    #[error("payload is not a valid invoice request: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("payload failed validation: {0}")]
    Invalid(#[from] validator::ValidationErrors),
}

impl InvoiceRequest {
    /// Decode and validate the text content of a trigger record.
    ///
    /// Fails when the text is not JSON, when `email` or `items` is missing,
    /// or when either of them is empty.
    pub fn parse(payload: &str) -> Result<Self, PayloadError> {
        let request: InvoiceRequest = serde_json::from_str(payload)?;
        request.validate()?;
        Ok(request)
    }
}

/// Customer record held by the billing provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Line item attached to a customer, waiting to be pulled into an invoice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceItem {
    pub id: String,
    pub customer: String,
    pub amount: i64,
    pub currency: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Invoice lifecycle status as reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Draft,
    /// Issued and awaiting payment.
    Open,
    Paid,
    Uncollectible,
    Void,
    #[serde(other)]
    Unknown,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "draft",
            InvoiceStatus::Open => "open",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Uncollectible => "uncollectible",
            InvoiceStatus::Void => "void",
            InvoiceStatus::Unknown => "unknown",
        }
    }
}

/// How the provider collects payment for an invoice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionMethod {
    /// Email the invoice and let the customer pay out of band.
    SendInvoice,
    ChargeAutomatically,
}

impl CollectionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            CollectionMethod::SendInvoice => "send_invoice",
            CollectionMethod::ChargeAutomatically => "charge_automatically",
        }
    }
}

/// Invoice record held by the billing provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: String,
    pub customer: String,
    #[serde(default)]
    pub status: Option<InvoiceStatus>,
    #[serde(default)]
    pub hosted_invoice_url: Option<String>,
    #[serde(default)]
    pub collection_method: Option<CollectionMethod>,
}

/// Customer creation parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct NewCustomer {
    pub email: String,
    pub metadata: HashMap<String, String>,
}

impl NewCustomer {
    /// A customer carrying only an email and the provenance annotation.
    pub fn with_provenance(email: &str) -> Self {
        let mut metadata = HashMap::new();
        metadata.insert(PROVENANCE_KEY.to_string(), PROVENANCE_NOTE.to_string());
        Self {
            email: email.to_string(),
            metadata,
        }
    }
}

/// Line item creation parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct NewInvoiceItem {
    pub customer: String,
    pub amount: i64,
    pub currency: String,
    pub description: String,
}

impl NewInvoiceItem {
    pub fn for_customer(customer: &Customer, item: &OrderItem) -> Self {
        Self {
            customer: customer.id.clone(),
            amount: item.amount,
            currency: item.currency.clone(),
            description: item.description.clone(),
        }
    }
}

/// Invoice creation parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct NewInvoice {
    pub customer: String,
    pub collection_method: CollectionMethod,
    pub days_until_due: u32,
    pub auto_advance: bool,
}
