//! Invoice request handling.
//!
//! One call to [`InvoiceRequestHandler::handle`] is one trigger invocation:
//! parse the record, find or create the customer, build the invoice and send
//! it. Nothing escapes as an error. Malformed records are skipped with a
//! warning and provider failures end the invocation after being logged, so the
//! trigger platform always sees the record as handled.

use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, instrument, warn, Span};

use crate::config::InvoiceSettings;
use crate::models::{Customer, InvoiceRequest, InvoiceStatus, NewCustomer};
use crate::services::billing::{BillingError, BillingProvider};
use crate::services::builder::build_invoice;
use crate::services::metrics;

/// What one invocation ended with.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InvocationOutcome {
    /// The record was not a usable invoice request. No remote calls were made.
    Skipped { reason: String },
    /// The invoice was sent and is open for payment.
    Sent {
        invoice_id: String,
        email: String,
        hosted_invoice_url: Option<String>,
    },
    /// The send call succeeded but the invoice is not `open`.
    SentWithStatus {
        invoice_id: String,
        status: Option<InvoiceStatus>,
    },
    /// Line items or the invoice could not be created.
    InvoiceNotCreated { customer_id: String },
    /// A provider call outside invoice assembly failed.
    Failed { error: String },
}

impl InvocationOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            InvocationOutcome::Skipped { .. } => "skipped",
            InvocationOutcome::Sent { .. } => "sent",
            InvocationOutcome::SentWithStatus { .. } => "sent_with_status",
            InvocationOutcome::InvoiceNotCreated { .. } => "invoice_not_created",
            InvocationOutcome::Failed { .. } => "failed",
        }
    }

    /// True when the invocation stopped because of a provider failure.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            InvocationOutcome::InvoiceNotCreated { .. } | InvocationOutcome::Failed { .. }
        )
    }
}

#[derive(Clone)]
pub struct InvoiceRequestHandler {
    provider: Arc<dyn BillingProvider>,
    days_until_due: u32,
}

impl InvoiceRequestHandler {
    pub fn new(provider: Arc<dyn BillingProvider>, settings: &InvoiceSettings) -> Self {
        Self {
            provider,
            days_until_due: settings.days_until_due,
        }
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    /// Handle the text content of one newly created trigger record.
    #[instrument(
        skip(self, payload),
        fields(
            service = "invoice-sender-service",
            email,
            customer_id,
            invoice_id
        )
    )]
    pub async fn handle(&self, payload: &str) -> InvocationOutcome {
        let outcome = match InvoiceRequest::parse(payload) {
            Ok(request) => {
                Span::current().record("email", request.email.as_str());
                match self.process(&request).await {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        error!(
                            provider = self.provider.name(),
                            email = %request.email,
                            error = %e,
                            "Billing provider error while handling invoice request"
                        );
                        InvocationOutcome::Failed {
                            error: e.to_string(),
                        }
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, payload_len = payload.len(), "Malformed payload, skipping");
                InvocationOutcome::Skipped {
                    reason: e.to_string(),
                }
            }
        };

        metrics::record_request(outcome.label());
        outcome
    }

    async fn process(&self, request: &InvoiceRequest) -> Result<InvocationOutcome, BillingError> {
        info!(items = request.items.len(), "Invoice request started");

        let customer = self.resolve_customer(&request.email).await?;
        Span::current().record("customer_id", customer.id.as_str());

        let invoice = match build_invoice(
            self.provider.as_ref(),
            &customer,
            &request.items,
            self.days_until_due,
        )
        .await
        {
            Some(invoice) => invoice,
            None => {
                error!(
                    customer_id = %customer.id,
                    email = %request.email,
                    items = request.items.len(),
                    "Invoice was not created, nothing sent"
                );
                return Ok(InvocationOutcome::InvoiceNotCreated {
                    customer_id: customer.id,
                });
            }
        };
        Span::current().record("invoice_id", invoice.id.as_str());

        let sent = self.provider.send_invoice(&invoice.id).await?;

        if sent.status == Some(InvoiceStatus::Open) {
            info!(
                invoice_id = %sent.id,
                email = %request.email,
                hosted_invoice_url = sent.hosted_invoice_url.as_deref().unwrap_or("-"),
                "Invoice sent"
            );
            Ok(InvocationOutcome::Sent {
                invoice_id: sent.id,
                email: request.email.clone(),
                hosted_invoice_url: sent.hosted_invoice_url,
            })
        } else {
            tracing::debug!(
                invoice_id = %sent.id,
                status = sent.status.map(|s| s.as_str()).unwrap_or("none"),
                "Invoice send returned a non-open status"
            );
            Ok(InvocationOutcome::SentWithStatus {
                invoice_id: sent.id,
                status: sent.status,
            })
        }
    }

    /// First customer with this email, or a new one stamped with provenance.
    async fn resolve_customer(&self, email: &str) -> Result<Customer, BillingError> {
        let existing = self.provider.list_customers_by_email(email).await?;

        if let Some(customer) = existing.into_iter().next() {
            info!(customer_id = %customer.id, email = %email, "Customer retrieved");
            return Ok(customer);
        }

        let customer = self
            .provider
            .create_customer(&NewCustomer::with_provenance(email))
            .await?;
        info!(customer_id = %customer.id, "Customer created");
        Ok(customer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::billing::MockBillingProvider;

    #[test]
    fn failure_outcomes() {
        assert!(InvocationOutcome::Failed {
            error: "x".to_string()
        }
        .is_failure());
        assert!(InvocationOutcome::InvoiceNotCreated {
            customer_id: "cus_1".to_string()
        }
        .is_failure());
        assert!(!InvocationOutcome::Skipped {
            reason: "x".to_string()
        }
        .is_failure());
    }

    #[test]
    fn outcome_serializes_with_kind_tag() {
        let value = serde_json::to_value(InvocationOutcome::SentWithStatus {
            invoice_id: "in_1".to_string(),
            status: Some(InvoiceStatus::Paid),
        })
        .unwrap();
        assert_eq!(value["kind"], "sent_with_status");
        assert_eq!(value["status"], "paid");
    }

    #[tokio::test]
    async fn non_json_payload_is_skipped_without_calls() {
        let provider = Arc::new(MockBillingProvider::new());
        let handler = InvoiceRequestHandler::new(provider.clone(), &InvoiceSettings::default());

        let outcome = handler.handle("{not json").await;

        assert_eq!(outcome.label(), "skipped");
        assert!(provider.calls().is_empty());
    }
}
