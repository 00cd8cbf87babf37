//! Stripe billing provider client.
//!
//! Talks to the Customers, Invoice Items and Invoices endpoints of the Stripe
//! REST API. Requests are form-encoded and authenticated with the secret key;
//! every request carries the pinned `Stripe-Version` header.

use super::{BillingError, BillingProvider};
use crate::config::StripeConfig;
use crate::models::{Customer, Invoice, InvoiceItem, NewCustomer, NewInvoice, NewInvoiceItem};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use serde::Deserialize;

const STRIPE_VERSION_HEADER: &str = "Stripe-Version";

/// Stripe client for the invoicing endpoints.
#[derive(Clone)]
pub struct StripeClient {
    client: Client,
    config: StripeConfig,
}

/// Paginated list envelope.
#[derive(Debug, Deserialize)]
struct StripeList<T> {
    data: Vec<T>,
    #[serde(default)]
    has_more: bool,
}

/// Stripe API error response.
#[derive(Debug, Deserialize)]
pub struct StripeError {
    pub error: StripeErrorDetail,
}

#[derive(Debug, Deserialize)]
pub struct StripeErrorDetail {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub code: Option<String>,
    pub message: Option<String>,
    pub param: Option<String>,
}

impl StripeClient {
    pub fn new(config: StripeConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    /// Check if a secret key is set.
    pub fn is_configured(&self) -> bool {
        !self.config.secret_key.expose_secret().is_empty()
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.api_base_url.trim_end_matches('/'), path)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .bearer_auth(self.config.secret_key.expose_secret())
            .header(STRIPE_VERSION_HEADER, &self.config.api_version)
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, BillingError> {
        if !self.is_configured() {
            return Err(BillingError::NotConfigured(
                "Stripe secret key not set".to_string(),
            ));
        }

        let response = self
            .authorized(self.client.get(self.url(path)))
            .query(query)
            .send()
            .await?;

        Self::read_response(response, path).await
    }

    async fn post_form<T: DeserializeOwned>(
        &self,
        path: &str,
        form: &[(String, String)],
    ) -> Result<T, BillingError> {
        if !self.is_configured() {
            return Err(BillingError::NotConfigured(
                "Stripe secret key not set".to_string(),
            ));
        }

        let response = self
            .authorized(self.client.post(self.url(path)))
            .form(form)
            .send()
            .await?;

        Self::read_response(response, path).await
    }

    async fn read_response<T: DeserializeOwned>(
        response: reqwest::Response,
        path: &str,
    ) -> Result<T, BillingError> {
        let status = response.status();
        let body = response.text().await?;

        tracing::debug!(status = %status, path = %path, "Stripe response");

        if status.is_success() {
            Ok(serde_json::from_str(&body)?)
        } else {
            let error = parse_error(status.as_u16(), &body);
            tracing::error!(
                status = status.as_u16(),
                path = %path,
                error = %error,
                "Stripe request failed"
            );
            Err(error)
        }
    }
}

fn parse_error(status: u16, body: &str) -> BillingError {
    match serde_json::from_str::<StripeError>(body) {
        Ok(StripeError { error }) => BillingError::Api {
            status,
            code: error
                .code
                .or(error.kind)
                .unwrap_or_else(|| "unknown".to_string()),
            message: match error.param {
                Some(param) => format!("{} (param: {})", error.message.unwrap_or_default(), param),
                None => error.message.unwrap_or_default(),
            },
        },
        Err(_) => BillingError::Api {
            status,
            code: "unknown".to_string(),
            message: body.to_string(),
        },
    }
}

fn customer_form(customer: &NewCustomer) -> Vec<(String, String)> {
    let mut form = vec![("email".to_string(), customer.email.clone())];
    let mut metadata: Vec<_> = customer.metadata.iter().collect();
    metadata.sort();
    form.extend(
        metadata
            .into_iter()
            .map(|(key, value)| (format!("metadata[{}]", key), value.clone())),
    );
    form
}

fn invoice_item_form(item: &NewInvoiceItem) -> Vec<(String, String)> {
    vec![
        ("customer".to_string(), item.customer.clone()),
        ("amount".to_string(), item.amount.to_string()),
        ("currency".to_string(), item.currency.clone()),
        ("description".to_string(), item.description.clone()),
    ]
}

fn invoice_form(invoice: &NewInvoice) -> Vec<(String, String)> {
    vec![
        ("customer".to_string(), invoice.customer.clone()),
        (
            "collection_method".to_string(),
            invoice.collection_method.as_str().to_string(),
        ),
        (
            "days_until_due".to_string(),
            invoice.days_until_due.to_string(),
        ),
        ("auto_advance".to_string(), invoice.auto_advance.to_string()),
    ]
}

#[async_trait]
impl BillingProvider for StripeClient {
    async fn list_customers_by_email(&self, email: &str) -> Result<Vec<Customer>, BillingError> {
        let list: StripeList<Customer> = self.get("customers", &[("email", email)]).await?;
        if list.has_more {
            tracing::debug!(email = %email, "More than one page of customers share this email");
        }
        Ok(list.data)
    }

    async fn create_customer(&self, customer: &NewCustomer) -> Result<Customer, BillingError> {
        self.post_form("customers", &customer_form(customer)).await
    }

    async fn create_invoice_item(
        &self,
        item: &NewInvoiceItem,
    ) -> Result<InvoiceItem, BillingError> {
        self.post_form("invoiceitems", &invoice_item_form(item))
            .await
    }

    async fn create_invoice(&self, invoice: &NewInvoice) -> Result<Invoice, BillingError> {
        self.post_form("invoices", &invoice_form(invoice)).await
    }

    async fn send_invoice(&self, invoice_id: &str) -> Result<Invoice, BillingError> {
        self.post_form(&format!("invoices/{}/send", invoice_id), &[])
            .await
    }

    fn name(&self) -> &'static str {
        "stripe"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CollectionMethod;
    use secrecy::Secret;

    fn test_config(secret: &str) -> StripeConfig {
        StripeConfig {
            secret_key: Secret::new(secret.to_string()),
            api_base_url: "https://api.stripe.com/v1/".to_string(),
            api_version: "2019-12-03".to_string(),
        }
    }

    #[test]
    fn test_is_configured() {
        assert!(StripeClient::new(test_config("sk_test_123")).is_configured());
        assert!(!StripeClient::new(test_config("")).is_configured());
    }

    #[test]
    fn test_url_joins_without_double_slash() {
        let client = StripeClient::new(test_config("sk_test_123"));
        assert_eq!(
            client.url("invoices/in_1/send"),
            "https://api.stripe.com/v1/invoices/in_1/send"
        );
    }

    #[test]
    fn test_customer_form_nests_metadata() {
        let form = customer_form(&NewCustomer::with_provenance("a@example.com"));
        assert_eq!(form[0], ("email".to_string(), "a@example.com".to_string()));
        assert!(form
            .iter()
            .any(|(key, _)| key == "metadata[createdFrom]"));
    }

    #[test]
    fn test_invoice_form() {
        let form = invoice_form(&NewInvoice {
            customer: "cus_1".to_string(),
            collection_method: CollectionMethod::SendInvoice,
            days_until_due: 7,
            auto_advance: true,
        });
        assert!(form.contains(&("collection_method".to_string(), "send_invoice".to_string())));
        assert!(form.contains(&("days_until_due".to_string(), "7".to_string())));
        assert!(form.contains(&("auto_advance".to_string(), "true".to_string())));
    }

    #[test]
    fn test_parse_error_body() {
        let body = r#"{"error":{"type":"invalid_request_error","code":"resource_missing","message":"No such customer","param":"customer"}}"#;
        match parse_error(404, body) {
            BillingError::Api {
                status,
                code,
                message,
            } => {
                assert_eq!(status, 404);
                assert_eq!(code, "resource_missing");
                assert_eq!(message, "No such customer (param: customer)");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_parse_error_falls_back_to_raw_body() {
        match parse_error(500, "upstream exploded") {
            BillingError::Api { code, message, .. } => {
                assert_eq!(code, "unknown");
                assert_eq!(message, "upstream exploded");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unconfigured_client_refuses_calls() {
        let client = StripeClient::new(test_config(""));
        let result = client.list_customers_by_email("a@example.com").await;
        assert!(matches!(result, Err(BillingError::NotConfigured(_))));
    }
}
