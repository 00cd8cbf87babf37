//! Invoice assembly: line items first, then the invoice that aggregates them.

use futures::future::join_all;

use crate::models::{CollectionMethod, Customer, Invoice, NewInvoice, NewInvoiceItem, OrderItem};
use crate::services::billing::BillingProvider;
use crate::services::metrics;

/// Creates one line item per order item, then an invoice for the customer.
///
/// Line items are created concurrently and all of them must succeed before the
/// invoice is requested, because the provider pulls every pending item of the
/// customer into the new invoice. Returns `None` on any provider failure;
/// line items that were created before the failure stay on the customer.
pub async fn build_invoice(
    provider: &dyn BillingProvider,
    customer: &Customer,
    items: &[OrderItem],
    days_until_due: u32,
) -> Option<Invoice> {
    let requests: Vec<NewInvoiceItem> = items
        .iter()
        .map(|item| NewInvoiceItem::for_customer(customer, item))
        .collect();

    let results = join_all(
        requests
            .iter()
            .map(|request| provider.create_invoice_item(request)),
    )
    .await;

    let mut created = Vec::with_capacity(results.len());
    let mut first_error = None;
    let mut failed = 0usize;
    for result in results {
        match result {
            Ok(item) => created.push(item),
            Err(e) => {
                failed += 1;
                first_error.get_or_insert(e);
            }
        }
    }

    if let Some(e) = first_error {
        let orphaned: Vec<&str> = created.iter().map(|item| item.id.as_str()).collect();
        tracing::error!(
            provider = provider.name(),
            customer_id = %customer.id,
            error = %e,
            failed_items = failed,
            orphaned_items = ?orphaned,
            "Failed to create invoice items"
        );
        return None;
    }

    for item in &created {
        metrics::record_line_item(&item.currency);
    }

    let request = NewInvoice {
        customer: customer.id.clone(),
        collection_method: CollectionMethod::SendInvoice,
        days_until_due,
        auto_advance: true,
    };

    match provider.create_invoice(&request).await {
        Ok(invoice) => {
            tracing::debug!(
                invoice_id = %invoice.id,
                customer_id = %customer.id,
                items = created.len(),
                "Invoice created"
            );
            Some(invoice)
        }
        Err(e) => {
            let pending: Vec<&str> = created.iter().map(|item| item.id.as_str()).collect();
            tracing::error!(
                provider = provider.name(),
                customer_id = %customer.id,
                error = %e,
                orphaned_items = ?pending,
                "Failed to create invoice"
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::billing::{MockBillingProvider, ProviderCall};

    fn customer() -> Customer {
        Customer {
            id: "cus_123".to_string(),
            email: Some("a@example.com".to_string()),
            metadata: Default::default(),
        }
    }

    fn item(amount: i64, description: &str) -> OrderItem {
        OrderItem {
            amount,
            currency: "usd".to_string(),
            description: description.to_string(),
        }
    }

    #[tokio::test]
    async fn creates_every_item_then_one_invoice() {
        let provider = MockBillingProvider::new();
        let items = vec![item(500, "Widget"), item(1200, "Gadget"), item(-100, "Discount")];

        let invoice = build_invoice(&provider, &customer(), &items, 7)
            .await
            .expect("invoice should be created");
        assert_eq!(invoice.customer, "cus_123");

        let calls = provider.calls();
        assert_eq!(calls.len(), 4);

        let created_items: Vec<NewInvoiceItem> = calls
            .iter()
            .filter_map(|call| match call {
                ProviderCall::CreateInvoiceItem(item) => Some(item.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(created_items.len(), 3);
        for (request, original) in created_items.iter().zip(&items) {
            assert_eq!(request.customer, "cus_123");
            assert_eq!(request.amount, original.amount);
            assert_eq!(request.currency, original.currency);
            assert_eq!(request.description, original.description);
        }

        assert_eq!(
            calls.last(),
            Some(&ProviderCall::CreateInvoice(NewInvoice {
                customer: "cus_123".to_string(),
                collection_method: CollectionMethod::SendInvoice,
                days_until_due: 7,
                auto_advance: true,
            }))
        );
    }

    #[tokio::test]
    async fn item_failure_skips_invoice_creation() {
        let provider = MockBillingProvider::new().failing_item("Gadget");
        let items = vec![item(500, "Widget"), item(1200, "Gadget")];

        let invoice = build_invoice(&provider, &customer(), &items, 7).await;
        assert!(invoice.is_none());

        let calls = provider.calls();
        assert_eq!(calls.len(), 2);
        assert!(!calls
            .iter()
            .any(|call| matches!(call, ProviderCall::CreateInvoice(_))));
    }

    #[tokio::test]
    async fn invoice_failure_returns_none() {
        let provider = MockBillingProvider::new().failing_invoice_creation();

        let invoice = build_invoice(&provider, &customer(), &[item(500, "Widget")], 7).await;
        assert!(invoice.is_none());
        assert_eq!(provider.calls().len(), 2);
    }

    #[tokio::test]
    async fn uses_configured_due_window() {
        let provider = MockBillingProvider::new();

        build_invoice(&provider, &customer(), &[item(500, "Widget")], 30).await;

        assert!(provider.calls().iter().any(|call| matches!(
            call,
            ProviderCall::CreateInvoice(NewInvoice {
                days_until_due: 30,
                ..
            })
        )));
    }
}
