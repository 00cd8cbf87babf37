use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use prometheus::{IntCounterVec, Opts, Registry};
use std::sync::OnceLock;

pub static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();
pub static PROMETHEUS_REGISTRY: OnceLock<Registry> = OnceLock::new();
pub static INVOICE_REQUESTS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
pub static INVOICE_LINE_ITEMS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

pub fn init_metrics() {
    let builder = PrometheusBuilder::new();
    let handle = builder
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    if METRICS_HANDLE.set(handle).is_err() {
        panic!("failed to set metrics handle: already initialized");
    }

    let registry = Registry::new();

    let requests_counter = IntCounterVec::new(
        Opts::new(
            "invoice_requests_total",
            "Invoice trigger invocations by outcome",
        ),
        &["outcome"],
    )
    .expect("Failed to create invoice_requests_total metric");

    let line_items_counter = IntCounterVec::new(
        Opts::new(
            "invoice_line_items_total",
            "Line items created at the billing provider by currency",
        ),
        &["currency"],
    )
    .expect("Failed to create invoice_line_items_total metric");

    registry
        .register(Box::new(requests_counter.clone()))
        .expect("Failed to register invoice_requests_total");
    registry
        .register(Box::new(line_items_counter.clone()))
        .expect("Failed to register invoice_line_items_total");

    PROMETHEUS_REGISTRY
        .set(registry)
        .expect("Failed to set prometheus registry");
    INVOICE_REQUESTS_TOTAL
        .set(requests_counter)
        .expect("Failed to set invoice_requests_total");
    INVOICE_LINE_ITEMS_TOTAL
        .set(line_items_counter)
        .expect("Failed to set invoice_line_items_total");
}

pub fn get_metrics() -> String {
    let mut output = METRICS_HANDLE
        .get()
        .map(|handle| handle.render())
        .unwrap_or_else(|| "# Metrics recorder not initialized\n".to_string());

    if let Some(registry) = PROMETHEUS_REGISTRY.get() {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let metric_families = registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer).ok();
        if let Ok(custom_metrics) = String::from_utf8(buffer) {
            output.push_str(&custom_metrics);
        }
    }

    output
}

/// Record the outcome of one trigger invocation.
pub fn record_request(outcome: &str) {
    if let Some(counter) = INVOICE_REQUESTS_TOTAL.get() {
        counter.with_label_values(&[outcome]).inc();
    }
}

pub fn record_line_item(currency: &str) {
    if let Some(counter) = INVOICE_LINE_ITEMS_TOTAL.get() {
        counter.with_label_values(&[currency]).inc();
    }
}
