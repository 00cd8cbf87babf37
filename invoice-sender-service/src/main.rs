use invoice_sender_service::config::InvoiceSenderConfig;
use invoice_sender_service::services::init_metrics;
use invoice_sender_service::Application;
use service_core::observability::init_tracing;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let otlp_endpoint = std::env::var("OTLP_ENDPOINT").ok();
    init_tracing(
        "invoice-sender-service",
        "info,invoice_sender_service=debug",
        otlp_endpoint.as_deref(),
    );

    init_metrics();

    let config = InvoiceSenderConfig::load().map_err(|e| {
        tracing::error!("Failed to load configuration: {}", e);
        anyhow::anyhow!("Configuration error: {}", e)
    })?;

    let application = Application::build(config).await?;
    application.run_until_stopped().await?;

    Ok(())
}
