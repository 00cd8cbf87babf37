#![allow(dead_code)]

use invoice_sender_service::config::{
    FailurePolicy, InvoiceSenderConfig, InvoiceSettings, StripeConfig, TriggerConfig,
};
use invoice_sender_service::services::MockBillingProvider;
use invoice_sender_service::startup::Application;
use secrecy::Secret;
use service_core::config::Config as CoreConfig;
use std::io;
use std::sync::{Arc, Mutex};

pub const TEST_SIGNING_SECRET: &str = "test-trigger-secret";

/// Formatted log output collected by [`capture_logs`].
#[derive(Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.contents().contains(needle)
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Route this thread's tracing output into a buffer until the guard drops.
///
/// `#[tokio::test]` runs on a current-thread runtime, so events from spawned
/// tasks land here too.
pub fn capture_logs() -> (CapturedLogs, tracing::subscriber::DefaultGuard) {
    let logs = CapturedLogs::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();

    (logs, tracing::subscriber::set_default(subscriber))
}

pub struct TestApp {
    pub address: String,
    pub port: u16,
    pub provider: Arc<MockBillingProvider>,
    pub client: reqwest::Client,
}

pub fn test_config(trigger: TriggerConfig) -> InvoiceSenderConfig {
    InvoiceSenderConfig {
        common: CoreConfig { port: 0 },
        stripe: StripeConfig {
            secret_key: Secret::new(String::new()),
            api_base_url: "http://127.0.0.1:1".to_string(),
            api_version: "2019-12-03".to_string(),
        },
        invoice: InvoiceSettings::default(),
        trigger,
    }
}

pub fn acknowledge() -> TriggerConfig {
    TriggerConfig {
        signing_secret: None,
        failure_policy: FailurePolicy::Acknowledge,
    }
}

/// Wrap a record value the way the trigger host delivers it: the record
/// content is JSON text stored as a string.
pub fn trigger_body(record: &serde_json::Value) -> String {
    serde_json::json!({
        "path": "/invoice-requests/test",
        "value": record.to_string(),
    })
    .to_string()
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with(MockBillingProvider::new(), acknowledge()).await
    }

    pub async fn spawn_with(provider: MockBillingProvider, trigger: TriggerConfig) -> Self {
        let provider = Arc::new(provider);

        let app = Application::build_with_provider(test_config(trigger), provider.clone())
            .await
            .expect("Failed to build test application");

        let port = app.port();
        let address = format!("http://127.0.0.1:{}", port);

        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        // Wait for the server to be ready by polling health endpoint
        let client = reqwest::Client::new();
        let health_url = format!("{}/health", address);
        for _ in 0..50 {
            if client.get(&health_url).send().await.is_ok() {
                break;
            }
            tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
        }

        TestApp {
            address,
            port,
            provider,
            client,
        }
    }

    pub async fn post_trigger(&self, body: String) -> reqwest::Response {
        self.post_trigger_bytes(body.into_bytes()).await
    }

    pub async fn post_trigger_bytes(&self, body: Vec<u8>) -> reqwest::Response {
        self.client
            .post(format!("{}/triggers/invoice-requests", self.address))
            .header("content-type", "application/json")
            .body(body)
            .send()
            .await
            .expect("Failed to execute request")
    }
}
