use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::services::InvocationOutcome;

/// A newly created realtime database record, as delivered by the trigger host.
#[derive(Debug, Deserialize)]
pub struct TriggerEvent {
    /// Database path the record was written to.
    #[serde(default)]
    pub path: Option<String>,
    /// Record content. Normally a string holding JSON text.
    pub value: Value,
}

impl TriggerEvent {
    /// The record content as text.
    ///
    /// String values are returned as-is; any other JSON value is re-encoded.
    pub fn payload_text(&self) -> String {
        match &self.value {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TriggerResponse {
    pub status: &'static str,
    pub outcome: InvocationOutcome,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_value_is_passed_through() {
        let event: TriggerEvent =
            serde_json::from_str(r#"{"path":"/invoices/1","value":"{\"email\":\"a@example.com\"}"}"#)
                .unwrap();
        assert_eq!(event.path.as_deref(), Some("/invoices/1"));
        assert_eq!(event.payload_text(), r#"{"email":"a@example.com"}"#);
    }

    #[test]
    fn structured_value_is_reencoded() {
        let event: TriggerEvent =
            serde_json::from_str(r#"{"value":{"email":"a@example.com","items":[]}}"#).unwrap();
        let reparsed: Value = serde_json::from_str(&event.payload_text()).unwrap();
        assert_eq!(reparsed["email"], "a@example.com");
    }
}
