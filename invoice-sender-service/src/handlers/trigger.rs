//! Trigger delivery endpoint.
//!
//! The realtime database host posts every newly created invoice request
//! record here. Whatever happens downstream, the response acknowledges the
//! record unless the failure policy asks for failures to be propagated.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use secrecy::ExposeSecret;
use service_core::error::AppError;
use service_core::utils::signature::verify_body_signature;

use crate::config::FailurePolicy;
use crate::dtos::{TriggerEvent, TriggerResponse};
use crate::services::{metrics, InvocationOutcome};
use crate::startup::AppState;

/// Header carrying `hex(HMAC-SHA256(body, secret))`.
pub const SIGNATURE_HEADER: &str = "x-trigger-signature";

pub async fn receive_trigger(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<TriggerResponse>), AppError> {
    if let Some(secret) = &state.config.trigger.signing_secret {
        let signature = headers
            .get(SIGNATURE_HEADER)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| {
                tracing::warn!("Trigger delivered without signature");
                AppError::Unauthorized(anyhow::anyhow!("Missing trigger signature"))
            })?;

        if !verify_body_signature(secret.expose_secret(), &body, signature)? {
            tracing::warn!("Trigger signature verification failed");
            return Err(AppError::Unauthorized(anyhow::anyhow!(
                "Invalid trigger signature"
            )));
        }
    }

    let outcome = match serde_json::from_slice::<TriggerEvent>(&body) {
        Ok(event) => {
            tracing::info!(
                path = event.path.as_deref().unwrap_or("-"),
                "Invoice request trigger received"
            );
            state.handler.handle(&event.payload_text()).await
        }
        Err(e) => {
            tracing::warn!(error = %e, "Malformed trigger event, skipping");
            let outcome = InvocationOutcome::Skipped {
                reason: format!("malformed trigger event: {}", e),
            };
            metrics::record_request(outcome.label());
            outcome
        }
    };

    let propagate = state.config.trigger.failure_policy == FailurePolicy::Propagate;
    if propagate && outcome.is_failure() {
        return Ok((
            StatusCode::BAD_GATEWAY,
            Json(TriggerResponse {
                status: "failed",
                outcome,
            }),
        ));
    }

    Ok((
        StatusCode::OK,
        Json(TriggerResponse {
            status: "handled",
            outcome,
        }),
    ))
}
