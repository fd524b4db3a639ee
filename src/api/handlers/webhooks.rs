use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    Json,
};
use serde_json::{json, Value};

use crate::{
    api::state::AppState,
    error::{AppError, Result},
    payments::{webhook::verify_signature, RazorpayWebhookEvent, SIGNATURE_HEADER},
    service::{IgnoreReason, WebhookOutcome},
};

/// POST /api/billing/webhook/razorpay
///
/// The body is taken as raw bytes: the signature covers the exact payload, so
/// it is verified before any JSON parsing happens.
pub async fn razorpay_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>> {
    let secret = state
        .settings
        .razorpay
        .webhook_secret
        .as_deref()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::Configuration("razorpay.webhook_secret is not set".to_string()))?;

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            tracing::warn!("Razorpay webhook without signature header");
            AppError::Unauthorized
        })?;

    if !verify_signature(secret, &body, signature) {
        tracing::warn!("Razorpay webhook signature mismatch");
        return Err(AppError::Unauthorized);
    }

    let value: Value = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("Invalid webhook payload: {}", e)))?;

    // Well-formed JSON in a shape we do not model is acknowledged, not
    // rejected, so Razorpay stops redelivering it.
    let event: RazorpayWebhookEvent = match serde_json::from_value(value) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!(error = %e, "Unrecognized Razorpay webhook payload");
            return Ok(Json(ignored(IgnoreReason::UnrecognizedPayload)));
        }
    };

    let outcome = state
        .service_context
        .webhook_service
        .process(&event)
        .await
        .map_err(|e| {
            // Any failure here is reported as 500 so Razorpay redelivers.
            AppError::Internal(format!("Processing {} failed: {}", event.event, e))
        })?;

    Ok(Json(match outcome {
        WebhookOutcome::Applied { .. } => json!({ "ok": true }),
        WebhookOutcome::Ignored(reason) => ignored(reason),
    }))
}

fn ignored(reason: IgnoreReason) -> Value {
    json!({ "ok": true, "ignored": reason.as_str() })
}
