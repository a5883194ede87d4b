//! Billing webhook ingestion.
//!
//! A 2xx from this handler tells the payment processor the event is done;
//! it is returned only when the engine committed the event's effects (or
//! the event was a duplicate / unhandled type). Any failure surfaces as an
//! error status so the processor redelivers.

use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::Serialize;

use crate::error::ApiError;
use crate::processor::BillingEvent;
use crate::signature::verify_webhook;
use crate::state::AppState;

/// Header carrying the HMAC signature.
const SIGNATURE_HEADER: &str = "x-billing-signature";

/// Webhook acknowledgment body.
#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    /// Whether the event was accepted.
    pub received: bool,
    /// What the engine did ("applied", "duplicate", "ignored").
    pub disposition: &'static str,
}

/// Ingest one billing event delivery.
pub async fn billing_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<WebhookResponse>, ApiError> {
    if let Some(secret) = &state.config.webhook_secret {
        let signature = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok());
        verify_webhook(secret, &body, signature).map_err(|err| {
            tracing::warn!(error = %err, "Invalid billing webhook signature");
            ApiError::BadRequest("invalid webhook signature".into())
        })?;
    } else {
        tracing::warn!("Webhook secret not configured - skipping signature verification");
    }

    let event: BillingEvent =
        serde_json::from_str(&body).map_err(|err| ApiError::BadRequest(err.to_string()))?;

    tracing::info!(
        event_id = %event.id,
        event_type = %event.event_type,
        "Received billing event"
    );

    let disposition = state.engine().process(&event).await?;

    Ok(Json(WebhookResponse {
        received: true,
        disposition: disposition.as_str(),
    }))
}
