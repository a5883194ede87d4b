//! Service-to-service authentication.
//!
//! Metered operations are reported by trusted backend services (the upload
//! pipeline, the AI workers), not by end users, so the surface carries a
//! single shared API key in the `x-api-key` header.

use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::error::ApiError;
use crate::signature::constant_time_eq;
use crate::state::AppState;

/// An authenticated caller on the service API.
#[derive(Debug, Clone)]
pub struct ServiceAuth;

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for ServiceAuth {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let Some(expected) = state.config.service_api_key.as_deref() else {
            // No key configured: development mode, accept everything.
            return Ok(Self);
        };

        let provided = parts
            .headers
            .get("x-api-key")
            .and_then(|v| v.to_str().ok())
            .ok_or(ApiError::Unauthorized)?;

        if constant_time_eq(expected, provided) {
            Ok(Self)
        } else {
            Err(ApiError::Unauthorized)
        }
    }
}
