//! API error types and responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use metering_core::{GatedResource, MeteringError};
use metering_store::StoreError;

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Missing or invalid credentials.
    #[error("unauthorized")]
    Unauthorized,

    /// Write attempted under read-only or feature-gated access.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Resource not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// The organization has no qualifying subscription.
    #[error("no active subscription: {0}")]
    NoSubscription(String),

    /// Invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Resource already exists or an invalid state transition was attempted.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A plan limit blocks the request.
    #[error("{resource} limit reached: {current_usage} of {limit}")]
    LimitExceeded {
        /// Which resource hit its cap.
        resource: GatedResource,
        /// Consumption at the time of the check.
        current_usage: i64,
        /// The plan's configured limit.
        limit: i64,
    },

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),

    /// An external collaborator or the payment processor failed.
    #[error("external service error: {0}")]
    ExternalService(String),
}

/// JSON error response body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message, details) = match &self {
            Self::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                self.to_string(),
                None,
            ),
            Self::Forbidden(reason) => {
                (StatusCode::FORBIDDEN, "forbidden", reason.clone(), None)
            }
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone(), None),
            Self::NoSubscription(msg) => (
                StatusCode::NOT_FOUND,
                "no_subscription",
                msg.clone(),
                None,
            ),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone(), None),
            Self::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg.clone(), None),
            Self::LimitExceeded {
                resource,
                current_usage,
                limit,
            } => (
                StatusCode::FORBIDDEN,
                "limit_exceeded",
                format!("You have reached your {resource} limit. Please upgrade your plan."),
                Some(serde_json::json!({
                    "resource": resource,
                    "current_usage": current_usage,
                    "limit": limit
                })),
            ),
            Self::Internal(msg) => {
                tracing::error!(error = %msg, "Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                    None,
                )
            }
            Self::ExternalService(msg) => (
                StatusCode::BAD_GATEWAY,
                "external_service_error",
                msg.clone(),
                None,
            ),
        };

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message,
                details,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<MeteringError> for ApiError {
    fn from(err: MeteringError) -> Self {
        match err {
            MeteringError::PlanNotFound { plan_id } => {
                Self::NotFound(format!("plan not found: {plan_id}"))
            }
            MeteringError::NoSubscription { org_id } => {
                Self::NoSubscription(format!("organization {org_id} has no active subscription"))
            }
            MeteringError::LimitExceeded {
                resource,
                current_usage,
                limit,
            } => Self::LimitExceeded {
                resource,
                current_usage,
                limit,
            },
            MeteringError::Forbidden { reason } => Self::Forbidden(reason),
            MeteringError::UsageTracking(msg) | MeteringError::Storage(msg) => Self::Internal(msg),
            MeteringError::InvalidTransition { reason } => Self::Conflict(reason),
            MeteringError::UnknownStatus { status } => {
                Self::BadRequest(format!("unknown subscription status: {status}"))
            }
            MeteringError::External { service, message } => {
                Self::ExternalService(format!("{service}: {message}"))
            }
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => Self::NotFound(format!("{entity}: {id}")),
            StoreError::Corrupt { .. } | StoreError::Database(_) => {
                Self::Internal(err.to_string())
            }
        }
    }
}
