//! Wire types shared with the metering service API.

use serde::{Deserialize, Serialize};

use metering_core::GatedResource;

/// A limit check or enforce request body.
#[derive(Debug, Clone, Serialize)]
pub struct LimitRequest {
    /// Which resource to check.
    pub resource: GatedResource,
    /// The increment the caller intends to consume.
    pub amount: i64,
}

/// Outcome of a limit check.
#[derive(Debug, Clone, Deserialize)]
pub struct LimitCheckResponse {
    /// Whether the requested increment fits.
    pub allowed: bool,
    /// Consumption at the time of the check.
    pub current_usage: i64,
    /// The plan's configured limit (`-1` for unlimited).
    pub limit: i64,
    /// Room left before the limit (`-1` for unlimited).
    pub remaining: i64,
    /// Percent of the limit consumed, clamped to 100.
    pub percentage: u32,
}

/// A byte-denominated tracking request body.
#[derive(Debug, Clone, Serialize)]
pub struct TrackBytesRequest {
    /// How many bytes were consumed or released.
    pub bytes: i64,
}

/// A unit-denominated tracking request body.
#[derive(Debug, Clone, Serialize)]
pub struct TrackCountRequest {
    /// How many units were consumed or released.
    pub count: i64,
}

/// Error envelope returned by the service.
#[derive(Debug, Deserialize)]
pub struct ApiErrorResponse {
    /// The error payload.
    pub error: ApiErrorBody,
}

/// Error payload.
#[derive(Debug, Deserialize)]
pub struct ApiErrorBody {
    /// Machine-readable code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// Structured detail (limit errors carry resource/current/limit).
    #[serde(default)]
    pub details: Option<serde_json::Value>,
}
