//! Metering client SDK.
//!
//! A typed client for services that gate and report metered operations.
//!
//! # Example
//!
//! ```no_run
//! use metering_client::MeteringClient;
//! use metering_core::{GatedResource, OrgId};
//!
//! # async fn example() -> Result<(), metering_client::ClientError> {
//! let client = MeteringClient::new(
//!     "http://metering.internal:8080",
//!     "your-service-api-key",
//! );
//!
//! let org: OrgId = "7a0f51f4-9f3c-4b21-a871-3f1c55fa84f0".parse().unwrap();
//!
//! // Check-then-act: abort the upload before it takes effect.
//! client.enforce_limit(org, GatedResource::Videos, 1).await?;
//! // ... perform the upload ...
//! client.track_video_upload(org).await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

mod client;
mod error;
mod types;

pub use client::{ClientOptions, MeteringClient};
pub use error::ClientError;
pub use types::{
    ApiErrorBody, ApiErrorResponse, LimitCheckResponse, LimitRequest, TrackBytesRequest,
    TrackCountRequest,
};
