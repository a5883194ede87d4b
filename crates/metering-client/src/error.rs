//! Client error types.

/// Errors that can occur when using the metering client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Server returned an error response.
    #[error("API error: {code} - {message}")]
    Api {
        /// Error code.
        code: String,
        /// Error message.
        message: String,
        /// HTTP status code.
        status: u16,
    },

    /// A plan limit blocked the operation.
    #[error("{resource} limit reached: {current_usage} of {limit}")]
    LimitExceeded {
        /// Which resource hit its cap.
        resource: String,
        /// Consumption at the time of the check.
        current_usage: i64,
        /// The plan's configured limit.
        limit: i64,
    },

    /// The organization has no qualifying subscription.
    #[error("no active subscription: {0}")]
    NoSubscription(String),

    /// The organization's access level forbids writes.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
