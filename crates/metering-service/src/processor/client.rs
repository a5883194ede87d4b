//! Outbound payment-processor API client.
//!
//! The reconciliation core makes exactly one kind of outbound call: fetching
//! a subscription's current line items when a plan-change event arrives
//! without a resolvable price. Everything else flows inbound via webhooks.

use metering_core::MeteringError;

use super::types::SubscriptionObject;

/// Read-only client for the payment processor's API.
pub struct ProcessorClient {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl ProcessorClient {
    /// Build a client against the processor's API base URL.
    #[must_use]
    pub fn new(base_url: &str, api_key: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_owned(),
            api_key: api_key.to_owned(),
            client: reqwest::Client::new(),
        }
    }

    /// Fetch a subscription object, line items included.
    ///
    /// # Errors
    ///
    /// Returns an error if the processor cannot be reached or responds with
    /// a non-success status.
    pub async fn fetch_subscription(
        &self,
        external_subscription_id: &str,
    ) -> Result<SubscriptionObject, MeteringError> {
        let url = format!("{}/v1/subscriptions/{external_subscription_id}", self.base_url);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| MeteringError::External {
                service: "processor".into(),
                message: e.to_string(),
            })?;

        response
            .json()
            .await
            .map_err(|e| MeteringError::External {
                service: "processor".into(),
                message: e.to_string(),
            })
    }
}
