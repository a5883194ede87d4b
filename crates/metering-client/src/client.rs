//! Metering HTTP client implementation.

use std::time::Duration;

use reqwest::Client;

use metering_core::{AccessDecision, GatedResource, OrgId, UsageRecord};

use crate::error::ClientError;
use crate::types::{
    ApiErrorResponse, LimitCheckResponse, LimitRequest, TrackBytesRequest, TrackCountRequest,
};

/// Options for building a [`MeteringClient`].
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Request timeout in seconds.
    pub timeout_seconds: u64,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self { timeout_seconds: 10 }
    }
}

/// Metering API client for services that enforce limits and report usage.
#[derive(Debug, Clone)]
pub struct MeteringClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl MeteringClient {
    /// Create a new client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Base URL of the metering service
    /// * `api_key` - Service API key
    #[must_use]
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self::with_options(base_url, api_key, ClientOptions::default())
    }

    /// Create a new client with custom options.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client cannot be built (does not happen with
    /// default TLS settings).
    #[must_use]
    pub fn with_options(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        options: ClientOptions,
    ) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(options.timeout_seconds))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    /// Would consuming `amount` units of `resource` fit the plan?
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server rejects it.
    pub async fn check_limit(
        &self,
        org_id: OrgId,
        resource: GatedResource,
        amount: i64,
    ) -> Result<LimitCheckResponse, ClientError> {
        let url = format!("{}/v1/orgs/{org_id}/limits/check", self.base_url);
        let response = self
            .post(&url)
            .json(&LimitRequest { resource, amount })
            .send()
            .await?;
        self.handle_response(response).await
    }

    /// Fail with [`ClientError::LimitExceeded`] unless the increment fits.
    /// Call before the metered operation takes effect.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the limit blocks it.
    pub async fn enforce_limit(
        &self,
        org_id: OrgId,
        resource: GatedResource,
        amount: i64,
    ) -> Result<LimitCheckResponse, ClientError> {
        let url = format!("{}/v1/orgs/{org_id}/limits/enforce", self.base_url);
        let response = self
            .post(&url)
            .json(&LimitRequest { resource, amount })
            .send()
            .await?;
        self.handle_response(response).await
    }

    /// Record stored bytes after an upload lands.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server rejects it.
    pub async fn track_storage(
        &self,
        org_id: OrgId,
        bytes: i64,
    ) -> Result<UsageRecord, ClientError> {
        let url = format!("{}/v1/orgs/{org_id}/usage/storage", self.base_url);
        let response = self
            .post(&url)
            .json(&TrackBytesRequest { bytes })
            .send()
            .await?;
        self.handle_response(response).await
    }

    /// Release stored bytes after a deletion.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server rejects it.
    pub async fn release_storage(
        &self,
        org_id: OrgId,
        bytes: i64,
    ) -> Result<UsageRecord, ClientError> {
        let url = format!("{}/v1/orgs/{org_id}/usage/storage", self.base_url);
        let response = self
            .client
            .delete(&url)
            .header("x-api-key", &self.api_key)
            .json(&TrackBytesRequest { bytes })
            .send()
            .await?;
        self.handle_response(response).await
    }

    /// Record an uploaded video.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server rejects it.
    pub async fn track_video_upload(&self, org_id: OrgId) -> Result<UsageRecord, ClientError> {
        let url = format!("{}/v1/orgs/{org_id}/usage/videos", self.base_url);
        let response = self
            .post(&url)
            .json(&TrackCountRequest { count: 1 })
            .send()
            .await?;
        self.handle_response(response).await
    }

    /// Record served bytes. The service refuses the increment beyond twice
    /// the bandwidth allocation.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::LimitExceeded`] at the hard stop, or an error
    /// if the request fails.
    pub async fn track_bandwidth(
        &self,
        org_id: OrgId,
        bytes: i64,
    ) -> Result<UsageRecord, ClientError> {
        let url = format!("{}/v1/orgs/{org_id}/usage/bandwidth", self.base_url);
        let response = self
            .post(&url)
            .json(&TrackBytesRequest { bytes })
            .send()
            .await?;
        self.handle_response(response).await
    }

    /// Record AI requests.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server rejects it.
    pub async fn track_ai_request(
        &self,
        org_id: OrgId,
        count: i64,
    ) -> Result<UsageRecord, ClientError> {
        let url = format!("{}/v1/orgs/{org_id}/usage/ai", self.base_url);
        let response = self
            .post(&url)
            .json(&TrackCountRequest { count })
            .send()
            .await?;
        self.handle_response(response).await
    }

    /// Current-period usage for an organization.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server rejects it.
    pub async fn current_usage(&self, org_id: OrgId) -> Result<UsageRecord, ClientError> {
        let url = format!("{}/v1/orgs/{org_id}/usage", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("x-api-key", &self.api_key)
            .send()
            .await?;
        self.handle_response(response).await
    }

    /// The access classifier's verdict for an organization.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server rejects it.
    pub async fn access(&self, org_id: OrgId) -> Result<AccessDecision, ClientError> {
        let url = format!("{}/v1/orgs/{org_id}/access", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("x-api-key", &self.api_key)
            .send()
            .await?;
        self.handle_response(response).await
    }

    fn post(&self, url: &str) -> reqwest::RequestBuilder {
        self.client.post(url).header("x-api-key", &self.api_key)
    }

    /// Handle API responses, mapping the error envelope onto typed errors.
    async fn handle_response<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, ClientError> {
        let status = response.status();

        if status.is_success() {
            return Ok(response.json().await?);
        }

        let error_body: Result<ApiErrorResponse, _> = response.json().await;
        match error_body {
            Ok(api_error) => {
                let body = api_error.error;
                tracing::debug!(code = %body.code, status = %status, "Metering API error");
                match body.code.as_str() {
                    "limit_exceeded" => {
                        let details = body.details.unwrap_or_default();
                        Err(ClientError::LimitExceeded {
                            resource: details
                                .get("resource")
                                .and_then(|v| v.as_str())
                                .unwrap_or("unknown")
                                .to_owned(),
                            current_usage: details
                                .get("current_usage")
                                .and_then(serde_json::Value::as_i64)
                                .unwrap_or(0),
                            limit: details
                                .get("limit")
                                .and_then(serde_json::Value::as_i64)
                                .unwrap_or(0),
                        })
                    }
                    "no_subscription" => Err(ClientError::NoSubscription(body.message)),
                    "forbidden" => Err(ClientError::Forbidden(body.message)),
                    _ => Err(ClientError::Api {
                        code: body.code,
                        message: body.message,
                        status: status.as_u16(),
                    }),
                }
            }
            Err(_) => Err(ClientError::Api {
                code: "unknown".into(),
                message: format!("HTTP {status}"),
                status: status.as_u16(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn enforce_limit_maps_the_structured_denial() {
        let server = MockServer::start().await;
        let org = OrgId::generate();
        Mock::given(method("POST"))
            .and(path(format!("/v1/orgs/{org}/limits/enforce")))
            .and(header("x-api-key", "key"))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "error": {
                    "code": "limit_exceeded",
                    "message": "You have reached your videos limit. Please upgrade your plan.",
                    "details": {"resource": "videos", "current_usage": 25, "limit": 25}
                }
            })))
            .mount(&server)
            .await;

        let client = MeteringClient::new(server.uri(), "key");
        let err = client
            .enforce_limit(org, GatedResource::Videos, 1)
            .await
            .unwrap_err();
        match err {
            ClientError::LimitExceeded {
                resource,
                current_usage,
                limit,
            } => {
                assert_eq!(resource, "videos");
                assert_eq!(current_usage, 25);
                assert_eq!(limit, 25);
            }
            other => panic!("expected LimitExceeded, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn check_limit_decodes_the_response() {
        let server = MockServer::start().await;
        let org = OrgId::generate();
        Mock::given(method("POST"))
            .and(path(format!("/v1/orgs/{org}/limits/check")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "allowed": true,
                "current_usage": 3,
                "limit": 10,
                "remaining": 7,
                "percentage": 30
            })))
            .mount(&server)
            .await;

        let client = MeteringClient::new(server.uri(), "key");
        let check = client
            .check_limit(org, GatedResource::Videos, 1)
            .await
            .unwrap();
        assert!(check.allowed);
        assert_eq!(check.remaining, 7);
    }
}
