//! External collaborator interfaces.
//!
//! The metering core consumes three neighboring services: the membership
//! directory (live seat counts), the video store (live video counts), and
//! the notification dispatcher (best-effort sends). Each is a trait with an
//! HTTP implementation and a null implementation for unconfigured
//! deployments; tests point the HTTP implementations at a mock server.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use metering_core::{GatedResource, MeteringError, OrgId};

/// Map a collaborator failure into the core error taxonomy.
fn external(service: &str, err: &reqwest::Error) -> MeteringError {
    MeteringError::External {
        service: service.to_owned(),
        message: err.to_string(),
    }
}

// ============================================================================
// Membership directory
// ============================================================================

/// Live seat counts from the organization directory.
#[async_trait]
pub trait MemberDirectory: Send + Sync {
    /// Current member count for an organization.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be reached.
    async fn member_count(&self, org_id: OrgId) -> Result<i64, MeteringError>;
}

/// HTTP client for the membership directory.
pub struct HttpMemberDirectory {
    base_url: String,
    client: reqwest::Client,
}

impl HttpMemberDirectory {
    /// Build a client against a directory base URL.
    #[must_use]
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_owned(),
            client: reqwest::Client::new(),
        }
    }
}

#[derive(Deserialize)]
struct CountResponse {
    count: i64,
}

#[async_trait]
impl MemberDirectory for HttpMemberDirectory {
    async fn member_count(&self, org_id: OrgId) -> Result<i64, MeteringError> {
        let url = format!("{}/orgs/{org_id}/members/count", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| external("directory", &e))?;
        let body: CountResponse = response
            .json()
            .await
            .map_err(|e| external("directory", &e))?;
        Ok(body.count)
    }
}

/// Directory stub for deployments without a configured directory URL.
/// Reports zero members, which never trips a seat limit.
pub struct NullMemberDirectory;

#[async_trait]
impl MemberDirectory for NullMemberDirectory {
    async fn member_count(&self, _org_id: OrgId) -> Result<i64, MeteringError> {
        Ok(0)
    }
}

// ============================================================================
// Video store
// ============================================================================

/// Live video counts from the object/video store.
#[async_trait]
pub trait MediaLibrary: Send + Sync {
    /// Current hosted video count for an organization.
    ///
    /// # Errors
    ///
    /// Returns an error if the video store cannot be reached.
    async fn video_count(&self, org_id: OrgId) -> Result<i64, MeteringError>;
}

/// HTTP client for the video store.
pub struct HttpMediaLibrary {
    base_url: String,
    client: reqwest::Client,
}

impl HttpMediaLibrary {
    /// Build a client against a video-store base URL.
    #[must_use]
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_owned(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl MediaLibrary for HttpMediaLibrary {
    async fn video_count(&self, org_id: OrgId) -> Result<i64, MeteringError> {
        let url = format!("{}/orgs/{org_id}/videos/count", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| external("media", &e))?;
        let body: CountResponse = response.json().await.map_err(|e| external("media", &e))?;
        Ok(body.count)
    }
}

/// Video-store stub for deployments without a configured media URL.
pub struct NullMediaLibrary;

#[async_trait]
impl MediaLibrary for NullMediaLibrary {
    async fn video_count(&self, _org_id: OrgId) -> Result<i64, MeteringError> {
        Ok(0)
    }
}

// ============================================================================
// Notification dispatcher
// ============================================================================

/// What kind of subscription notification to send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// A subscription was created.
    SubscriptionCreated,
    /// A subscription changed plan, status, or period.
    SubscriptionUpdated,
    /// A subscription ended.
    SubscriptionCanceled,
    /// An invoice was paid.
    PaymentSucceeded,
    /// An invoice payment failed.
    PaymentFailed,
}

/// Fire-and-forget notification sends.
///
/// Callers must swallow and log failures: a failed email can never cause a
/// webhook to be re-delivered and re-processed.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Send a subscription lifecycle notification.
    ///
    /// # Errors
    ///
    /// Returns an error if the dispatcher cannot be reached; callers log
    /// and continue.
    async fn subscription_event(
        &self,
        org_id: OrgId,
        kind: NotificationKind,
        detail: &str,
    ) -> Result<(), MeteringError>;

    /// Send a resource-limit warning.
    ///
    /// # Errors
    ///
    /// Returns an error if the dispatcher cannot be reached; callers log
    /// and continue.
    async fn limit_warning(
        &self,
        org_id: OrgId,
        resource: GatedResource,
        percentage: u32,
    ) -> Result<(), MeteringError>;
}

#[derive(Serialize)]
struct SubscriptionNotice<'a> {
    org_id: OrgId,
    kind: NotificationKind,
    detail: &'a str,
}

#[derive(Serialize)]
struct LimitNotice {
    org_id: OrgId,
    resource: GatedResource,
    percentage: u32,
}

/// HTTP client for the notification dispatcher.
pub struct HttpNotificationSink {
    base_url: String,
    client: reqwest::Client,
}

impl HttpNotificationSink {
    /// Build a client against a dispatcher base URL.
    #[must_use]
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_owned(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl NotificationSink for HttpNotificationSink {
    async fn subscription_event(
        &self,
        org_id: OrgId,
        kind: NotificationKind,
        detail: &str,
    ) -> Result<(), MeteringError> {
        let url = format!("{}/notifications/subscription", self.base_url);
        self.client
            .post(&url)
            .json(&SubscriptionNotice {
                org_id,
                kind,
                detail,
            })
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| external("notifier", &e))?;
        Ok(())
    }

    async fn limit_warning(
        &self,
        org_id: OrgId,
        resource: GatedResource,
        percentage: u32,
    ) -> Result<(), MeteringError> {
        let url = format!("{}/notifications/limit-warning", self.base_url);
        self.client
            .post(&url)
            .json(&LimitNotice {
                org_id,
                resource,
                percentage,
            })
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| external("notifier", &e))?;
        Ok(())
    }
}

/// Dispatcher stub that drops notifications on the floor (logged at debug).
pub struct NullNotificationSink;

#[async_trait]
impl NotificationSink for NullNotificationSink {
    async fn subscription_event(
        &self,
        org_id: OrgId,
        kind: NotificationKind,
        detail: &str,
    ) -> Result<(), MeteringError> {
        tracing::debug!(org_id = %org_id, kind = ?kind, detail = %detail, "Notification dropped (no dispatcher configured)");
        Ok(())
    }

    async fn limit_warning(
        &self,
        org_id: OrgId,
        resource: GatedResource,
        percentage: u32,
    ) -> Result<(), MeteringError> {
        tracing::debug!(org_id = %org_id, resource = %resource, percentage, "Limit warning dropped (no dispatcher configured)");
        Ok(())
    }
}
