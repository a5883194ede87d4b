//! Application state.

use std::sync::Arc;

use metering_core::PlanCatalog;
use metering_store::Store;

use crate::config::ServiceConfig;
use crate::external::{
    HttpMediaLibrary, HttpMemberDirectory, HttpNotificationSink, MediaLibrary, MemberDirectory,
    NotificationSink, NullMediaLibrary, NullMemberDirectory, NullNotificationSink,
};
use crate::gate::LimitGate;
use crate::ledger::UsageLedger;
use crate::overage::OverageCalculator;
use crate::processor::ProcessorClient;
use crate::reconcile::ReconciliationEngine;

/// Application state shared across handlers.
///
/// Components ([`UsageLedger`], [`LimitGate`], ...) are built per request
/// from the shared store and catalog; there is no process-wide subscription
/// or classification cache, so every operation sees the database row as the
/// sole source of truth.
#[derive(Clone)]
pub struct AppState {
    /// The storage backend.
    pub store: Arc<dyn Store>,

    /// The seeded plan catalog.
    pub catalog: Arc<PlanCatalog>,

    /// Service configuration.
    pub config: ServiceConfig,

    /// Live member counts.
    pub directory: Arc<dyn MemberDirectory>,

    /// Live video counts.
    pub media: Arc<dyn MediaLibrary>,

    /// Best-effort notification sends.
    pub notifier: Arc<dyn NotificationSink>,

    /// Outbound payment-processor client (optional).
    pub processor: Option<Arc<ProcessorClient>>,
}

impl AppState {
    /// Create application state, wiring collaborators from configuration.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, config: ServiceConfig) -> Self {
        let catalog = Arc::new(PlanCatalog::standard());

        let directory: Arc<dyn MemberDirectory> = match &config.directory_url {
            Some(url) => {
                tracing::info!(directory_url = %url, "Membership directory enabled");
                Arc::new(HttpMemberDirectory::new(url))
            }
            None => {
                tracing::warn!("Directory not configured - member counts will read as zero");
                Arc::new(NullMemberDirectory)
            }
        };

        let media: Arc<dyn MediaLibrary> = match &config.media_url {
            Some(url) => {
                tracing::info!(media_url = %url, "Video store enabled");
                Arc::new(HttpMediaLibrary::new(url))
            }
            None => {
                tracing::warn!("Video store not configured - video counts will read as zero");
                Arc::new(NullMediaLibrary)
            }
        };

        let notifier: Arc<dyn NotificationSink> = match &config.notify_url {
            Some(url) => {
                tracing::info!(notify_url = %url, "Notification dispatcher enabled");
                Arc::new(HttpNotificationSink::new(url))
            }
            None => {
                tracing::warn!("Notifier not configured - notifications will be dropped");
                Arc::new(NullNotificationSink)
            }
        };

        let processor = config
            .processor_api_url
            .as_ref()
            .zip(config.processor_api_key.as_ref())
            .map(|(url, key)| {
                tracing::info!(processor_url = %url, "Payment processor API enabled");
                Arc::new(ProcessorClient::new(url, key))
            });
        if processor.is_none() {
            tracing::warn!(
                "Processor API not configured - plan changes without line items keep the current plan"
            );
        }

        Self {
            store,
            catalog,
            config,
            directory,
            media,
            notifier,
            processor,
        }
    }

    /// The usage ledger over this state's store.
    #[must_use]
    pub fn ledger(&self) -> UsageLedger {
        UsageLedger::new(
            Arc::clone(&self.store),
            Arc::clone(&self.catalog),
            Arc::clone(&self.notifier),
        )
    }

    /// The limit enforcement gate over this state's store and
    /// collaborators.
    #[must_use]
    pub fn gate(&self) -> LimitGate {
        LimitGate::new(
            Arc::clone(&self.store),
            Arc::clone(&self.catalog),
            Arc::clone(&self.directory),
            Arc::clone(&self.media),
        )
    }

    /// The overage calculator over this state's store.
    #[must_use]
    pub fn overage(&self) -> OverageCalculator {
        OverageCalculator::new(Arc::clone(&self.store), Arc::clone(&self.catalog))
    }

    /// The webhook reconciliation engine over this state's store.
    #[must_use]
    pub fn engine(&self) -> ReconciliationEngine {
        ReconciliationEngine::new(
            Arc::clone(&self.store),
            Arc::clone(&self.catalog),
            Arc::clone(&self.notifier),
            self.processor.clone(),
        )
    }
}
