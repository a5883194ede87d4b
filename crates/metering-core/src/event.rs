//! The webhook idempotency record.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// How long a dedup row is retained before a maintenance sweep may purge it.
pub const EVENT_RETENTION_DAYS: i64 = 30;

/// A persisted marker that an external event id has been fully processed.
///
/// The uniqueness of `event_id` in the store is the mechanism that makes
/// event ingestion safe under duplicate delivery; the expiry bound keeps the
/// dedup table from growing without limit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedEvent {
    /// The external event id (unique).
    pub event_id: String,
    /// The external event type string, kept for diagnostics.
    pub event_type: String,
    /// Which system delivered the event.
    pub source: String,
    /// When processing completed.
    pub processed_at: DateTime<Utc>,
    /// When the row becomes eligible for purging.
    pub expires_at: DateTime<Utc>,
}

impl ProcessedEvent {
    /// Build a record for an event being processed now.
    #[must_use]
    pub fn new(event_id: &str, event_type: &str, source: &str) -> Self {
        let now = Utc::now();
        Self {
            event_id: event_id.to_owned(),
            event_type: event_type.to_owned(),
            source: source.to_owned(),
            processed_at: now,
            expires_at: now + Duration::days(EVENT_RETENTION_DAYS),
        }
    }
}
