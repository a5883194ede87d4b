//! In-memory storage implementation.
//!
//! Backs tests and local development. A single mutex around the whole state
//! makes every operation linearizable, which is exactly the guarantee the
//! SQL backend gets from atomic statements and unique constraints.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use metering_core::{
    BillingPeriod, Invoice, OrgId, PaymentMethod, ProcessedEvent, SubscriptionRecord,
    UsageCounter, UsageRecord,
};

use crate::error::{Result, StoreError};
use crate::Store;

#[derive(Default)]
struct Inner {
    subscriptions: Vec<SubscriptionRecord>,
    usage: HashMap<(OrgId, DateTime<Utc>), UsageRecord>,
    events: HashMap<String, ProcessedEvent>,
    invoices: HashMap<String, Invoice>,
    payment_methods: HashMap<String, PaymentMethod>,
}

impl Inner {
    fn usage_entry(&mut self, org_id: OrgId, period: &BillingPeriod) -> &mut UsageRecord {
        self.usage
            .entry((org_id, period.start))
            .or_insert_with(|| UsageRecord::zeroed(org_id, period))
    }

    fn existing_usage(
        &mut self,
        org_id: OrgId,
        period: &BillingPeriod,
    ) -> Result<&mut UsageRecord> {
        self.usage
            .get_mut(&(org_id, period.start))
            .ok_or_else(|| StoreError::NotFound {
                entity: "usage record",
                id: format!("{org_id}/{}", period.start),
            })
    }
}

fn counter_slot(record: &mut UsageRecord, counter: UsageCounter) -> &mut i64 {
    match counter {
        UsageCounter::Storage => &mut record.storage_used,
        UsageCounter::Videos => &mut record.videos_uploaded,
        UsageCounter::Bandwidth => &mut record.bandwidth_used,
        UsageCounter::AiRequests => &mut record.ai_requests,
    }
}

fn overage_slot(record: &mut UsageRecord, counter: UsageCounter) -> &mut i64 {
    match counter {
        UsageCounter::Storage => &mut record.storage_overage,
        UsageCounter::Videos => &mut record.videos_overage,
        UsageCounter::Bandwidth => &mut record.bandwidth_overage,
        UsageCounter::AiRequests => &mut record.ai_requests_overage,
    }
}

/// In-memory storage for tests and development.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of dedup rows currently held (test assertions).
    pub async fn processed_event_count(&self) -> usize {
        self.inner.lock().await.events.len()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn current_subscription(&self, org_id: OrgId) -> Result<Option<SubscriptionRecord>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .subscriptions
            .iter()
            .filter(|s| s.org_id == org_id && s.status.is_qualifying())
            .max_by_key(|s| s.created_at)
            .cloned())
    }

    async fn subscription_by_external_id(
        &self,
        external_subscription_id: &str,
    ) -> Result<Option<SubscriptionRecord>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .subscriptions
            .iter()
            .find(|s| {
                s.external_subscription_id.as_deref() == Some(external_subscription_id)
            })
            .cloned())
    }

    async fn subscription_by_customer_id(
        &self,
        external_customer_id: &str,
    ) -> Result<Option<SubscriptionRecord>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .subscriptions
            .iter()
            .filter(|s| s.external_customer_id.as_deref() == Some(external_customer_id))
            .max_by_key(|s| s.created_at)
            .cloned())
    }

    async fn insert_subscription(&self, record: &SubscriptionRecord) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.subscriptions.push(record.clone());
        Ok(())
    }

    async fn update_subscription(&self, record: &SubscriptionRecord) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let slot = inner
            .subscriptions
            .iter_mut()
            .find(|s| s.id == record.id)
            .ok_or_else(|| StoreError::NotFound {
                entity: "subscription",
                id: record.id.to_string(),
            })?;
        let mut updated = record.clone();
        updated.updated_at = Utc::now();
        *slot = updated;
        Ok(())
    }

    async fn usage_for_period(
        &self,
        org_id: OrgId,
        period: &BillingPeriod,
    ) -> Result<Option<UsageRecord>> {
        let inner = self.inner.lock().await;
        Ok(inner.usage.get(&(org_id, period.start)).cloned())
    }

    async fn create_usage_if_absent(
        &self,
        org_id: OrgId,
        period: &BillingPeriod,
    ) -> Result<UsageRecord> {
        let mut inner = self.inner.lock().await;
        Ok(inner.usage_entry(org_id, period).clone())
    }

    async fn increment_usage(
        &self,
        org_id: OrgId,
        period: &BillingPeriod,
        counter: UsageCounter,
        amount: i64,
    ) -> Result<UsageRecord> {
        let mut inner = self.inner.lock().await;
        let record = inner.usage_entry(org_id, period);
        *counter_slot(record, counter) += amount;
        record.updated_at = Utc::now();
        Ok(record.clone())
    }

    async fn decrement_usage(
        &self,
        org_id: OrgId,
        period: &BillingPeriod,
        counter: UsageCounter,
        amount: i64,
    ) -> Result<UsageRecord> {
        let mut inner = self.inner.lock().await;
        let record = inner.usage_entry(org_id, period);
        let slot = counter_slot(record, counter);
        *slot = (*slot - amount).max(0);
        record.updated_at = Utc::now();
        Ok(record.clone())
    }

    async fn increment_overage(
        &self,
        org_id: OrgId,
        period: &BillingPeriod,
        counter: UsageCounter,
        amount: i64,
    ) -> Result<UsageRecord> {
        let mut inner = self.inner.lock().await;
        let record = inner.usage_entry(org_id, period);
        *overage_slot(record, counter) += amount;
        record.updated_at = Utc::now();
        Ok(record.clone())
    }

    async fn record_overage_charge(
        &self,
        org_id: OrgId,
        period: &BillingPeriod,
        cents: i64,
    ) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let record = inner.existing_usage(org_id, period)?;
        record.overage_cents = cents;
        record.updated_at = Utc::now();
        Ok(())
    }

    async fn mark_overage_reported(&self, org_id: OrgId, period: &BillingPeriod) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let record = inner.existing_usage(org_id, period)?;
        record.overage_reported = true;
        record.updated_at = Utc::now();
        Ok(())
    }

    async fn usage_history(&self, org_id: OrgId, months: u32) -> Result<Vec<UsageRecord>> {
        let inner = self.inner.lock().await;
        let mut records: Vec<UsageRecord> = inner
            .usage
            .values()
            .filter(|r| r.org_id == org_id)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.period_start.cmp(&a.period_start));
        records.truncate(months as usize);
        Ok(records)
    }

    async fn claim_event(&self, event: &ProcessedEvent) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        if inner.events.contains_key(&event.event_id) {
            return Ok(false);
        }
        inner.events.insert(event.event_id.clone(), event.clone());
        Ok(true)
    }

    async fn release_event(&self, event_id: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.events.remove(event_id);
        Ok(())
    }

    async fn upsert_invoice(&self, invoice: &Invoice) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner
            .invoices
            .insert(invoice.external_invoice_id.clone(), invoice.clone());
        Ok(())
    }

    async fn invoices_for_org(&self, org_id: OrgId, limit: usize) -> Result<Vec<Invoice>> {
        let inner = self.inner.lock().await;
        let mut invoices: Vec<Invoice> = inner
            .invoices
            .values()
            .filter(|i| i.org_id == org_id)
            .cloned()
            .collect();
        invoices.sort_by(|a, b| b.id.to_string().cmp(&a.id.to_string()));
        invoices.truncate(limit);
        Ok(invoices)
    }

    async fn insert_payment_method(&self, method: &PaymentMethod) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner
            .payment_methods
            .entry(method.external_id.clone())
            .or_insert_with(|| method.clone());
        Ok(())
    }

    async fn delete_payment_method(&self, external_id: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.payment_methods.remove(external_id);
        Ok(())
    }

    async fn payment_methods_for_org(&self, org_id: OrgId) -> Result<Vec<PaymentMethod>> {
        let inner = self.inner.lock().await;
        let mut methods: Vec<PaymentMethod> = inner
            .payment_methods
            .values()
            .filter(|m| m.org_id == org_id)
            .cloned()
            .collect();
        methods.sort_by_key(|m| m.created_at);
        Ok(methods)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use metering_core::SubscriptionStatus;

    fn period() -> BillingPeriod {
        BillingPeriod::current()
    }

    #[tokio::test]
    async fn concurrent_increments_lose_nothing() {
        let store = Arc::new(MemoryStore::new());
        let org = OrgId::generate();

        let mut handles = Vec::new();
        for _ in 0..32 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store
                    .increment_usage(org, &period(), UsageCounter::AiRequests, 1)
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let record = store.usage_for_period(org, &period()).await.unwrap().unwrap();
        assert_eq!(record.ai_requests, 32);
    }

    #[tokio::test]
    async fn two_increments_on_fresh_period_both_land() {
        let store = Arc::new(MemoryStore::new());
        let org = OrgId::generate();

        let a = {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                store
                    .increment_usage(org, &period(), UsageCounter::AiRequests, 1)
                    .await
                    .unwrap()
            })
        };
        let b = {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                store
                    .increment_usage(org, &period(), UsageCounter::AiRequests, 1)
                    .await
                    .unwrap()
            })
        };
        a.await.unwrap();
        b.await.unwrap();

        let record = store.usage_for_period(org, &period()).await.unwrap().unwrap();
        assert_eq!(record.ai_requests, 2);
    }

    #[tokio::test]
    async fn decrement_clamps_at_zero() {
        let store = MemoryStore::new();
        let org = OrgId::generate();

        store
            .increment_usage(org, &period(), UsageCounter::Videos, 5)
            .await
            .unwrap();
        let record = store
            .decrement_usage(org, &period(), UsageCounter::Videos, 10)
            .await
            .unwrap();
        assert_eq!(record.videos_uploaded, 0);
    }

    #[tokio::test]
    async fn decrement_on_untouched_period_yields_zero_row() {
        let store = MemoryStore::new();
        let org = OrgId::generate();

        let record = store
            .decrement_usage(org, &period(), UsageCounter::Storage, 100)
            .await
            .unwrap();
        assert_eq!(record.storage_used, 0);
    }

    #[tokio::test]
    async fn create_if_absent_is_idempotent() {
        let store = Arc::new(MemoryStore::new());
        let org = OrgId::generate();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store.create_usage_if_absent(org, &period()).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let history = store.usage_history(org, 12).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].storage_used, 0);
    }

    #[tokio::test]
    async fn read_path_does_not_create_rows() {
        let store = MemoryStore::new();
        let org = OrgId::generate();

        assert!(store.usage_for_period(org, &period()).await.unwrap().is_none());
        assert!(store.usage_history(org, 12).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn event_claim_wins_once() {
        let store = MemoryStore::new();
        let event = ProcessedEvent::new("evt_1", "invoice.paid", "processor");

        assert!(store.claim_event(&event).await.unwrap());
        assert!(!store.claim_event(&event).await.unwrap());
        assert_eq!(store.processed_event_count().await, 1);
    }

    #[tokio::test]
    async fn released_event_can_be_reclaimed() {
        let store = MemoryStore::new();
        let event = ProcessedEvent::new("evt_2", "invoice.paid", "processor");

        assert!(store.claim_event(&event).await.unwrap());
        store.release_event("evt_2").await.unwrap();
        assert!(store.claim_event(&event).await.unwrap());
    }

    #[tokio::test]
    async fn current_subscription_skips_terminal_rows() {
        let store = MemoryStore::new();
        let org = OrgId::generate();

        let mut canceled = SubscriptionRecord::trial(org, "creator", 14);
        canceled.status = SubscriptionStatus::Canceled;
        store.insert_subscription(&canceled).await.unwrap();
        assert!(store.current_subscription(org).await.unwrap().is_none());

        let active = SubscriptionRecord::trial(org, "creator", 14);
        store.insert_subscription(&active).await.unwrap();
        let found = store.current_subscription(org).await.unwrap().unwrap();
        assert_eq!(found.id, active.id);
    }

    #[tokio::test]
    async fn update_missing_subscription_is_not_found() {
        let store = MemoryStore::new();
        let record = SubscriptionRecord::trial(OrgId::generate(), "creator", 14);
        let result = store.update_subscription(&record).await;
        assert!(matches!(result, Err(StoreError::NotFound { .. })));
    }
}
