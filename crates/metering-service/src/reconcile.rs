//! The webhook reconciliation engine.
//!
//! Folds the payment processor's at-least-once, possibly-duplicated,
//! possibly-out-of-order event feed into the local subscription state.
//!
//! # Idempotency
//!
//! The engine claims the event id first: an `INSERT .. ON CONFLICT DO
//! NOTHING` on the dedup table, so concurrent deliveries of the same id
//! race on the database's unique constraint and exactly one wins. If the
//! winning handler then fails, the claim is released before the error
//! surfaces, so the processor's retry is re-processed rather than silently
//! skipped. An event is never left marked processed with uncommitted
//! effects.
//!
//! # Ordering
//!
//! No ordering is assumed between deliveries. `created` upserts (a
//! duplicate or late `created` must not produce a second qualifying row);
//! `updated` and `deleted` for a subscription we have never seen fail
//! loudly; that is a reportable anomaly, not a case to mask. `invoice
//! paid` before `created` is the one tolerated race: it no-ops.

use std::sync::Arc;

use chrono::Utc;
use serde::de::DeserializeOwned;

use metering_core::{
    Invoice, InvoiceId, MeteringError, OrgId, PaymentMethod, PlanCatalog, ProcessedEvent,
    SubscriptionRecord, SubscriptionStatus,
};
use metering_store::Store;

use crate::external::{NotificationKind, NotificationSink};
use crate::ledger::store_err;
use crate::processor::types::{unix_ts, PaymentMethodObject};
use crate::processor::{
    BillingEvent, BillingEventKind, InvoiceObject, ProcessorClient, SubscriptionObject,
};

/// Source label stamped onto dedup rows.
const EVENT_SOURCE: &str = "processor";

/// What the engine did with a delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Effects were applied and committed.
    Applied,
    /// The event id had already been processed; nothing was reapplied.
    Duplicate,
    /// The event type is outside the handled set; acknowledged to stop
    /// redelivery.
    Ignored,
}

impl Disposition {
    /// Wire form for the webhook response body.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Applied => "applied",
            Self::Duplicate => "duplicate",
            Self::Ignored => "ignored",
        }
    }
}

/// The per-event-type handlers plus the dedup discipline around them.
pub struct ReconciliationEngine {
    store: Arc<dyn Store>,
    catalog: Arc<PlanCatalog>,
    notifier: Arc<dyn NotificationSink>,
    processor: Option<Arc<ProcessorClient>>,
}

impl ReconciliationEngine {
    /// Build an engine over the given store, catalog, and collaborators.
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        catalog: Arc<PlanCatalog>,
        notifier: Arc<dyn NotificationSink>,
        processor: Option<Arc<ProcessorClient>>,
    ) -> Self {
        Self {
            store,
            catalog,
            notifier,
            processor,
        }
    }

    /// Process one delivery.
    ///
    /// # Errors
    ///
    /// Surfaces handler and store failures so the sender retries the same
    /// event; the claim is released first.
    pub async fn process(&self, event: &BillingEvent) -> Result<Disposition, MeteringError> {
        let kind = BillingEventKind::parse(&event.event_type);
        if kind == BillingEventKind::Unknown {
            tracing::warn!(
                event_id = %event.id,
                event_type = %event.event_type,
                "Unhandled billing event type; acknowledging"
            );
            return Ok(Disposition::Ignored);
        }

        let claim = ProcessedEvent::new(&event.id, &event.event_type, EVENT_SOURCE);
        if !self.store.claim_event(&claim).await.map_err(store_err)? {
            tracing::info!(event_id = %event.id, "Duplicate billing event; skipping");
            return Ok(Disposition::Duplicate);
        }

        if let Err(err) = self.apply(kind, event).await {
            tracing::error!(
                event_id = %event.id,
                event_type = %event.event_type,
                error = %err,
                "Billing event handler failed; releasing claim for redelivery"
            );
            if let Err(release_err) = self.store.release_event(&event.id).await {
                // The claim row now shadows an unapplied event; it will
                // block this id until the row expires. Loud on purpose.
                tracing::error!(
                    event_id = %event.id,
                    error = %release_err,
                    "Failed to release event claim"
                );
            }
            return Err(err);
        }

        Ok(Disposition::Applied)
    }

    async fn apply(&self, kind: BillingEventKind, event: &BillingEvent) -> Result<(), MeteringError> {
        match kind {
            BillingEventKind::SubscriptionCreated => self.on_subscription_created(event).await,
            BillingEventKind::SubscriptionUpdated => self.on_subscription_updated(event).await,
            BillingEventKind::SubscriptionDeleted => self.on_subscription_deleted(event).await,
            BillingEventKind::InvoicePaid => self.on_invoice_paid(event).await,
            BillingEventKind::InvoicePaymentFailed => self.on_invoice_payment_failed(event).await,
            BillingEventKind::PaymentMethodAttached => {
                self.on_payment_method_attached(event).await
            }
            BillingEventKind::PaymentMethodDetached => {
                self.on_payment_method_detached(event).await
            }
            BillingEventKind::Unknown => Ok(()),
        }
    }

    // =========================================================================
    // Subscription lifecycle
    // =========================================================================

    async fn on_subscription_created(&self, event: &BillingEvent) -> Result<(), MeteringError> {
        let object: SubscriptionObject = decode(event)?;

        let org_id: OrgId = object
            .org_id()
            .ok_or_else(|| payload_error(event, "missing org_id metadata"))?
            .parse()
            .map_err(|_| payload_error(event, "org_id metadata is not a UUID"))?;
        let status = parse_status(&object.status)?;
        let price_id = object
            .primary_price_id()
            .ok_or_else(|| payload_error(event, "subscription has no line items"))?;
        let plan_id = self
            .catalog
            .get_by_price_id(price_id)
            .map(|plan| plan.id.clone())
            .ok_or_else(|| MeteringError::PlanNotFound {
                plan_id: price_id.to_owned(),
            })?;

        // Upsert: a duplicate or late `created`, or a checkout completing
        // over a provisioned trial, must update the existing qualifying
        // row, never add a second one.
        match self
            .store
            .current_subscription(org_id)
            .await
            .map_err(store_err)?
        {
            Some(mut record) => {
                record.plan_id = plan_id;
                apply_subscription_object(&mut record, &object, status);
                self.store
                    .update_subscription(&record)
                    .await
                    .map_err(store_err)?;
            }
            None => {
                let now = Utc::now();
                let mut record = SubscriptionRecord {
                    id: uuid::Uuid::new_v4(),
                    org_id,
                    external_customer_id: None,
                    external_subscription_id: None,
                    plan_id,
                    status,
                    current_period_start: now,
                    current_period_end: now,
                    trial_start: None,
                    trial_end: None,
                    cancel_at_period_end: false,
                    canceled_at: None,
                    ended_at: None,
                    seat_count: 1,
                    created_at: now,
                    updated_at: now,
                };
                apply_subscription_object(&mut record, &object, status);
                self.store
                    .insert_subscription(&record)
                    .await
                    .map_err(store_err)?;
            }
        }

        tracing::info!(
            org_id = %org_id,
            subscription = %object.id,
            status = %status,
            "Subscription created"
        );
        self.notify(org_id, NotificationKind::SubscriptionCreated, &object.id)
            .await;
        Ok(())
    }

    async fn on_subscription_updated(&self, event: &BillingEvent) -> Result<(), MeteringError> {
        let object: SubscriptionObject = decode(event)?;

        let mut record = self
            .store
            .subscription_by_external_id(&object.id)
            .await
            .map_err(store_err)?
            .ok_or_else(|| MeteringError::InvalidTransition {
                reason: format!("update event for unknown subscription {}", object.id),
            })?;
        let status = parse_status(&object.status)?;

        // Re-resolve the plan when the price changed. Some processors send
        // updated events without line items; the outbound fetch fills the
        // gap when a client is configured.
        let price_id = match object.primary_price_id() {
            Some(id) => Some(id.to_owned()),
            None => match &self.processor {
                Some(client) => match client.fetch_subscription(&object.id).await {
                    Ok(full) => full.primary_price_id().map(ToOwned::to_owned),
                    Err(err) => {
                        tracing::warn!(
                            subscription = %object.id,
                            error = %err,
                            "Could not fetch subscription line items; keeping current plan"
                        );
                        None
                    }
                },
                None => None,
            },
        };
        if let Some(price_id) = price_id {
            if let Some(plan) = self.catalog.get_by_price_id(&price_id) {
                if plan.id != record.plan_id {
                    tracing::info!(
                        org_id = %record.org_id,
                        from = %record.plan_id,
                        to = %plan.id,
                        "Plan changed"
                    );
                }
                record.plan_id = plan.id.clone();
            } else {
                tracing::warn!(
                    subscription = %object.id,
                    price_id = %price_id,
                    "Unknown price on subscription update; keeping current plan"
                );
            }
        }

        apply_subscription_object(&mut record, &object, status);
        self.store
            .update_subscription(&record)
            .await
            .map_err(store_err)?;

        tracing::info!(
            org_id = %record.org_id,
            subscription = %object.id,
            status = %status,
            "Subscription updated"
        );
        self.notify(
            record.org_id,
            NotificationKind::SubscriptionUpdated,
            &object.id,
        )
        .await;
        Ok(())
    }

    async fn on_subscription_deleted(&self, event: &BillingEvent) -> Result<(), MeteringError> {
        let object: SubscriptionObject = decode(event)?;

        let mut record = self
            .store
            .subscription_by_external_id(&object.id)
            .await
            .map_err(store_err)?
            .ok_or_else(|| MeteringError::InvalidTransition {
                reason: format!("delete event for unknown subscription {}", object.id),
            })?;

        let now = Utc::now();
        record.status = SubscriptionStatus::Canceled;
        record.external_subscription_id = None;
        record.cancel_at_period_end = false;
        record.canceled_at = unix_ts(object.canceled_at).or(Some(now));
        record.ended_at = unix_ts(object.ended_at).or(Some(now));
        self.store
            .update_subscription(&record)
            .await
            .map_err(store_err)?;

        tracing::info!(
            org_id = %record.org_id,
            subscription = %object.id,
            "Subscription canceled"
        );
        self.notify(
            record.org_id,
            NotificationKind::SubscriptionCanceled,
            &object.id,
        )
        .await;
        Ok(())
    }

    // =========================================================================
    // Invoices
    // =========================================================================

    async fn on_invoice_paid(&self, event: &BillingEvent) -> Result<(), MeteringError> {
        let object: InvoiceObject = decode(event)?;

        let Some(subscription_id) = object.subscription.clone() else {
            tracing::debug!(invoice = %object.id, "Invoice without a subscription; ignoring");
            return Ok(());
        };

        // An invoice can land before its subscription's `created` event in
        // rare races; tolerated, the next delivery attempt of `created`
        // will build the row.
        let Some(mut record) = self
            .store
            .subscription_by_external_id(&subscription_id)
            .await
            .map_err(store_err)?
        else {
            tracing::info!(
                invoice = %object.id,
                subscription = %subscription_id,
                "Invoice paid for a subscription not yet mirrored; ignoring"
            );
            return Ok(());
        };

        let now = Utc::now();
        let invoice = Invoice {
            id: InvoiceId::generate(),
            org_id: record.org_id,
            external_invoice_id: object.id.clone(),
            external_subscription_id: Some(subscription_id),
            amount_cents: object.amount_paid,
            currency: object.currency.clone(),
            status: "paid".into(),
            paid_at: unix_ts(Some(event.created)).or(Some(now)),
            created_at: now,
        };
        self.store
            .upsert_invoice(&invoice)
            .await
            .map_err(store_err)?;

        record.status = SubscriptionStatus::Active;
        self.store
            .update_subscription(&record)
            .await
            .map_err(store_err)?;

        tracing::info!(
            org_id = %record.org_id,
            invoice = %object.id,
            amount_cents = object.amount_paid,
            "Invoice paid"
        );
        self.notify(record.org_id, NotificationKind::PaymentSucceeded, &object.id)
            .await;
        Ok(())
    }

    async fn on_invoice_payment_failed(&self, event: &BillingEvent) -> Result<(), MeteringError> {
        let object: InvoiceObject = decode(event)?;

        let Some(subscription_id) = object.subscription.clone() else {
            tracing::debug!(invoice = %object.id, "Failed invoice without a subscription; ignoring");
            return Ok(());
        };
        let Some(mut record) = self
            .store
            .subscription_by_external_id(&subscription_id)
            .await
            .map_err(store_err)?
        else {
            tracing::warn!(
                invoice = %object.id,
                subscription = %subscription_id,
                "Payment failure for a subscription not yet mirrored; ignoring"
            );
            return Ok(());
        };

        record.status = SubscriptionStatus::PastDue;
        self.store
            .update_subscription(&record)
            .await
            .map_err(store_err)?;

        tracing::warn!(
            org_id = %record.org_id,
            invoice = %object.id,
            "Invoice payment failed; subscription past due"
        );
        self.notify(record.org_id, NotificationKind::PaymentFailed, &object.id)
            .await;
        Ok(())
    }

    // =========================================================================
    // Payment methods
    // =========================================================================

    async fn on_payment_method_attached(&self, event: &BillingEvent) -> Result<(), MeteringError> {
        let object: PaymentMethodObject = decode(event)?;

        let Some(customer) = object.customer.clone() else {
            tracing::debug!(payment_method = %object.id, "Detached-customer attach event; ignoring");
            return Ok(());
        };
        let Some(record) = self
            .store
            .subscription_by_customer_id(&customer)
            .await
            .map_err(store_err)?
        else {
            tracing::warn!(
                payment_method = %object.id,
                customer = %customer,
                "Payment method for an unknown customer; ignoring"
            );
            return Ok(());
        };

        let card = object.card.as_ref();
        let method = PaymentMethod {
            org_id: record.org_id,
            external_id: object.id.clone(),
            brand: card.and_then(|c| c.brand.clone()),
            last4: card.and_then(|c| c.last4.clone()),
            exp_month: card.and_then(|c| c.exp_month),
            exp_year: card.and_then(|c| c.exp_year),
            created_at: Utc::now(),
        };
        self.store
            .insert_payment_method(&method)
            .await
            .map_err(store_err)?;

        tracing::info!(org_id = %record.org_id, payment_method = %object.id, "Payment method attached");
        Ok(())
    }

    async fn on_payment_method_detached(&self, event: &BillingEvent) -> Result<(), MeteringError> {
        let object: PaymentMethodObject = decode(event)?;
        self.store
            .delete_payment_method(&object.id)
            .await
            .map_err(store_err)?;
        tracing::info!(payment_method = %object.id, "Payment method detached");
        Ok(())
    }

    /// Best-effort notification send. A dispatcher failure must never fail
    /// the reconciliation (the event would be redelivered and reapplied).
    async fn notify(&self, org_id: OrgId, kind: NotificationKind, detail: &str) {
        if let Err(err) = self.notifier.subscription_event(org_id, kind, detail).await {
            tracing::warn!(
                org_id = %org_id,
                kind = ?kind,
                error = %err,
                "Subscription notification failed"
            );
        }
    }
}

/// Copy the processor object's fields onto the local record.
fn apply_subscription_object(
    record: &mut SubscriptionRecord,
    object: &SubscriptionObject,
    status: SubscriptionStatus,
) {
    record.external_customer_id = object.customer.clone();
    record.external_subscription_id = Some(object.id.clone());
    record.status = status;
    if let Some(start) = unix_ts(object.current_period_start) {
        record.current_period_start = start;
    }
    if let Some(end) = unix_ts(object.current_period_end) {
        record.current_period_end = end;
    }
    record.trial_start = unix_ts(object.trial_start).or(record.trial_start);
    record.trial_end = unix_ts(object.trial_end).or(record.trial_end);
    record.cancel_at_period_end = object.cancel_at_period_end;
    record.canceled_at = unix_ts(object.canceled_at);
    record.ended_at = unix_ts(object.ended_at);
    record.seat_count = object.seat_count();
    record.updated_at = Utc::now();
}

fn decode<T: DeserializeOwned>(event: &BillingEvent) -> Result<T, MeteringError> {
    serde_json::from_value(event.data.object.clone()).map_err(|err| payload_error(event, &err.to_string()))
}

fn payload_error(event: &BillingEvent, detail: &str) -> MeteringError {
    MeteringError::External {
        service: EVENT_SOURCE.into(),
        message: format!("bad {} payload ({}): {detail}", event.event_type, event.id),
    }
}

fn parse_status(status: &str) -> Result<SubscriptionStatus, MeteringError> {
    SubscriptionStatus::from_processor(status).ok_or_else(|| MeteringError::UnknownStatus {
        status: status.to_owned(),
    })
}
