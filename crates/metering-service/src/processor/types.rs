//! Typed payment-processor objects.
//!
//! Payloads are deserialized tolerantly (`#[serde(default)]` on everything
//! the handlers can live without) because the processor adds fields freely;
//! the event *kind*, by contrast, is a closed enum so dispatch is an
//! exhaustive match with an explicit unknown branch, not an open string
//! switch with a silent default.

use chrono::{DateTime, Utc};
use serde::Deserialize;

/// A webhook delivery from the payment processor.
#[derive(Debug, Clone, Deserialize)]
pub struct BillingEvent {
    /// Stable event id (the dedup key).
    pub id: String,
    /// Event type string (e.g. "customer.subscription.created").
    #[serde(rename = "type")]
    pub event_type: String,
    /// Event payload.
    pub data: BillingEventData,
    /// Created timestamp (Unix seconds).
    #[serde(default)]
    pub created: i64,
}

/// Event payload container.
#[derive(Debug, Clone, Deserialize)]
pub struct BillingEventData {
    /// The object the event describes.
    pub object: serde_json::Value,
}

/// The closed set of event types the reconciliation engine handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BillingEventKind {
    /// A subscription was created (checkout completed).
    SubscriptionCreated,
    /// A subscription changed.
    SubscriptionUpdated,
    /// A subscription ended.
    SubscriptionDeleted,
    /// An invoice was paid.
    InvoicePaid,
    /// An invoice payment failed.
    InvoicePaymentFailed,
    /// A payment method was attached to a customer.
    PaymentMethodAttached,
    /// A payment method was detached.
    PaymentMethodDetached,
    /// Anything else: acknowledged to stop redelivery, logged for
    /// visibility, never silently matched.
    Unknown,
}

impl BillingEventKind {
    /// Classify an event type string.
    #[must_use]
    pub fn parse(event_type: &str) -> Self {
        match event_type {
            "customer.subscription.created" => Self::SubscriptionCreated,
            "customer.subscription.updated" => Self::SubscriptionUpdated,
            "customer.subscription.deleted" => Self::SubscriptionDeleted,
            "invoice.paid" | "invoice.payment_succeeded" => Self::InvoicePaid,
            "invoice.payment_failed" => Self::InvoicePaymentFailed,
            "payment_method.attached" => Self::PaymentMethodAttached,
            "payment_method.detached" => Self::PaymentMethodDetached,
            _ => Self::Unknown,
        }
    }
}

/// Convert a Unix-seconds timestamp into a UTC instant, dropping zero and
/// out-of-range values.
#[must_use]
pub fn unix_ts(seconds: Option<i64>) -> Option<DateTime<Utc>> {
    seconds
        .filter(|s| *s > 0)
        .and_then(|s| DateTime::from_timestamp(s, 0))
}

/// The processor's subscription object.
#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionObject {
    /// Processor subscription id.
    pub id: String,
    /// Processor customer id.
    #[serde(default)]
    pub customer: Option<String>,
    /// Processor status string.
    #[serde(default)]
    pub status: String,
    /// Line items (the first item's price identifies the plan).
    #[serde(default)]
    pub items: SubscriptionItems,
    /// Current period start (Unix seconds).
    #[serde(default)]
    pub current_period_start: Option<i64>,
    /// Current period end (Unix seconds).
    #[serde(default)]
    pub current_period_end: Option<i64>,
    /// Trial start (Unix seconds).
    #[serde(default)]
    pub trial_start: Option<i64>,
    /// Trial end (Unix seconds).
    #[serde(default)]
    pub trial_end: Option<i64>,
    /// Whether the subscriber chose to cancel at the period boundary.
    #[serde(default)]
    pub cancel_at_period_end: bool,
    /// When cancellation was requested (Unix seconds).
    #[serde(default)]
    pub canceled_at: Option<i64>,
    /// When the subscription ended (Unix seconds).
    #[serde(default)]
    pub ended_at: Option<i64>,
    /// Free-form metadata; checkout stamps `org_id` here.
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// Subscription line-item list.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubscriptionItems {
    /// The items.
    #[serde(default)]
    pub data: Vec<SubscriptionItem>,
}

/// One subscription line item.
#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionItem {
    /// The price attached to the item.
    pub price: Price,
    /// Seat quantity.
    #[serde(default)]
    pub quantity: Option<i64>,
}

/// A processor price reference.
#[derive(Debug, Clone, Deserialize)]
pub struct Price {
    /// Price id, resolvable through the plan catalog.
    pub id: String,
}

impl SubscriptionObject {
    /// The price id of the first line item, if any.
    #[must_use]
    pub fn primary_price_id(&self) -> Option<&str> {
        self.items.data.first().map(|item| item.price.id.as_str())
    }

    /// The seat quantity of the first line item, defaulting to one.
    #[must_use]
    pub fn seat_count(&self) -> i32 {
        self.items
            .data
            .first()
            .and_then(|item| item.quantity)
            .and_then(|q| i32::try_from(q).ok())
            .unwrap_or(1)
    }

    /// The organization id stamped into metadata at checkout.
    #[must_use]
    pub fn org_id(&self) -> Option<&str> {
        self.metadata.get("org_id").and_then(|v| v.as_str())
    }
}

/// The processor's invoice object.
#[derive(Debug, Clone, Deserialize)]
pub struct InvoiceObject {
    /// Processor invoice id.
    pub id: String,
    /// Processor customer id.
    #[serde(default)]
    pub customer: Option<String>,
    /// Processor subscription id the invoice bills.
    #[serde(default)]
    pub subscription: Option<String>,
    /// Amount due, in cents.
    #[serde(default)]
    pub amount_due: i64,
    /// Amount paid, in cents.
    #[serde(default)]
    pub amount_paid: i64,
    /// ISO currency code.
    #[serde(default = "default_currency")]
    pub currency: String,
    /// Processor status string ("paid", "open", ...).
    #[serde(default)]
    pub status: String,
}

fn default_currency() -> String {
    "usd".into()
}

/// The processor's payment-method object.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentMethodObject {
    /// Processor payment-method id.
    pub id: String,
    /// Processor customer id the method belongs to.
    #[serde(default)]
    pub customer: Option<String>,
    /// Card details, when the method is a card.
    #[serde(default)]
    pub card: Option<CardDetails>,
}

/// Card display details.
#[derive(Debug, Clone, Deserialize)]
pub struct CardDetails {
    /// Card brand ("visa", ...).
    #[serde(default)]
    pub brand: Option<String>,
    /// Last four digits.
    #[serde(default)]
    pub last4: Option<String>,
    /// Expiry month.
    #[serde(default)]
    pub exp_month: Option<i32>,
    /// Expiry year.
    #[serde(default)]
    pub exp_year: Option<i32>,
}
