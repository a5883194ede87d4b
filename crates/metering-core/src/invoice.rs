//! Invoice and payment-method records mirrored from the payment processor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{InvoiceId, OrgId};

/// A locally-mirrored invoice.
///
/// Upserted by the reconciliation engine when `invoice paid` arrives; the
/// processor's invoice id carries the uniqueness so redelivery cannot
/// duplicate rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    /// Local, time-ordered record id.
    pub id: InvoiceId,
    /// Owning organization.
    pub org_id: OrgId,
    /// Processor invoice id.
    pub external_invoice_id: String,
    /// Processor subscription id the invoice belongs to.
    pub external_subscription_id: Option<String>,
    /// Amount billed, in cents.
    pub amount_cents: i64,
    /// ISO currency code.
    pub currency: String,
    /// Processor status string ("paid", "open", ...).
    pub status: String,
    /// When the invoice was paid, if it was.
    pub paid_at: Option<DateTime<Utc>>,
    /// Row creation time.
    pub created_at: DateTime<Utc>,
}

/// A payment method on file, mirrored for display purposes only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentMethod {
    /// Owning organization.
    pub org_id: OrgId,
    /// Processor payment-method id.
    pub external_id: String,
    /// Card brand or payment rail ("visa", "sepa_debit", ...).
    pub brand: Option<String>,
    /// Last four digits, when the method is a card.
    pub last4: Option<String>,
    /// Expiry month, when the method is a card.
    pub exp_month: Option<i32>,
    /// Expiry year, when the method is a card.
    pub exp_year: Option<i32>,
    /// Row creation time.
    pub created_at: DateTime<Utc>,
}
