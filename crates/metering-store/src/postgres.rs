//! PostgreSQL storage implementation.
//!
//! Every counter mutation is a single SQL statement (`SET c = c + $n`,
//! `GREATEST(0, c - $n)`), never a read-modify-write in application code,
//! and webhook dedup is an `INSERT .. ON CONFLICT DO NOTHING` so the
//! database's unique-constraint enforcement closes the duplicate-delivery
//! race.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use uuid::Uuid;

use metering_core::{
    BillingPeriod, Invoice, InvoiceId, OrgId, PaymentMethod, ProcessedEvent, SubscriptionRecord,
    SubscriptionStatus, UsageCounter, UsageRecord,
};

use crate::error::{Result, StoreError};
use crate::schema::{table, SUBSCRIPTION_COLUMNS, USAGE_COLUMNS};
use crate::Store;

/// PostgreSQL-backed storage implementation.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Wrap an existing connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect to the database and build a store.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Run the embedded schema migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if a migration fails to apply.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(())
    }

    /// The underlying pool (used by health checks).
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Column name for a consumption counter. The enum is closed, so splicing
/// these into SQL text is safe.
const fn usage_column(counter: UsageCounter) -> &'static str {
    match counter {
        UsageCounter::Storage => "storage_used",
        UsageCounter::Videos => "videos_uploaded",
        UsageCounter::Bandwidth => "bandwidth_used",
        UsageCounter::AiRequests => "ai_requests",
    }
}

/// Column name for an overage counter.
const fn overage_column(counter: UsageCounter) -> &'static str {
    match counter {
        UsageCounter::Storage => "storage_overage",
        UsageCounter::Videos => "videos_overage",
        UsageCounter::Bandwidth => "bandwidth_overage",
        UsageCounter::AiRequests => "ai_requests_overage",
    }
}

// ============================================================================
// Row types
// ============================================================================

#[derive(sqlx::FromRow)]
struct SubscriptionRow {
    id: Uuid,
    org_id: Uuid,
    external_customer_id: Option<String>,
    external_subscription_id: Option<String>,
    plan_id: String,
    status: String,
    current_period_start: DateTime<Utc>,
    current_period_end: DateTime<Utc>,
    trial_start: Option<DateTime<Utc>>,
    trial_end: Option<DateTime<Utc>>,
    cancel_at_period_end: bool,
    canceled_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    seat_count: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<SubscriptionRow> for SubscriptionRecord {
    type Error = StoreError;

    fn try_from(row: SubscriptionRow) -> Result<Self> {
        let status = SubscriptionStatus::from_processor(&row.status).ok_or_else(|| {
            StoreError::Corrupt {
                entity: "subscription",
                id: row.id.to_string(),
                detail: format!("unknown status {:?}", row.status),
            }
        })?;
        Ok(Self {
            id: row.id,
            org_id: OrgId::from_uuid(row.org_id),
            external_customer_id: row.external_customer_id,
            external_subscription_id: row.external_subscription_id,
            plan_id: row.plan_id,
            status,
            current_period_start: row.current_period_start,
            current_period_end: row.current_period_end,
            trial_start: row.trial_start,
            trial_end: row.trial_end,
            cancel_at_period_end: row.cancel_at_period_end,
            canceled_at: row.canceled_at,
            ended_at: row.ended_at,
            seat_count: row.seat_count,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct UsageRow {
    org_id: Uuid,
    period_start: DateTime<Utc>,
    period_end: DateTime<Utc>,
    storage_used: i64,
    videos_uploaded: i64,
    bandwidth_used: i64,
    ai_requests: i64,
    storage_overage: i64,
    videos_overage: i64,
    bandwidth_overage: i64,
    ai_requests_overage: i64,
    overage_cents: i64,
    overage_reported: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<UsageRow> for UsageRecord {
    fn from(row: UsageRow) -> Self {
        Self {
            org_id: OrgId::from_uuid(row.org_id),
            period_start: row.period_start,
            period_end: row.period_end,
            storage_used: row.storage_used,
            videos_uploaded: row.videos_uploaded,
            bandwidth_used: row.bandwidth_used,
            ai_requests: row.ai_requests,
            storage_overage: row.storage_overage,
            videos_overage: row.videos_overage,
            bandwidth_overage: row.bandwidth_overage,
            ai_requests_overage: row.ai_requests_overage,
            overage_cents: row.overage_cents,
            overage_reported: row.overage_reported,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct InvoiceRow {
    id: String,
    org_id: Uuid,
    external_invoice_id: String,
    external_subscription_id: Option<String>,
    amount_cents: i64,
    currency: String,
    status: String,
    paid_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<InvoiceRow> for Invoice {
    type Error = StoreError;

    fn try_from(row: InvoiceRow) -> Result<Self> {
        let id: InvoiceId = row.id.parse().map_err(|_| StoreError::Corrupt {
            entity: "invoice",
            id: row.id.clone(),
            detail: "id is not a ULID".into(),
        })?;
        Ok(Self {
            id,
            org_id: OrgId::from_uuid(row.org_id),
            external_invoice_id: row.external_invoice_id,
            external_subscription_id: row.external_subscription_id,
            amount_cents: row.amount_cents,
            currency: row.currency,
            status: row.status,
            paid_at: row.paid_at,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct PaymentMethodRow {
    external_id: String,
    org_id: Uuid,
    brand: Option<String>,
    last4: Option<String>,
    exp_month: Option<i32>,
    exp_year: Option<i32>,
    created_at: DateTime<Utc>,
}

impl From<PaymentMethodRow> for PaymentMethod {
    fn from(row: PaymentMethodRow) -> Self {
        Self {
            org_id: OrgId::from_uuid(row.org_id),
            external_id: row.external_id,
            brand: row.brand,
            last4: row.last4,
            exp_month: row.exp_month,
            exp_year: row.exp_year,
            created_at: row.created_at,
        }
    }
}

// ============================================================================
// Store implementation
// ============================================================================

#[async_trait]
impl Store for PgStore {
    async fn current_subscription(&self, org_id: OrgId) -> Result<Option<SubscriptionRecord>> {
        let sql = format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM {} \
             WHERE org_id = $1 AND status IN ('trialing', 'active', 'past_due', 'unpaid') \
             ORDER BY created_at DESC LIMIT 1",
            table::SUBSCRIPTIONS
        );
        let row: Option<SubscriptionRow> = sqlx::query_as(&sql)
            .bind(org_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.map(SubscriptionRecord::try_from).transpose()
    }

    async fn subscription_by_external_id(
        &self,
        external_subscription_id: &str,
    ) -> Result<Option<SubscriptionRecord>> {
        let sql = format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM {} WHERE external_subscription_id = $1",
            table::SUBSCRIPTIONS
        );
        let row: Option<SubscriptionRow> = sqlx::query_as(&sql)
            .bind(external_subscription_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(SubscriptionRecord::try_from).transpose()
    }

    async fn subscription_by_customer_id(
        &self,
        external_customer_id: &str,
    ) -> Result<Option<SubscriptionRecord>> {
        let sql = format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM {} WHERE external_customer_id = $1 \
             ORDER BY created_at DESC LIMIT 1",
            table::SUBSCRIPTIONS
        );
        let row: Option<SubscriptionRow> = sqlx::query_as(&sql)
            .bind(external_customer_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(SubscriptionRecord::try_from).transpose()
    }

    async fn insert_subscription(&self, record: &SubscriptionRecord) -> Result<()> {
        let sql = format!(
            "INSERT INTO {} ({SUBSCRIPTION_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)",
            table::SUBSCRIPTIONS
        );
        sqlx::query(&sql)
            .bind(record.id)
            .bind(record.org_id.as_uuid())
            .bind(&record.external_customer_id)
            .bind(&record.external_subscription_id)
            .bind(&record.plan_id)
            .bind(record.status.as_str())
            .bind(record.current_period_start)
            .bind(record.current_period_end)
            .bind(record.trial_start)
            .bind(record.trial_end)
            .bind(record.cancel_at_period_end)
            .bind(record.canceled_at)
            .bind(record.ended_at)
            .bind(record.seat_count)
            .bind(record.created_at)
            .bind(record.updated_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn update_subscription(&self, record: &SubscriptionRecord) -> Result<()> {
        let sql = format!(
            "UPDATE {} SET \
             external_customer_id = $2, external_subscription_id = $3, plan_id = $4, \
             status = $5, current_period_start = $6, current_period_end = $7, \
             trial_start = $8, trial_end = $9, cancel_at_period_end = $10, \
             canceled_at = $11, ended_at = $12, seat_count = $13, updated_at = NOW() \
             WHERE id = $1",
            table::SUBSCRIPTIONS
        );
        let result = sqlx::query(&sql)
            .bind(record.id)
            .bind(&record.external_customer_id)
            .bind(&record.external_subscription_id)
            .bind(&record.plan_id)
            .bind(record.status.as_str())
            .bind(record.current_period_start)
            .bind(record.current_period_end)
            .bind(record.trial_start)
            .bind(record.trial_end)
            .bind(record.cancel_at_period_end)
            .bind(record.canceled_at)
            .bind(record.ended_at)
            .bind(record.seat_count)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                entity: "subscription",
                id: record.id.to_string(),
            });
        }
        Ok(())
    }

    async fn usage_for_period(
        &self,
        org_id: OrgId,
        period: &BillingPeriod,
    ) -> Result<Option<UsageRecord>> {
        let sql = format!(
            "SELECT {USAGE_COLUMNS} FROM {} WHERE org_id = $1 AND period_start = $2",
            table::USAGE_RECORDS
        );
        let row: Option<UsageRow> = sqlx::query_as(&sql)
            .bind(org_id.as_uuid())
            .bind(period.start)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(UsageRecord::from))
    }

    async fn create_usage_if_absent(
        &self,
        org_id: OrgId,
        period: &BillingPeriod,
    ) -> Result<UsageRecord> {
        // The ON CONFLICT makes concurrent first-writers converge on one
        // row; the follow-up select reads whichever writer won.
        let insert = format!(
            "INSERT INTO {} (org_id, period_start, period_end) VALUES ($1, $2, $3) \
             ON CONFLICT (org_id, period_start) DO NOTHING",
            table::USAGE_RECORDS
        );
        sqlx::query(&insert)
            .bind(org_id.as_uuid())
            .bind(period.start)
            .bind(period.end)
            .execute(&self.pool)
            .await?;

        self.usage_for_period(org_id, period)
            .await?
            .ok_or_else(|| StoreError::NotFound {
                entity: "usage record",
                id: format!("{org_id}/{}", period.start),
            })
    }

    async fn increment_usage(
        &self,
        org_id: OrgId,
        period: &BillingPeriod,
        counter: UsageCounter,
        amount: i64,
    ) -> Result<UsageRecord> {
        let col = usage_column(counter);
        let sql = format!(
            "INSERT INTO {t} (org_id, period_start, period_end, {col}) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (org_id, period_start) \
             DO UPDATE SET {col} = {t}.{col} + $4, updated_at = NOW() \
             RETURNING {USAGE_COLUMNS}",
            t = table::USAGE_RECORDS
        );
        let row: UsageRow = sqlx::query_as(&sql)
            .bind(org_id.as_uuid())
            .bind(period.start)
            .bind(period.end)
            .bind(amount)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.into())
    }

    async fn decrement_usage(
        &self,
        org_id: OrgId,
        period: &BillingPeriod,
        counter: UsageCounter,
        amount: i64,
    ) -> Result<UsageRecord> {
        let col = usage_column(counter);
        // Inserting a zero row on conflict-miss means decrementing an
        // untouched period yields a (clamped) zero row, not an error.
        let sql = format!(
            "INSERT INTO {t} (org_id, period_start, period_end) \
             VALUES ($1, $2, $3) \
             ON CONFLICT (org_id, period_start) \
             DO UPDATE SET {col} = GREATEST(0, {t}.{col} - $4), updated_at = NOW() \
             RETURNING {USAGE_COLUMNS}",
            t = table::USAGE_RECORDS
        );
        let row: UsageRow = sqlx::query_as(&sql)
            .bind(org_id.as_uuid())
            .bind(period.start)
            .bind(period.end)
            .bind(amount)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.into())
    }

    async fn increment_overage(
        &self,
        org_id: OrgId,
        period: &BillingPeriod,
        counter: UsageCounter,
        amount: i64,
    ) -> Result<UsageRecord> {
        let col = overage_column(counter);
        let sql = format!(
            "INSERT INTO {t} (org_id, period_start, period_end, {col}) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (org_id, period_start) \
             DO UPDATE SET {col} = {t}.{col} + $4, updated_at = NOW() \
             RETURNING {USAGE_COLUMNS}",
            t = table::USAGE_RECORDS
        );
        let row: UsageRow = sqlx::query_as(&sql)
            .bind(org_id.as_uuid())
            .bind(period.start)
            .bind(period.end)
            .bind(amount)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.into())
    }

    async fn record_overage_charge(
        &self,
        org_id: OrgId,
        period: &BillingPeriod,
        cents: i64,
    ) -> Result<()> {
        let sql = format!(
            "UPDATE {} SET overage_cents = $3, updated_at = NOW() \
             WHERE org_id = $1 AND period_start = $2",
            table::USAGE_RECORDS
        );
        let result = sqlx::query(&sql)
            .bind(org_id.as_uuid())
            .bind(period.start)
            .bind(cents)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                entity: "usage record",
                id: format!("{org_id}/{}", period.start),
            });
        }
        Ok(())
    }

    async fn mark_overage_reported(&self, org_id: OrgId, period: &BillingPeriod) -> Result<()> {
        let sql = format!(
            "UPDATE {} SET overage_reported = TRUE, updated_at = NOW() \
             WHERE org_id = $1 AND period_start = $2",
            table::USAGE_RECORDS
        );
        let result = sqlx::query(&sql)
            .bind(org_id.as_uuid())
            .bind(period.start)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound {
                entity: "usage record",
                id: format!("{org_id}/{}", period.start),
            });
        }
        Ok(())
    }

    async fn usage_history(&self, org_id: OrgId, months: u32) -> Result<Vec<UsageRecord>> {
        let sql = format!(
            "SELECT {USAGE_COLUMNS} FROM {} WHERE org_id = $1 \
             ORDER BY period_start DESC LIMIT $2",
            table::USAGE_RECORDS
        );
        let rows: Vec<UsageRow> = sqlx::query_as(&sql)
            .bind(org_id.as_uuid())
            .bind(i64::from(months))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(UsageRecord::from).collect())
    }

    async fn claim_event(&self, event: &ProcessedEvent) -> Result<bool> {
        let sql = format!(
            "INSERT INTO {} (event_id, event_type, source, processed_at, expires_at) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (event_id) DO NOTHING",
            table::WEBHOOK_EVENTS
        );
        let result = sqlx::query(&sql)
            .bind(&event.event_id)
            .bind(&event.event_type)
            .bind(&event.source)
            .bind(event.processed_at)
            .bind(event.expires_at)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn release_event(&self, event_id: &str) -> Result<()> {
        let sql = format!("DELETE FROM {} WHERE event_id = $1", table::WEBHOOK_EVENTS);
        sqlx::query(&sql).bind(event_id).execute(&self.pool).await?;
        Ok(())
    }

    async fn upsert_invoice(&self, invoice: &Invoice) -> Result<()> {
        let sql = format!(
            "INSERT INTO {} (id, org_id, external_invoice_id, external_subscription_id, \
             amount_cents, currency, status, paid_at, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             ON CONFLICT (external_invoice_id) \
             DO UPDATE SET amount_cents = $5, status = $7, paid_at = $8",
            table::INVOICES
        );
        sqlx::query(&sql)
            .bind(invoice.id.to_string())
            .bind(invoice.org_id.as_uuid())
            .bind(&invoice.external_invoice_id)
            .bind(&invoice.external_subscription_id)
            .bind(invoice.amount_cents)
            .bind(&invoice.currency)
            .bind(&invoice.status)
            .bind(invoice.paid_at)
            .bind(invoice.created_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn invoices_for_org(&self, org_id: OrgId, limit: usize) -> Result<Vec<Invoice>> {
        let sql = format!(
            "SELECT id, org_id, external_invoice_id, external_subscription_id, \
             amount_cents, currency, status, paid_at, created_at \
             FROM {} WHERE org_id = $1 ORDER BY id DESC LIMIT $2",
            table::INVOICES
        );
        let rows: Vec<InvoiceRow> = sqlx::query_as(&sql)
            .bind(org_id.as_uuid())
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Invoice::try_from).collect()
    }

    async fn insert_payment_method(&self, method: &PaymentMethod) -> Result<()> {
        let sql = format!(
            "INSERT INTO {} (external_id, org_id, brand, last4, exp_month, exp_year, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (external_id) DO NOTHING",
            table::PAYMENT_METHODS
        );
        sqlx::query(&sql)
            .bind(&method.external_id)
            .bind(method.org_id.as_uuid())
            .bind(&method.brand)
            .bind(&method.last4)
            .bind(method.exp_month)
            .bind(method.exp_year)
            .bind(method.created_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_payment_method(&self, external_id: &str) -> Result<()> {
        let sql = format!("DELETE FROM {} WHERE external_id = $1", table::PAYMENT_METHODS);
        sqlx::query(&sql).bind(external_id).execute(&self.pool).await?;
        Ok(())
    }

    async fn payment_methods_for_org(&self, org_id: OrgId) -> Result<Vec<PaymentMethod>> {
        let sql = format!(
            "SELECT external_id, org_id, brand, last4, exp_month, exp_year, created_at \
             FROM {} WHERE org_id = $1 ORDER BY created_at",
            table::PAYMENT_METHODS
        );
        let rows: Vec<PaymentMethodRow> = sqlx::query_as(&sql)
            .bind(org_id.as_uuid())
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(PaymentMethod::from).collect())
    }
}
