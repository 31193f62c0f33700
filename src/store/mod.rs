//! Persistence seam for the pricing singleton and per-user quota rows.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::QuotaResult;
use crate::period::Period;
use crate::pricing::{PricingAuditEvent, PricingChange, PricingConfig};
use crate::quota::ListingQuota;

pub use memory::InMemoryQuotaStore;
pub use postgres::PgQuotaStore;

/// Mutation applied to the locked pricing singleton. Returning an error aborts without writing.
pub type ConfigMutation =
    Box<dyn FnOnce(&mut PricingConfig) -> QuotaResult<PricingChange> + Send + 'static>;

/// Aggregate consumption for one period across all users.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PeriodTotals {
    pub free_listings: i64,
    pub paid_listings: i64,
    pub active_users: i64,
}

/// key: quota-store -> storage contract
///
/// Implementations guarantee:
/// * at most one pricing row ever exists, created from `defaults` on first access;
/// * `mutate_config` runs with exclusive access to that row and writes the audit event atomically;
/// * at most one quota row per `(user_id, period)`, even under racing first access;
/// * quota timestamps come from the caller's `now`, never the store's own clock;
/// * `consume_free_listing` is a single conditional increment, returning `None` when exhausted.
#[async_trait]
pub trait QuotaStore: Send + Sync {
    async fn get_or_create_config(&self, defaults: &PricingConfig) -> QuotaResult<PricingConfig>;

    async fn mutate_config(
        &self,
        defaults: &PricingConfig,
        admin_id: Uuid,
        now: DateTime<Utc>,
        mutation: ConfigMutation,
    ) -> QuotaResult<PricingConfig>;

    async fn pricing_audit_log(&self, limit: i64) -> QuotaResult<Vec<PricingAuditEvent>>;

    async fn get_or_create_quota(
        &self,
        user_id: Uuid,
        period: Period,
        free_listings_limit: i32,
        now: DateTime<Utc>,
    ) -> QuotaResult<ListingQuota>;

    async fn consume_free_listing(
        &self,
        user_id: Uuid,
        period: Period,
        free_listings_limit: i32,
        now: DateTime<Utc>,
    ) -> QuotaResult<Option<ListingQuota>>;

    async fn add_paid_listing(
        &self,
        user_id: Uuid,
        period: Period,
        free_listings_limit: i32,
        now: DateTime<Utc>,
    ) -> QuotaResult<ListingQuota>;

    /// Most recent periods first.
    async fn quota_history(&self, user_id: Uuid, limit: i64) -> QuotaResult<Vec<ListingQuota>>;

    async fn period_totals(&self, period: Period) -> QuotaResult<PeriodTotals>;

    /// Deletes rows for periods strictly before `cutoff`; returns the number removed.
    async fn delete_quotas_before(&self, cutoff: Period) -> QuotaResult<u64>;
}
