use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{ConfigMutation, PeriodTotals, QuotaStore};
use crate::error::{QuotaError, QuotaResult};
use crate::period::Period;
use crate::pricing::{PricingAuditEvent, PricingConfig};
use crate::quota::ListingQuota;

#[derive(Default)]
struct PricingState {
    config: Option<PricingConfig>,
    audit: Vec<PricingAuditEvent>,
}

/// key: quota-store-memory
/// Process-local store. Each operation holds the relevant lock for its whole read-modify-write,
/// which gives the same single-writer guarantees the Postgres store gets from row locks.
#[derive(Default)]
pub struct InMemoryQuotaStore {
    pricing: Mutex<PricingState>,
    quotas: Mutex<HashMap<(Uuid, Period), ListingQuota>>,
}

impl InMemoryQuotaStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn quota_count(&self) -> usize {
        self.quotas.lock().await.len()
    }

    pub async fn find_quota(&self, user_id: Uuid, period: Period) -> Option<ListingQuota> {
        self.quotas.lock().await.get(&(user_id, period)).cloned()
    }
}

#[async_trait]
impl QuotaStore for InMemoryQuotaStore {
    async fn get_or_create_config(&self, defaults: &PricingConfig) -> QuotaResult<PricingConfig> {
        let mut guard = self.pricing.lock().await;
        Ok(guard.config.get_or_insert_with(|| defaults.clone()).clone())
    }

    async fn mutate_config(
        &self,
        defaults: &PricingConfig,
        admin_id: Uuid,
        now: DateTime<Utc>,
        mutation: ConfigMutation,
    ) -> QuotaResult<PricingConfig> {
        let mut guard = self.pricing.lock().await;
        let mut config = guard
            .config
            .get_or_insert_with(|| defaults.clone())
            .clone();
        let change = mutation(&mut config)?;
        guard.config = Some(config.clone());
        guard
            .audit
            .push(PricingAuditEvent::from_change(change, admin_id, now));
        Ok(config)
    }

    async fn pricing_audit_log(&self, limit: i64) -> QuotaResult<Vec<PricingAuditEvent>> {
        let guard = self.pricing.lock().await;
        Ok(guard
            .audit
            .iter()
            .rev()
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn get_or_create_quota(
        &self,
        user_id: Uuid,
        period: Period,
        free_listings_limit: i32,
        now: DateTime<Utc>,
    ) -> QuotaResult<ListingQuota> {
        let mut guard = self.quotas.lock().await;
        Ok(guard
            .entry((user_id, period))
            .or_insert_with(|| ListingQuota::new(user_id, period, free_listings_limit, now))
            .clone())
    }

    async fn consume_free_listing(
        &self,
        user_id: Uuid,
        period: Period,
        free_listings_limit: i32,
        now: DateTime<Utc>,
    ) -> QuotaResult<Option<ListingQuota>> {
        let mut guard = self.quotas.lock().await;
        let quota = guard
            .entry((user_id, period))
            .or_insert_with(|| ListingQuota::new(user_id, period, free_listings_limit, now));
        match quota.consume_free_listing(now) {
            Ok(()) => Ok(Some(quota.clone())),
            Err(QuotaError::QuotaExhausted) => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn add_paid_listing(
        &self,
        user_id: Uuid,
        period: Period,
        free_listings_limit: i32,
        now: DateTime<Utc>,
    ) -> QuotaResult<ListingQuota> {
        let mut guard = self.quotas.lock().await;
        let quota = guard
            .entry((user_id, period))
            .or_insert_with(|| ListingQuota::new(user_id, period, free_listings_limit, now));
        quota.add_paid_listing(now);
        Ok(quota.clone())
    }

    async fn quota_history(&self, user_id: Uuid, limit: i64) -> QuotaResult<Vec<ListingQuota>> {
        let guard = self.quotas.lock().await;
        let mut rows: Vec<(Period, ListingQuota)> = guard
            .iter()
            .filter(|((owner, _), _)| *owner == user_id)
            .map(|((_, period), quota)| (*period, quota.clone()))
            .collect();
        rows.sort_by(|(a, _), (b, _)| b.cmp(a));
        Ok(rows
            .into_iter()
            .take(limit.max(0) as usize)
            .map(|(_, quota)| quota)
            .collect())
    }

    async fn period_totals(&self, period: Period) -> QuotaResult<PeriodTotals> {
        let guard = self.quotas.lock().await;
        let mut totals = PeriodTotals::default();
        for quota in guard
            .iter()
            .filter(|((_, row_period), _)| *row_period == period)
            .map(|(_, quota)| quota)
        {
            totals.free_listings += quota.free_listings_used as i64;
            totals.paid_listings += quota.paid_listings as i64;
            if quota.free_listings_used > 0 || quota.paid_listings > 0 {
                totals.active_users += 1;
            }
        }
        Ok(totals)
    }

    async fn delete_quotas_before(&self, cutoff: Period) -> QuotaResult<u64> {
        let mut guard = self.quotas.lock().await;
        let before = guard.len();
        guard.retain(|(_, period), _| !period.is_before(&cutoff));
        Ok((before - guard.len()) as u64)
    }
}
