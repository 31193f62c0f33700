use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::{ConfigMutation, PeriodTotals, QuotaStore};
use crate::error::{QuotaError, QuotaResult};
use crate::period::Period;
use crate::pricing::events::PricingAuditRow;
use crate::pricing::models::PricingConfigRow;
use crate::pricing::{PricingAuditEvent, PricingConfig};
use crate::quota::ListingQuota;

const PRICING_CONFIG_ID: i16 = 1;

/// key: quota-store-postgres
#[derive(Clone)]
pub struct PgQuotaStore {
    pool: PgPool,
}

impl PgQuotaStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

async fn insert_default_config(
    tx: &mut Transaction<'_, Postgres>,
    defaults: &PricingConfig,
) -> QuotaResult<()> {
    sqlx::query(
        r#"
        INSERT INTO pricing_config (
            id,
            current_phase,
            launch_phase_end_date,
            standard_listing_price,
            currency,
            paid_system_active,
            premium_boost_price,
            featured_color_price,
            pack_5_listings_price,
            pack_10_listings_price,
            pack_5_discount,
            pack_10_discount,
            updated_by,
            created_at,
            updated_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
        ON CONFLICT (id) DO NOTHING
        "#,
    )
    .bind(PRICING_CONFIG_ID)
    .bind(defaults.current_phase.as_str())
    .bind(defaults.launch_phase_end_date)
    .bind(defaults.standard_listing_price)
    .bind(&defaults.currency)
    .bind(defaults.paid_system_active)
    .bind(defaults.premium_boost_price)
    .bind(defaults.featured_color_price)
    .bind(defaults.pack_5_listings_price)
    .bind(defaults.pack_10_listings_price)
    .bind(defaults.pack_5_discount)
    .bind(defaults.pack_10_discount)
    .bind(defaults.updated_by)
    .bind(defaults.created_at)
    .bind(defaults.updated_at)
    .execute(&mut **tx)
    .await
    .map_err(QuotaError::storage("insert_default_pricing_config"))?;
    Ok(())
}

async fn insert_quota_if_missing(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
    period: Period,
    free_listings_limit: i32,
    now: DateTime<Utc>,
) -> QuotaResult<()> {
    sqlx::query(
        r#"
        INSERT INTO listing_quotas (id, user_id, month, year, free_listings_limit, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $6)
        ON CONFLICT (user_id, month, year) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(period.month() as i32)
    .bind(period.year())
    .bind(free_listings_limit.max(0))
    .bind(now)
    .execute(&mut **tx)
    .await
    .map_err(QuotaError::storage("insert_listing_quota"))?;
    Ok(())
}

#[async_trait]
impl QuotaStore for PgQuotaStore {
    async fn get_or_create_config(&self, defaults: &PricingConfig) -> QuotaResult<PricingConfig> {
        let existing =
            sqlx::query_as::<_, PricingConfigRow>("SELECT * FROM pricing_config WHERE id = $1")
                .bind(PRICING_CONFIG_ID)
                .fetch_optional(&self.pool)
                .await
                .map_err(QuotaError::storage("get_or_create_config"))?;
        if let Some(row) = existing {
            return PricingConfig::try_from(row);
        }

        // First access: racing creators settle on a single row through the conflict clause.
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(QuotaError::storage("get_or_create_config"))?;
        insert_default_config(&mut tx, defaults).await?;
        let row = sqlx::query_as::<_, PricingConfigRow>("SELECT * FROM pricing_config WHERE id = $1")
            .bind(PRICING_CONFIG_ID)
            .fetch_optional(&mut *tx)
            .await
            .map_err(QuotaError::storage("get_or_create_config"))?;
        tx.commit()
            .await
            .map_err(QuotaError::storage("get_or_create_config"))?;

        let row = row.ok_or_else(|| QuotaError::ConfigMissing {
            reason: "pricing_config row absent after insert".to_string(),
        })?;
        PricingConfig::try_from(row)
    }

    async fn mutate_config(
        &self,
        defaults: &PricingConfig,
        admin_id: Uuid,
        now: DateTime<Utc>,
        mutation: ConfigMutation,
    ) -> QuotaResult<PricingConfig> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(QuotaError::storage("mutate_config"))?;
        insert_default_config(&mut tx, defaults).await?;

        let row = sqlx::query_as::<_, PricingConfigRow>(
            "SELECT * FROM pricing_config WHERE id = $1 FOR UPDATE",
        )
        .bind(PRICING_CONFIG_ID)
        .fetch_optional(&mut *tx)
        .await
        .map_err(QuotaError::storage("lock_pricing_config"))?
        .ok_or_else(|| QuotaError::ConfigMissing {
            reason: "pricing_config row absent after insert".to_string(),
        })?;

        let mut config = PricingConfig::try_from(row)?;
        // Dropping the transaction on error rolls back and releases the row lock.
        let change = mutation(&mut config)?;

        sqlx::query(
            r#"
            UPDATE pricing_config SET
                current_phase = $2,
                launch_phase_end_date = $3,
                standard_listing_price = $4,
                currency = $5,
                paid_system_active = $6,
                premium_boost_price = $7,
                featured_color_price = $8,
                pack_5_listings_price = $9,
                pack_10_listings_price = $10,
                pack_5_discount = $11,
                pack_10_discount = $12,
                updated_by = $13,
                updated_at = $14
            WHERE id = $1
            "#,
        )
        .bind(PRICING_CONFIG_ID)
        .bind(config.current_phase.as_str())
        .bind(config.launch_phase_end_date)
        .bind(config.standard_listing_price)
        .bind(&config.currency)
        .bind(config.paid_system_active)
        .bind(config.premium_boost_price)
        .bind(config.featured_color_price)
        .bind(config.pack_5_listings_price)
        .bind(config.pack_10_listings_price)
        .bind(config.pack_5_discount)
        .bind(config.pack_10_discount)
        .bind(config.updated_by)
        .bind(config.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(QuotaError::storage("update_pricing_config"))?;

        let event = PricingAuditEvent::from_change(change, admin_id, now);
        sqlx::query(
            "INSERT INTO pricing_config_audit(id, event_type, admin_id, payload, occurred_at) VALUES($1,$2,$3,$4,$5)",
        )
        .bind(event.id)
        .bind(event.event_type.as_str())
        .bind(event.admin_id)
        .bind(&event.payload)
        .bind(event.occurred_at)
        .execute(&mut *tx)
        .await
        .map_err(QuotaError::storage("insert_pricing_audit"))?;

        tx.commit()
            .await
            .map_err(QuotaError::storage("mutate_config"))?;

        Ok(config)
    }

    async fn pricing_audit_log(&self, limit: i64) -> QuotaResult<Vec<PricingAuditEvent>> {
        let rows = sqlx::query_as::<_, PricingAuditRow>(
            r#"
            SELECT id, event_type, admin_id, payload, occurred_at
            FROM pricing_config_audit
            ORDER BY occurred_at DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(QuotaError::storage("pricing_audit_log"))?;

        rows.into_iter().map(PricingAuditEvent::try_from).collect()
    }

    async fn get_or_create_quota(
        &self,
        user_id: Uuid,
        period: Period,
        free_listings_limit: i32,
        now: DateTime<Utc>,
    ) -> QuotaResult<ListingQuota> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(QuotaError::storage("get_or_create_quota"))?;
        insert_quota_if_missing(&mut tx, user_id, period, free_listings_limit, now).await?;
        let quota = sqlx::query_as::<_, ListingQuota>(
            "SELECT * FROM listing_quotas WHERE user_id = $1 AND month = $2 AND year = $3",
        )
        .bind(user_id)
        .bind(period.month() as i32)
        .bind(period.year())
        .fetch_one(&mut *tx)
        .await
        .map_err(QuotaError::storage("get_or_create_quota"))?;
        tx.commit()
            .await
            .map_err(QuotaError::storage("get_or_create_quota"))?;
        Ok(quota)
    }

    async fn consume_free_listing(
        &self,
        user_id: Uuid,
        period: Period,
        free_listings_limit: i32,
        now: DateTime<Utc>,
    ) -> QuotaResult<Option<ListingQuota>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(QuotaError::storage("consume_free_listing"))?;
        insert_quota_if_missing(&mut tx, user_id, period, free_listings_limit, now).await?;
        // Concurrent writers block on the row lock and re-check the predicate after it is released.
        let updated = sqlx::query_as::<_, ListingQuota>(
            r#"
            UPDATE listing_quotas
            SET free_listings_used = free_listings_used + 1,
                updated_at = $4
            WHERE user_id = $1
              AND month = $2
              AND year = $3
              AND free_listings_used < free_listings_limit
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(period.month() as i32)
        .bind(period.year())
        .bind(now)
        .fetch_optional(&mut *tx)
        .await
        .map_err(QuotaError::storage("consume_free_listing"))?;
        tx.commit()
            .await
            .map_err(QuotaError::storage("consume_free_listing"))?;
        Ok(updated)
    }

    async fn add_paid_listing(
        &self,
        user_id: Uuid,
        period: Period,
        free_listings_limit: i32,
        now: DateTime<Utc>,
    ) -> QuotaResult<ListingQuota> {
        let quota = sqlx::query_as::<_, ListingQuota>(
            r#"
            INSERT INTO listing_quotas (
                id, user_id, month, year, free_listings_limit, paid_listings, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, 1, $6, $6)
            ON CONFLICT (user_id, month, year)
            DO UPDATE SET
                paid_listings = listing_quotas.paid_listings + 1,
                updated_at = EXCLUDED.updated_at
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(period.month() as i32)
        .bind(period.year())
        .bind(free_listings_limit.max(0))
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(QuotaError::storage("add_paid_listing"))?;
        Ok(quota)
    }

    async fn quota_history(&self, user_id: Uuid, limit: i64) -> QuotaResult<Vec<ListingQuota>> {
        sqlx::query_as::<_, ListingQuota>(
            r#"
            SELECT * FROM listing_quotas
            WHERE user_id = $1
            ORDER BY year DESC, month DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(QuotaError::storage("quota_history"))
    }

    async fn period_totals(&self, period: Period) -> QuotaResult<PeriodTotals> {
        let (free_listings, paid_listings, active_users): (i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COALESCE(SUM(free_listings_used), 0)::BIGINT,
                COALESCE(SUM(paid_listings), 0)::BIGINT,
                COUNT(*) FILTER (WHERE free_listings_used > 0 OR paid_listings > 0)
            FROM listing_quotas
            WHERE month = $1 AND year = $2
            "#,
        )
        .bind(period.month() as i32)
        .bind(period.year())
        .fetch_one(&self.pool)
        .await
        .map_err(QuotaError::storage("period_totals"))?;

        Ok(PeriodTotals {
            free_listings,
            paid_listings,
            active_users,
        })
    }

    async fn delete_quotas_before(&self, cutoff: Period) -> QuotaResult<u64> {
        let result = sqlx::query("DELETE FROM listing_quotas WHERE (year, month) < ($1, $2)")
            .bind(cutoff.year())
            .bind(cutoff.month() as i32)
            .execute(&self.pool)
            .await
            .map_err(QuotaError::storage("delete_quotas_before"))?;
        Ok(result.rows_affected())
    }
}
