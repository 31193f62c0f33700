use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::future::try_join4;
use serde_json::json;
use tracing::{debug, error, info};
use uuid::Uuid;

use super::reports::{
    AddonPricing, EligibilityReport, MeteredStatus, PaymentTerms, PlatformStats, QuotaStatus,
    UnlimitedStatus,
};
use crate::config::QuotaSettings;
use crate::directory::PlatformDirectory;
use crate::error::{QuotaError, QuotaResult};
use crate::period::Period;
use crate::pricing::{
    format_amount, Phase, PriceUpdate, PricingAuditEvent, PricingAuditEventType, PricingChange,
    PricingConfig,
};
use crate::pricing::prices::ensure_fields_supplied;
use crate::quota::ListingQuota;
use crate::store::QuotaStore;

pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// key: quota-engine -> free/paid gating orchestration
/// Entry point for the listing-creation and admin workflows. Cheap to clone.
#[derive(Clone)]
pub struct QuotaEngine {
    store: Arc<dyn QuotaStore>,
    directory: Arc<dyn PlatformDirectory>,
    settings: QuotaSettings,
    clock: Clock,
}

impl QuotaEngine {
    pub fn new(
        store: Arc<dyn QuotaStore>,
        directory: Arc<dyn PlatformDirectory>,
        settings: QuotaSettings,
    ) -> Self {
        Self {
            store,
            directory,
            settings,
            clock: Arc::new(Utc::now),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    fn defaults(&self, now: DateTime<Utc>) -> PricingConfig {
        PricingConfig::with_defaults(&self.settings.pricing_defaults, now)
    }

    pub fn current_period(&self) -> QuotaResult<Period> {
        Period::containing(self.now())
    }

    async fn ensure_user(&self, user_id: Uuid) -> QuotaResult<()> {
        if self.directory.user_exists(user_id).await? {
            Ok(())
        } else {
            Err(QuotaError::InvalidUser(user_id))
        }
    }

    /// Returns the pricing singleton, creating it with defaults on first access.
    pub async fn global_config(&self) -> QuotaResult<PricingConfig> {
        let defaults = self.defaults(self.now());
        self.store
            .get_or_create_config(&defaults)
            .await
            .map_err(|err| match err {
                QuotaError::Storage { operation, source } => {
                    error!(operation, %source, "pricing configuration could not be loaded");
                    QuotaError::ConfigMissing {
                        reason: format!("{operation}: {source}"),
                    }
                }
                other => other,
            })
    }

    pub async fn is_free_launch_active(&self) -> QuotaResult<bool> {
        let config = self.global_config().await?;
        Ok(config.is_free_launch_active(self.now()))
    }

    pub async fn current_phase(&self) -> QuotaResult<Phase> {
        Ok(self.global_config().await?.current_phase)
    }

    pub async fn days_until_launch_end(&self) -> QuotaResult<i64> {
        let config = self.global_config().await?;
        Ok(config.days_until_launch_end(self.now()))
    }

    /// Current-period quota for the user, created on first touch.
    pub async fn current_quota(&self, user_id: Uuid) -> QuotaResult<ListingQuota> {
        let now = self.now();
        let period = Period::containing(now)?;
        self.store
            .get_or_create_quota(user_id, period, self.settings.free_listings_per_month, now)
            .await
    }

    /// Advisory pre-check. During the launch phase answers `(true, None)` without touching quota
    /// rows. The authoritative check happens inside [`QuotaEngine::consume_free_listing`].
    pub async fn can_create_free_listing(
        &self,
        user_id: Uuid,
    ) -> QuotaResult<(bool, Option<ListingQuota>)> {
        if self.is_free_launch_active().await? {
            return Ok((true, None));
        }
        let quota = self.current_quota(user_id).await?;
        Ok((quota.can_create_free_listing(), Some(quota)))
    }

    /// Consumes one free slot for the current period. No-op during the launch phase, returning
    /// `Ok(None)`; otherwise returns the updated row or [`QuotaError::QuotaExhausted`].
    pub async fn consume_free_listing(&self, user_id: Uuid) -> QuotaResult<Option<ListingQuota>> {
        if self.is_free_launch_active().await? {
            debug!(%user_id, "launch phase active; free listing not metered");
            return Ok(None);
        }
        let now = self.now();
        let period = Period::containing(now)?;
        match self
            .store
            .consume_free_listing(user_id, period, self.settings.free_listings_per_month, now)
            .await?
        {
            Some(quota) => {
                debug!(
                    %user_id,
                    period = %period,
                    used = quota.free_listings_used,
                    limit = quota.free_listings_limit,
                    "consumed free listing"
                );
                Ok(Some(quota))
            }
            None => {
                info!(%user_id, period = %period, "free listing quota exhausted");
                Err(QuotaError::QuotaExhausted)
            }
        }
    }

    /// Records a paid listing in every phase, including the launch phase.
    pub async fn add_paid_listing(&self, user_id: Uuid) -> QuotaResult<ListingQuota> {
        let now = self.now();
        let period = Period::containing(now)?;
        let quota = self
            .store
            .add_paid_listing(user_id, period, self.settings.free_listings_per_month, now)
            .await?;
        debug!(%user_id, period = %period, paid = quota.paid_listings, "recorded paid listing");
        Ok(quota)
    }

    pub async fn check_listing_eligibility(&self, user_id: Uuid) -> QuotaResult<EligibilityReport> {
        self.ensure_user(user_id).await?;
        let now = self.now();
        let config = self.global_config().await?;
        let addons = AddonPricing::from_config(&config);

        if config.is_free_launch_active(now) {
            return Ok(EligibilityReport {
                can_create_free: true,
                phase: config.current_phase,
                free_launch_active: true,
                standard_listing_price: config.standard_listing_price,
                currency: config.currency.clone(),
                remaining_free_listings: None,
                payment: None,
                addons,
                message: config.phase_message(None, now),
            });
        }

        let quota = self.current_quota(user_id).await?;
        let can_create_free = quota.can_create_free_listing();
        let remaining = quota.remaining_free_listings();
        let payment = if can_create_free {
            None
        } else {
            Some(PaymentTerms {
                price: config.standard_listing_price,
                currency: config.currency.clone(),
                next_reset_date: quota.next_reset_date()?,
                days_until_reset: quota.days_until_reset(now)?,
            })
        };

        Ok(EligibilityReport {
            can_create_free,
            phase: config.current_phase,
            free_launch_active: false,
            standard_listing_price: config.standard_listing_price,
            currency: config.currency.clone(),
            remaining_free_listings: Some(remaining),
            payment,
            addons,
            message: config.phase_message(Some(remaining), now),
        })
    }

    pub async fn user_quota_status(&self, user_id: Uuid) -> QuotaResult<QuotaStatus> {
        self.ensure_user(user_id).await?;
        let now = self.now();
        let config = self.global_config().await?;

        if config.is_free_launch_active(now) {
            return Ok(QuotaStatus::Unlimited(UnlimitedStatus {
                phase: config.current_phase,
                launch_phase_end_date: config.launch_phase_end_date,
                days_until_launch_end: config.days_until_launch_end(now),
                message: config.phase_message(None, now),
            }));
        }

        let quota = self.current_quota(user_id).await?;
        let message = match config.current_phase {
            Phase::PaidSystem => format!(
                "{} per listing",
                format_amount(config.standard_listing_price, &config.currency)
            ),
            _ => format!("{} free listings per month", quota.free_listings_limit),
        };

        Ok(QuotaStatus::Metered(MeteredStatus {
            phase: config.current_phase,
            period: quota.period_string(),
            free_listings_limit: quota.free_listings_limit,
            free_listings_used: quota.free_listings_used,
            remaining_free_listings: quota.remaining_free_listings(),
            paid_listings: quota.paid_listings,
            progress: quota.progress(),
            next_reset_date: quota.next_reset_date()?,
            days_until_reset: quota.days_until_reset(now)?,
            message,
        }))
    }

    pub async fn platform_stats(&self) -> QuotaResult<PlatformStats> {
        let now = self.now();
        let period = Period::containing(now)?;
        let (config, totals, total_users, listings) = try_join4(
            self.global_config(),
            self.store.period_totals(period),
            self.directory.count_users(),
            self.directory.listing_counts(period.start()),
        )
        .await?;

        let estimated_revenue = if config.is_free_launch_active(now) {
            0
        } else {
            totals
                .paid_listings
                .saturating_mul(config.standard_listing_price)
        };

        Ok(PlatformStats {
            phase: config.current_phase,
            period: period.to_string(),
            total_users,
            total_listings: listings.total,
            active_listings: listings.active,
            listings_this_period: listings.created_since,
            free_listings_this_period: totals.free_listings,
            paid_listings_this_period: totals.paid_listings,
            active_users_this_period: totals.active_users,
            estimated_revenue,
            currency: config.currency,
        })
    }

    /// Most recent periods first; a non-positive `periods` falls back to the default horizon.
    pub async fn user_quota_history(
        &self,
        user_id: Uuid,
        periods: i64,
    ) -> QuotaResult<Vec<ListingQuota>> {
        self.ensure_user(user_id).await?;
        let limit = if periods > 0 {
            periods
        } else {
            self.settings.default_history_periods
        };
        self.store.quota_history(user_id, limit).await
    }

    pub async fn transition_global_to_next_phase(
        &self,
        admin_id: Uuid,
    ) -> QuotaResult<PricingConfig> {
        self.ensure_user(admin_id).await?;
        let now = self.now();
        let config = self
            .store
            .mutate_config(
                &self.defaults(now),
                admin_id,
                now,
                Box::new(move |config: &mut PricingConfig| -> QuotaResult<PricingChange> {
                    let (from, to) = config.advance_phase(admin_id, now)?;
                    Ok(PricingChange {
                        event_type: PricingAuditEventType::PhaseTransitioned,
                        payload: json!({
                            "from": from,
                            "to": to,
                            "paid_system_active": config.paid_system_active,
                        }),
                    })
                }),
            )
            .await?;
        info!(%admin_id, phase = %config.current_phase, "advanced global pricing phase");
        Ok(config)
    }

    pub async fn extend_launch_phase(
        &self,
        new_end: DateTime<Utc>,
        admin_id: Uuid,
    ) -> QuotaResult<PricingConfig> {
        self.ensure_user(admin_id).await?;
        let now = self.now();
        let config = self
            .store
            .mutate_config(
                &self.defaults(now),
                admin_id,
                now,
                Box::new(move |config: &mut PricingConfig| -> QuotaResult<PricingChange> {
                    let previous = config.extend_launch(new_end, admin_id, now)?;
                    Ok(PricingChange {
                        event_type: PricingAuditEventType::LaunchExtended,
                        payload: json!({ "from": previous, "to": new_end }),
                    })
                }),
            )
            .await?;
        info!(%admin_id, launch_phase_end_date = %config.launch_phase_end_date, "extended launch phase");
        Ok(config)
    }

    pub async fn update_global_prices(
        &self,
        update: PriceUpdate,
        admin_id: Uuid,
    ) -> QuotaResult<PricingConfig> {
        self.ensure_user(admin_id).await?;
        ensure_fields_supplied(&update)?;
        let now = self.now();
        let fields: Vec<String> = update.keys().cloned().collect();
        let config = self
            .store
            .mutate_config(
                &self.defaults(now),
                admin_id,
                now,
                Box::new(move |config: &mut PricingConfig| -> QuotaResult<PricingChange> {
                    let changes = config.apply_price_update(&update, admin_id, now)?;
                    Ok(PricingChange {
                        event_type: PricingAuditEventType::PricesUpdated,
                        payload: changes,
                    })
                }),
            )
            .await?;
        info!(%admin_id, ?fields, "updated global prices");
        Ok(config)
    }

    pub async fn pricing_audit_log(&self, limit: i64) -> QuotaResult<Vec<PricingAuditEvent>> {
        self.store.pricing_audit_log(limit.clamp(1, 500)).await
    }

    /// Purges quota rows older than the retention horizon.
    pub async fn cleanup_old_quotas(&self) -> QuotaResult<u64> {
        let cutoff = self
            .current_period()?
            .months_back(self.settings.history_retention_months);
        let deleted = self.store.delete_quotas_before(cutoff).await?;
        info!(deleted, cutoff = %cutoff, "cleaned up old listing quotas");
        Ok(deleted)
    }
}
