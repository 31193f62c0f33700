use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::pricing::{Phase, PricingConfig};

/// key: engine-addon-pricing -> paid-system price menu
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AddonPricing {
    pub currency: String,
    pub premium_boost_price: i64,
    pub featured_color_price: i64,
    pub pack_5_listings_price: i64,
    pub pack_5_discount: i32,
    pub pack_10_listings_price: i64,
    pub pack_10_discount: i32,
}

impl AddonPricing {
    /// Menu is only offered once the paid system is switched on.
    pub fn from_config(config: &PricingConfig) -> Option<Self> {
        if !config.paid_system_active {
            return None;
        }
        Some(Self {
            currency: config.currency.clone(),
            premium_boost_price: config.premium_boost_price,
            featured_color_price: config.featured_color_price,
            pack_5_listings_price: config.pack_5_listings_price,
            pack_5_discount: config.pack_5_discount,
            pack_10_listings_price: config.pack_10_listings_price,
            pack_10_discount: config.pack_10_discount,
        })
    }
}

/// When the user has to pay, when the free allotment comes back.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentTerms {
    pub price: i64,
    pub currency: String,
    pub next_reset_date: DateTime<Utc>,
    pub days_until_reset: i64,
}

/// key: engine-eligibility-report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EligibilityReport {
    pub can_create_free: bool,
    pub phase: Phase,
    pub free_launch_active: bool,
    pub standard_listing_price: i64,
    pub currency: String,
    /// `None` while free publishing is unlimited.
    pub remaining_free_listings: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment: Option<PaymentTerms>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub addons: Option<AddonPricing>,
    pub message: String,
}

impl EligibilityReport {
    pub fn requires_payment(&self) -> bool {
        self.payment.is_some()
    }
}

/// key: engine-quota-status -> per-phase user status
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum QuotaStatus {
    Unlimited(UnlimitedStatus),
    Metered(MeteredStatus),
}

impl QuotaStatus {
    pub fn phase(&self) -> Phase {
        match self {
            QuotaStatus::Unlimited(status) => status.phase,
            QuotaStatus::Metered(status) => status.phase,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnlimitedStatus {
    pub phase: Phase,
    pub launch_phase_end_date: DateTime<Utc>,
    pub days_until_launch_end: i64,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeteredStatus {
    pub phase: Phase,
    pub period: String,
    pub free_listings_limit: i32,
    pub free_listings_used: i32,
    pub remaining_free_listings: i32,
    pub paid_listings: i32,
    pub progress: f64,
    pub next_reset_date: DateTime<Utc>,
    pub days_until_reset: i64,
    pub message: String,
}

/// key: engine-platform-stats
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlatformStats {
    pub phase: Phase,
    pub period: String,
    pub total_users: i64,
    pub total_listings: i64,
    pub active_listings: i64,
    pub listings_this_period: i64,
    pub free_listings_this_period: i64,
    pub paid_listings_this_period: i64,
    pub active_users_this_period: i64,
    /// Zero while the launch phase is active, even if paid listings were recorded.
    pub estimated_revenue: i64,
    pub currency: String,
}
