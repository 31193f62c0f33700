use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::{QuotaError, QuotaResult};

/// key: pricing-phase -> monetization stage
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    LaunchFree,
    CreditSystem,
    PaidSystem,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::LaunchFree => "launch_free",
            Phase::CreditSystem => "credit_system",
            Phase::PaidSystem => "paid_system",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "launch_free" => Some(Phase::LaunchFree),
            "credit_system" => Some(Phase::CreditSystem),
            "paid_system" => Some(Phase::PaidSystem),
            _ => None,
        }
    }

    /// Following phase, or `None` once the final phase is reached.
    pub fn next(&self) -> Option<Phase> {
        match self {
            Phase::LaunchFree => Some(Phase::CreditSystem),
            Phase::CreditSystem => Some(Phase::PaidSystem),
            Phase::PaidSystem => None,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Values used when the singleton configuration is created lazily.
#[derive(Clone, Debug)]
pub struct PricingDefaults {
    pub launch_phase_days: i64,
    pub currency: String,
    pub standard_listing_price: i64,
    pub premium_boost_price: i64,
    pub featured_color_price: i64,
    pub pack_5_listings_price: i64,
    pub pack_10_listings_price: i64,
    pub pack_5_discount: i32,
    pub pack_10_discount: i32,
}

impl Default for PricingDefaults {
    fn default() -> Self {
        Self {
            launch_phase_days: 90,
            currency: "USD".to_string(),
            standard_listing_price: 500,
            premium_boost_price: 300,
            featured_color_price: 200,
            pack_5_listings_price: 2000,
            pack_10_listings_price: 3500,
            pack_5_discount: 20,
            pack_10_discount: 30,
        }
    }
}

/// key: pricing-config-model -> platform-wide singleton
/// Current monetization phase plus every price the listing workflow may quote.
/// Amounts are integer minor currency units; discounts are whole percentages.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PricingConfig {
    pub current_phase: Phase,
    pub launch_phase_end_date: DateTime<Utc>,
    pub standard_listing_price: i64,
    pub currency: String,
    pub paid_system_active: bool,
    pub premium_boost_price: i64,
    pub featured_color_price: i64,
    pub pack_5_listings_price: i64,
    pub pack_10_listings_price: i64,
    pub pack_5_discount: i32,
    pub pack_10_discount: i32,
    pub updated_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PricingConfig {
    pub fn with_defaults(defaults: &PricingDefaults, now: DateTime<Utc>) -> Self {
        Self {
            current_phase: Phase::LaunchFree,
            launch_phase_end_date: now + Duration::days(defaults.launch_phase_days),
            standard_listing_price: defaults.standard_listing_price,
            currency: defaults.currency.clone(),
            paid_system_active: false,
            premium_boost_price: defaults.premium_boost_price,
            featured_color_price: defaults.featured_color_price,
            pack_5_listings_price: defaults.pack_5_listings_price,
            pack_10_listings_price: defaults.pack_10_listings_price,
            pack_5_discount: defaults.pack_5_discount,
            pack_10_discount: defaults.pack_10_discount,
            updated_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_free_launch_active(&self, now: DateTime<Utc>) -> bool {
        self.current_phase == Phase::LaunchFree && now < self.launch_phase_end_date
    }

    /// Whole days (rounded up) until the launch phase closes; zero outside the launch phase.
    pub fn days_until_launch_end(&self, now: DateTime<Utc>) -> i64 {
        if self.current_phase != Phase::LaunchFree {
            return 0;
        }
        let seconds = (self.launch_phase_end_date - now).num_seconds();
        if seconds <= 0 {
            0
        } else {
            (seconds + 86_399) / 86_400
        }
    }

    /// User-facing phase message. `remaining == None` means unlimited (launch phase).
    pub fn phase_message(&self, remaining: Option<i32>, now: DateTime<Utc>) -> String {
        let Some(remaining) = remaining else {
            return format!(
                "Launch offer: unlimited free listings until {} ({} days left)",
                self.launch_phase_end_date.format("%Y-%m-%d"),
                self.days_until_launch_end(now)
            );
        };
        let price = format_amount(self.standard_listing_price, &self.currency);
        match (self.current_phase, remaining) {
            (Phase::PaidSystem, 0) | (Phase::CreditSystem, 0) => {
                format!("No free listings left this month; each listing costs {price}")
            }
            (Phase::PaidSystem, remaining) => format!(
                "{remaining} free listings left this month; additional listings cost {price}"
            ),
            (_, 0) => "No free listings left this month".to_string(),
            (_, remaining) => format!("{remaining} free listings left this month"),
        }
    }

    pub(crate) fn advance_phase(
        &mut self,
        admin_id: Uuid,
        now: DateTime<Utc>,
    ) -> QuotaResult<(Phase, Phase)> {
        let from = self.current_phase;
        let to = from.next().ok_or(QuotaError::InvalidTransition { from })?;
        self.current_phase = to;
        if to == Phase::PaidSystem {
            self.paid_system_active = true;
        }
        self.touch(admin_id, now);
        Ok((from, to))
    }

    pub(crate) fn extend_launch(
        &mut self,
        new_end: DateTime<Utc>,
        admin_id: Uuid,
        now: DateTime<Utc>,
    ) -> QuotaResult<DateTime<Utc>> {
        if self.current_phase != Phase::LaunchFree {
            return Err(QuotaError::LaunchPhaseClosed {
                phase: self.current_phase,
            });
        }
        if new_end <= now {
            return Err(QuotaError::InvalidLaunchEnd);
        }
        let previous = self.launch_phase_end_date;
        self.launch_phase_end_date = new_end;
        self.touch(admin_id, now);
        Ok(previous)
    }

    pub(crate) fn touch(&mut self, admin_id: Uuid, now: DateTime<Utc>) {
        self.updated_by = Some(admin_id);
        self.updated_at = now;
    }
}

/// Renders minor units as `12.34 USD`.
pub fn format_amount(minor_units: i64, currency: &str) -> String {
    let sign = if minor_units < 0 { "-" } else { "" };
    let abs = minor_units.unsigned_abs();
    format!("{sign}{}.{:02} {currency}", abs / 100, abs % 100)
}

#[derive(Debug, FromRow)]
pub(crate) struct PricingConfigRow {
    pub current_phase: String,
    pub launch_phase_end_date: DateTime<Utc>,
    pub standard_listing_price: i64,
    pub currency: String,
    pub paid_system_active: bool,
    pub premium_boost_price: i64,
    pub featured_color_price: i64,
    pub pack_5_listings_price: i64,
    pub pack_10_listings_price: i64,
    pub pack_5_discount: i32,
    pub pack_10_discount: i32,
    pub updated_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<PricingConfigRow> for PricingConfig {
    type Error = QuotaError;

    fn try_from(row: PricingConfigRow) -> Result<Self, Self::Error> {
        let current_phase =
            Phase::from_str(&row.current_phase).ok_or_else(|| QuotaError::ConfigMissing {
                reason: format!("unknown phase '{}' in pricing_config", row.current_phase),
            })?;
        Ok(PricingConfig {
            current_phase,
            launch_phase_end_date: row.launch_phase_end_date,
            standard_listing_price: row.standard_listing_price,
            currency: row.currency,
            paid_system_active: row.paid_system_active,
            premium_boost_price: row.premium_boost_price,
            featured_color_price: row.featured_color_price,
            pack_5_listings_price: row.pack_5_listings_price,
            pack_10_listings_price: row.pack_10_listings_price,
            pack_5_discount: row.pack_5_discount,
            pack_10_discount: row.pack_10_discount,
            updated_by: row.updated_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
