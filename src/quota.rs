use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::{QuotaError, QuotaResult};
use crate::period::Period;

/// key: listing-quota-model -> per-user monthly allotment
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq)]
pub struct ListingQuota {
    pub id: Uuid,
    pub user_id: Uuid,
    pub month: i32,
    pub year: i32,
    pub free_listings_limit: i32,
    pub free_listings_used: i32,
    pub paid_listings: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ListingQuota {
    pub fn new(user_id: Uuid, period: Period, free_listings_limit: i32, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            month: period.month() as i32,
            year: period.year(),
            free_listings_limit: free_listings_limit.max(0),
            free_listings_used: 0,
            paid_listings: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn period(&self) -> QuotaResult<Period> {
        Period::new(self.month.max(0) as u32, self.year)
    }

    pub fn can_create_free_listing(&self) -> bool {
        self.free_listings_used < self.free_listings_limit
    }

    /// Conditional increment on an owned record; storage backends run the same check in SQL.
    pub fn consume_free_listing(&mut self, now: DateTime<Utc>) -> QuotaResult<()> {
        if !self.can_create_free_listing() {
            return Err(QuotaError::QuotaExhausted);
        }
        self.free_listings_used += 1;
        self.updated_at = now;
        Ok(())
    }

    pub fn add_paid_listing(&mut self, now: DateTime<Utc>) {
        self.paid_listings = self.paid_listings.saturating_add(1);
        self.updated_at = now;
    }

    pub fn remaining_free_listings(&self) -> i32 {
        (self.free_listings_limit - self.free_listings_used).max(0)
    }

    /// Used/limit ratio in `0.0..=1.0`; a zero limit counts as fully used.
    pub fn progress(&self) -> f64 {
        if self.free_listings_limit <= 0 {
            return 1.0;
        }
        (self.free_listings_used as f64 / self.free_listings_limit as f64).clamp(0.0, 1.0)
    }

    pub fn next_reset_date(&self) -> QuotaResult<DateTime<Utc>> {
        Ok(self.period()?.end())
    }

    pub fn days_until_reset(&self, now: DateTime<Utc>) -> QuotaResult<i64> {
        let seconds = (self.next_reset_date()? - now).num_seconds();
        Ok(if seconds <= 0 {
            0
        } else {
            (seconds + 86_399) / 86_400
        })
    }

    pub fn period_string(&self) -> String {
        format!("{:02}/{}", self.month, self.year)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn quota(limit: i32) -> ListingQuota {
        let now = Utc.with_ymd_and_hms(2026, 2, 10, 8, 0, 0).unwrap();
        ListingQuota::new(Uuid::new_v4(), Period::new(2, 2026).unwrap(), limit, now)
    }

    #[test]
    fn consumption_stops_at_limit() {
        let mut quota = quota(2);
        let now = Utc::now();
        quota.consume_free_listing(now).unwrap();
        quota.consume_free_listing(now).unwrap();
        assert!(matches!(
            quota.consume_free_listing(now),
            Err(QuotaError::QuotaExhausted)
        ));
        assert_eq!(quota.free_listings_used, 2);
        assert_eq!(quota.remaining_free_listings(), 0);
        assert_eq!(quota.progress(), 1.0);
    }

    #[test]
    fn paid_listings_are_unbounded() {
        let mut quota = quota(0);
        for _ in 0..5 {
            quota.add_paid_listing(Utc::now());
        }
        assert_eq!(quota.paid_listings, 5);
        assert!(!quota.can_create_free_listing());
    }

    #[test]
    fn reset_date_is_first_of_next_month() {
        let quota = quota(3);
        assert_eq!(
            quota.next_reset_date().unwrap(),
            Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap()
        );
        let now = Utc.with_ymd_and_hms(2026, 2, 27, 12, 0, 0).unwrap();
        assert_eq!(quota.days_until_reset(now).unwrap(), 2);
        assert_eq!(quota.period_string(), "02/2026");
    }

    #[test]
    fn progress_reports_partial_usage() {
        let mut quota = quota(4);
        quota.consume_free_listing(Utc::now()).unwrap();
        assert_eq!(quota.progress(), 0.25);
        assert_eq!(quota.remaining_free_listings(), 3);
    }
}
