use std::fmt;

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{QuotaError, QuotaResult};

/// Earliest calendar year a quota period may refer to.
pub const FIRST_PERIOD_YEAR: i32 = 2025;

/// key: quota-period -> calendar month bucket
/// Calendar month used to scope free-listing consumption. Ordered by year, then month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Period {
    year: i32,
    month: u32,
}

impl Period {
    pub fn new(month: u32, year: i32) -> QuotaResult<Self> {
        if !(1..=12).contains(&month) || year < FIRST_PERIOD_YEAR {
            return Err(QuotaError::InvalidPeriod { month, year });
        }
        Ok(Self { year, month })
    }

    pub fn containing(now: DateTime<Utc>) -> QuotaResult<Self> {
        Self::new(now.month(), now.year())
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn is_before(&self, other: &Period) -> bool {
        self < other
    }

    pub fn next(&self) -> Period {
        if self.month == 12 {
            Period {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Period {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    /// Walks back `months` calendar months, saturating at the first supported period.
    pub fn months_back(&self, months: u32) -> Period {
        let index = self.year as i64 * 12 + (self.month as i64 - 1) - months as i64;
        let floor = FIRST_PERIOD_YEAR as i64 * 12;
        let index = index.max(floor);
        Period {
            year: (index / 12) as i32,
            month: (index % 12) as u32 + 1,
        }
    }

    /// Midnight UTC on the first day of this period.
    pub fn start(&self) -> DateTime<Utc> {
        let date = NaiveDate::from_ymd_opt(self.year, self.month, 1)
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .unwrap_or_default();
        Utc.from_utc_datetime(&date)
    }

    /// Midnight UTC on the first day of the following period.
    pub fn end(&self) -> DateTime<Utc> {
        self.next().start()
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}/{}", self.month, self.year)
    }
}
