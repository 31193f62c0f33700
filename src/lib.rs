pub mod api;
pub mod config;
pub mod directory;
pub mod engine;
pub mod error;
pub mod period;
pub mod pricing;
pub mod quota;
pub mod scheduler;
pub mod store;

pub use directory::{InMemoryDirectory, ListingCounts, PgPlatformDirectory, PlatformDirectory};
pub use engine::{EligibilityReport, PlatformStats, QuotaEngine, QuotaStatus};
pub use error::{QuotaError, QuotaResult};
pub use period::Period;
pub use pricing::{Phase, PriceField, PriceUpdate, PricingConfig};
pub use quota::ListingQuota;
pub use store::{InMemoryQuotaStore, PgQuotaStore, QuotaStore};
