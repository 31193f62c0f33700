//! Orchestration of the pricing phase and per-user quotas.

pub mod reports;
pub mod service;

pub use reports::{
    AddonPricing, EligibilityReport, MeteredStatus, PaymentTerms, PlatformStats, QuotaStatus,
    UnlimitedStatus,
};
pub use service::{Clock, QuotaEngine};
