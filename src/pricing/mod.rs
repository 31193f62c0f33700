//! Global monetization phase and price list.

pub mod events;
pub mod models;
pub mod prices;

pub use events::{PricingAuditEvent, PricingAuditEventType, PricingChange};
pub use models::{format_amount, Phase, PricingConfig, PricingDefaults};
pub use prices::{PriceField, PriceUpdate};
