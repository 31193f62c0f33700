use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::QuotaError;

/// key: pricing-audit-event
/// Durable record of an admin mutation to the global pricing configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PricingAuditEvent {
    pub id: Uuid,
    pub event_type: PricingAuditEventType,
    pub admin_id: Uuid,
    pub payload: Value,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PricingAuditEventType {
    PhaseTransitioned,
    LaunchExtended,
    PricesUpdated,
}

impl PricingAuditEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PricingAuditEventType::PhaseTransitioned => "phase_transitioned",
            PricingAuditEventType::LaunchExtended => "launch_extended",
            PricingAuditEventType::PricesUpdated => "prices_updated",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "phase_transitioned" => Some(Self::PhaseTransitioned),
            "launch_extended" => Some(Self::LaunchExtended),
            "prices_updated" => Some(Self::PricesUpdated),
            _ => None,
        }
    }
}

/// Audit detail produced by a configuration mutation; the store stamps id and admin on write.
#[derive(Clone, Debug)]
pub struct PricingChange {
    pub event_type: PricingAuditEventType,
    pub payload: Value,
}

impl PricingAuditEvent {
    pub fn from_change(change: PricingChange, admin_id: Uuid, occurred_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type: change.event_type,
            admin_id,
            payload: change.payload,
            occurred_at,
        }
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct PricingAuditRow {
    pub id: Uuid,
    pub event_type: String,
    pub admin_id: Uuid,
    pub payload: Value,
    pub occurred_at: DateTime<Utc>,
}

impl TryFrom<PricingAuditRow> for PricingAuditEvent {
    type Error = QuotaError;

    fn try_from(row: PricingAuditRow) -> Result<Self, Self::Error> {
        let event_type = PricingAuditEventType::from_str(&row.event_type).ok_or_else(|| {
            QuotaError::Storage {
                operation: "decode_pricing_audit",
                source: sqlx::Error::Decode(
                    format!("unknown pricing audit event type: {}", row.event_type).into(),
                ),
            }
        })?;
        Ok(PricingAuditEvent {
            id: row.id,
            event_type,
            admin_id: row.admin_id,
            payload: row.payload,
            occurred_at: row.occurred_at,
        })
    }
}
