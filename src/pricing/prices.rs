use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};
use uuid::Uuid;

use super::models::PricingConfig;
use crate::error::{QuotaError, QuotaResult};

/// Field name to new value, as submitted by an admin.
pub type PriceUpdate = BTreeMap<String, Value>;

/// key: pricing-price-fields -> admin-writable whitelist
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PriceField {
    StandardListingPrice,
    Currency,
    PaidSystemActive,
    PremiumBoostPrice,
    FeaturedColorPrice,
    Pack5ListingsPrice,
    Pack10ListingsPrice,
    Pack5Discount,
    Pack10Discount,
}

impl PriceField {
    pub const ALL: [PriceField; 9] = [
        PriceField::StandardListingPrice,
        PriceField::Currency,
        PriceField::PaidSystemActive,
        PriceField::PremiumBoostPrice,
        PriceField::FeaturedColorPrice,
        PriceField::Pack5ListingsPrice,
        PriceField::Pack10ListingsPrice,
        PriceField::Pack5Discount,
        PriceField::Pack10Discount,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PriceField::StandardListingPrice => "standard_listing_price",
            PriceField::Currency => "currency",
            PriceField::PaidSystemActive => "paid_system_active",
            PriceField::PremiumBoostPrice => "premium_boost_price",
            PriceField::FeaturedColorPrice => "featured_color_price",
            PriceField::Pack5ListingsPrice => "pack_5_listings_price",
            PriceField::Pack10ListingsPrice => "pack_10_listings_price",
            PriceField::Pack5Discount => "pack_5_discount",
            PriceField::Pack10Discount => "pack_10_discount",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|field| field.as_str() == value)
    }
}

enum PriceValue {
    Amount(i64),
    Percent(i32),
    Currency(String),
    Flag(bool),
}

fn parse_value(field: PriceField, raw: &Value) -> QuotaResult<PriceValue> {
    let invalid = |reason: &str| QuotaError::InvalidPriceValue {
        field: field.as_str().to_string(),
        reason: reason.to_string(),
    };

    match field {
        PriceField::Currency => {
            let code = raw
                .as_str()
                .map(str::trim)
                .ok_or_else(|| invalid("expected a currency code string"))?;
            if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
                return Err(invalid("expected a three-letter currency code"));
            }
            Ok(PriceValue::Currency(code.to_ascii_uppercase()))
        }
        PriceField::PaidSystemActive => raw
            .as_bool()
            .map(PriceValue::Flag)
            .ok_or_else(|| invalid("expected a boolean")),
        PriceField::Pack5Discount | PriceField::Pack10Discount => {
            let percent = raw
                .as_i64()
                .ok_or_else(|| invalid("expected an integer percentage"))?;
            if !(0..=100).contains(&percent) {
                return Err(invalid("discount must be between 0 and 100"));
            }
            Ok(PriceValue::Percent(percent as i32))
        }
        _ => {
            let amount = raw
                .as_i64()
                .ok_or_else(|| invalid("expected an integer amount in minor units"))?;
            if amount < 0 {
                return Err(invalid("amount must not be negative"));
            }
            Ok(PriceValue::Amount(amount))
        }
    }
}

impl PricingConfig {
    fn field_value(&self, field: PriceField) -> Value {
        match field {
            PriceField::StandardListingPrice => json!(self.standard_listing_price),
            PriceField::Currency => json!(self.currency),
            PriceField::PaidSystemActive => json!(self.paid_system_active),
            PriceField::PremiumBoostPrice => json!(self.premium_boost_price),
            PriceField::FeaturedColorPrice => json!(self.featured_color_price),
            PriceField::Pack5ListingsPrice => json!(self.pack_5_listings_price),
            PriceField::Pack10ListingsPrice => json!(self.pack_10_listings_price),
            PriceField::Pack5Discount => json!(self.pack_5_discount),
            PriceField::Pack10Discount => json!(self.pack_10_discount),
        }
    }

    fn set_field(&mut self, field: PriceField, value: PriceValue) {
        match (field, value) {
            (PriceField::Currency, PriceValue::Currency(code)) => self.currency = code,
            (PriceField::PaidSystemActive, PriceValue::Flag(flag)) => {
                self.paid_system_active = flag
            }
            (PriceField::Pack5Discount, PriceValue::Percent(p)) => self.pack_5_discount = p,
            (PriceField::Pack10Discount, PriceValue::Percent(p)) => self.pack_10_discount = p,
            (PriceField::StandardListingPrice, PriceValue::Amount(a)) => {
                self.standard_listing_price = a
            }
            (PriceField::PremiumBoostPrice, PriceValue::Amount(a)) => self.premium_boost_price = a,
            (PriceField::FeaturedColorPrice, PriceValue::Amount(a)) => {
                self.featured_color_price = a
            }
            (PriceField::Pack5ListingsPrice, PriceValue::Amount(a)) => {
                self.pack_5_listings_price = a
            }
            (PriceField::Pack10ListingsPrice, PriceValue::Amount(a)) => {
                self.pack_10_listings_price = a
            }
            _ => unreachable!("parse_value returns the variant matching each field"),
        }
    }

    /// Validates every submitted field before touching any of them, then applies the batch.
    /// Returns a `{field: {from, to}}` payload for the audit trail.
    pub(crate) fn apply_price_update(
        &mut self,
        update: &PriceUpdate,
        admin_id: Uuid,
        now: DateTime<Utc>,
    ) -> QuotaResult<Value> {
        ensure_fields_supplied(update)?;
        let mut parsed = Vec::with_capacity(update.len());
        for (name, raw) in update {
            let field = PriceField::from_str(name)
                .ok_or_else(|| QuotaError::InvalidPriceField(name.clone()))?;
            parsed.push((field, parse_value(field, raw)?));
        }

        let mut changes = Map::new();
        for (field, value) in parsed {
            let from = self.field_value(field);
            self.set_field(field, value);
            changes.insert(
                field.as_str().to_string(),
                json!({ "from": from, "to": self.field_value(field) }),
            );
        }
        self.touch(admin_id, now);
        Ok(Value::Object(changes))
    }
}

/// A price update must name at least one field.
pub(crate) fn ensure_fields_supplied(update: &PriceUpdate) -> QuotaResult<()> {
    if update.is_empty() {
        return Err(QuotaError::InvalidPriceValue {
            field: "fields".to_string(),
            reason: "no fields supplied".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pricing::PricingDefaults;

    fn config() -> PricingConfig {
        PricingConfig::with_defaults(&PricingDefaults::default(), Utc::now())
    }

    #[test]
    fn applies_whitelisted_fields_and_records_admin() {
        let mut config = config();
        let admin = Uuid::new_v4();
        let update = PriceUpdate::from([
            ("standard_listing_price".to_string(), json!(500)),
            ("currency".to_string(), json!("eur")),
            ("pack_10_discount".to_string(), json!(45)),
        ]);

        let payload = config.apply_price_update(&update, admin, Utc::now()).unwrap();
        assert_eq!(config.standard_listing_price, 500);
        assert_eq!(config.currency, "EUR");
        assert_eq!(config.pack_10_discount, 45);
        assert_eq!(config.updated_by, Some(admin));
        assert_eq!(payload["currency"]["from"], json!("USD"));
        assert_eq!(payload["currency"]["to"], json!("EUR"));
    }

    #[test]
    fn unknown_field_rejects_whole_batch() {
        let mut config = config();
        let before = config.clone();
        let update = PriceUpdate::from([
            ("standard_listing_price".to_string(), json!(900)),
            ("tax_rate".to_string(), json!(19)),
        ]);

        let err = config
            .apply_price_update(&update, Uuid::new_v4(), Utc::now())
            .unwrap_err();
        assert!(matches!(err, QuotaError::InvalidPriceField(ref name) if name == "tax_rate"));
        assert_eq!(config, before);
    }

    #[test]
    fn read_only_fields_are_not_writable() {
        for name in ["current_phase", "launch_phase_end_date", "updated_by"] {
            assert!(PriceField::from_str(name).is_none(), "{name} must not be writable");
        }
    }

    #[test]
    fn rejects_out_of_range_values() {
        let mut config = config();
        for (name, value) in [
            ("premium_boost_price", json!(-1)),
            ("pack_5_discount", json!(101)),
            ("currency", json!("EURO")),
            ("paid_system_active", json!("yes")),
            ("featured_color_price", json!(2.5)),
        ] {
            let update = PriceUpdate::from([(name.to_string(), value)]);
            let err = config
                .apply_price_update(&update, Uuid::new_v4(), Utc::now())
                .unwrap_err();
            assert!(
                matches!(err, QuotaError::InvalidPriceValue { ref field, .. } if field == name),
                "expected invalid value for {name}"
            );
        }
    }

    #[test]
    fn empty_batch_is_rejected_without_touching_config() {
        let mut config = config();
        let before = config.clone();

        let err = config
            .apply_price_update(&PriceUpdate::new(), Uuid::new_v4(), Utc::now())
            .unwrap_err();
        assert!(matches!(
            err,
            QuotaError::InvalidPriceValue { ref field, .. } if field == "fields"
        ));
        assert_eq!(config, before);
    }
}
