//! Validated value objects stored as JSON columns.

use crate::core::{OrmError, Result, Value};
use crate::schema::ValueObject;
use anyhow::{Context as _, bail, ensure};
use lazy_static::lazy_static;
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

lazy_static! {
    static ref TAX_CODE_RE: Regex = Regex::new(r"^txcd_\d{8}$").unwrap();
}

/// Serializes a value object into a field value, validating it first.
pub fn to_value<T: ValueObject>(object: &T) -> Result<Value> {
    object
        .validate()
        .map_err(|e| OrmError::validation("value", "object", format!("{:#}", e)))?;
    serde_json::to_value(object)
        .map(Value::from)
        .map_err(|e| OrmError::type_mismatch("<json>", e.to_string()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaxBehavior {
    Inclusive,
    Exclusive,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub behavior: Option<TaxBehavior>,
    /// Provider tax code, e.g. `txcd_10000000`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl ValueObject for TaxConfig {
    fn validate(&self) -> anyhow::Result<()> {
        if let Some(code) = &self.code {
            ensure!(TAX_CODE_RE.is_match(code), "invalid tax code \"{}\"", code);
        }
        ensure!(
            self.behavior.is_some() || self.code.is_some(),
            "tax config must set a behavior or a code"
        );
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceTier {
    /// Inclusive upper bound of the tier; `None` on the last tier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub up_to: Option<Decimal>,
    pub unit_amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Price {
    Flat { amount: Decimal },
    Unit { amount: Decimal },
    Tiered { tiers: Vec<PriceTier> },
}

impl ValueObject for Price {
    fn validate(&self) -> anyhow::Result<()> {
        match self {
            Price::Flat { amount } | Price::Unit { amount } => {
                ensure!(!amount.is_sign_negative(), "amount must not be negative");
            }
            Price::Tiered { tiers } => {
                ensure!(!tiers.is_empty(), "tiered price needs at least one tier");
                let mut last: Option<Decimal> = None;
                for (i, tier) in tiers.iter().enumerate() {
                    ensure!(
                        !tier.unit_amount.is_sign_negative(),
                        "tier {} has a negative unit amount",
                        i
                    );
                    let is_last = i + 1 == tiers.len();
                    match tier.up_to {
                        None if !is_last => bail!("only the last tier may be open-ended"),
                        None => {}
                        Some(up_to) => {
                            if let Some(prev) = last {
                                ensure!(up_to > prev, "tier {} must end above {}", i, prev);
                            }
                            last = Some(up_to);
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

impl Price {
    /// Parses a price from its JSON field form.
    pub fn parse(value: &Value) -> Result<Option<Self>> {
        let Some(price) = value.object::<Price>()? else {
            return Ok(None);
        };
        price
            .validate()
            .context("stored price is invalid")
            .map_err(|e| OrmError::type_mismatch("price", format!("{:#}", e)))?;
        Ok(Some(price))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tax_config_validation() {
        let ok = TaxConfig {
            behavior: Some(TaxBehavior::Exclusive),
            code: Some("txcd_10000000".into()),
        };
        assert!(ok.validate().is_ok());

        let bad = TaxConfig {
            behavior: None,
            code: Some("10000000".into()),
        };
        assert!(bad.validate().unwrap_err().to_string().contains("invalid tax code"));

        let empty = TaxConfig {
            behavior: None,
            code: None,
        };
        assert!(empty.validate().is_err());
    }

    #[test]
    fn test_tiered_price_validation() {
        let price: Price = serde_json::from_value(json!({
            "type": "tiered",
            "tiers": [
                {"up_to": "100", "unit_amount": "0.10"},
                {"unit_amount": "0.05"}
            ]
        }))
        .unwrap();
        assert!(price.validate().is_ok());

        let unordered = Price::Tiered {
            tiers: vec![
                PriceTier {
                    up_to: Some(Decimal::new(100, 0)),
                    unit_amount: Decimal::ONE,
                },
                PriceTier {
                    up_to: Some(Decimal::new(50, 0)),
                    unit_amount: Decimal::ONE,
                },
            ],
        };
        assert!(unordered.validate().is_err());
    }

    #[test]
    fn test_to_value_rejects_invalid_object() {
        let err = to_value(&Price::Flat {
            amount: Decimal::new(-1, 0),
        })
        .unwrap_err();
        assert!(err.is_validation());

        let value = to_value(&Price::Flat {
            amount: Decimal::new(1999, 2),
        })
        .unwrap();
        assert_eq!(Price::parse(&value).unwrap(), Some(Price::Flat { amount: Decimal::new(1999, 2) }));
    }
}
