//! Reusable field validators and default generators.

use crate::core::Value;
use chrono::{SubsecRound, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use serde::de::DeserializeOwned;

lazy_static! {
    static ref NAMESPACE_RE: Regex = Regex::new(r"^[a-z0-9][a-z0-9_-]{0,63}$").unwrap();
    static ref KEY_RE: Regex = Regex::new(r"^[a-z0-9]+(?:_[a-z0-9]+)*$").unwrap();
}

/// A nested structured value stored as JSON that must validate itself
/// before it is written.
pub trait ValueObject: Serialize + DeserializeOwned {
    fn validate(&self) -> anyhow::Result<()>;
}

/// Tenant namespaces: lowercase alphanumerics, `_` and `-`, at most 64 chars.
pub fn namespace(value: &Value) -> Result<(), String> {
    match value {
        Value::Text(s) if NAMESPACE_RE.is_match(s) => Ok(()),
        Value::Text(s) => Err(format!("invalid namespace \"{}\"", s)),
        other => Err(format!("namespace must be text, got {}", other.type_name())),
    }
}

/// Lowercase snake_case keys.
pub fn key(value: &Value) -> Result<(), String> {
    match value {
        Value::Text(s) if KEY_RE.is_match(s) => Ok(()),
        Value::Text(s) => Err(format!("invalid key \"{}\"", s)),
        other => Err(format!("key must be text, got {}", other.type_name())),
    }
}

pub fn not_empty(value: &Value) -> Result<(), String> {
    match value {
        Value::Text(s) if s.trim().is_empty() => Err("value must not be empty".to_string()),
        _ => Ok(()),
    }
}

pub fn positive(value: &Value) -> Result<(), String> {
    match value {
        Value::Int(i) if *i <= 0 => Err(format!("value must be positive, got {}", i)),
        Value::Decimal(d) if d.is_sign_negative() || d.is_zero() => {
            Err(format!("value must be positive, got {}", d))
        }
        _ => Ok(()),
    }
}

/// Decodes the JSON value into `T` and runs its own validation.
pub fn object<T: ValueObject>(value: &Value) -> Result<(), String> {
    let Value::Json(json) = value else {
        return match value {
            Value::Null => Ok(()),
            other => Err(format!("expected JSON object, got {}", other.type_name())),
        };
    };
    let decoded: T = serde_json::from_value(json.clone()).map_err(|e| e.to_string())?;
    decoded.validate().map_err(|e| format!("{:#}", e))
}

/// Current time truncated to microseconds, the resolution the codec keeps.
pub fn now() -> Value {
    Value::Time(Utc::now().trunc_subsecs(6))
}

pub fn empty_object() -> Value {
    Value::Json(serde_json::Value::Object(serde_json::Map::new()))
}

pub fn zero_int() -> Value {
    Value::Int(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Serialize, Deserialize)]
    struct Limit {
        max: i64,
    }

    impl ValueObject for Limit {
        fn validate(&self) -> anyhow::Result<()> {
            if self.max < 1 {
                bail!("max must be at least 1");
            }
            Ok(())
        }
    }

    #[test]
    fn test_namespace_rule() {
        assert!(namespace(&Value::from("acme")).is_ok());
        assert!(namespace(&Value::from("acme-prod_1")).is_ok());
        assert!(namespace(&Value::from("Acme")).is_err());
        assert!(namespace(&Value::from("")).is_err());
        assert!(namespace(&Value::from("-acme")).is_err());
        assert!(namespace(&Value::Int(1)).is_err());
    }

    #[test]
    fn test_key_rule() {
        assert!(key(&Value::from("api_calls")).is_ok());
        assert!(key(&Value::from("api calls")).is_err());
    }

    #[test]
    fn test_object_validator_runs_nested_validation() {
        assert!(object::<Limit>(&Value::Json(json!({"max": 3}))).is_ok());
        let err = object::<Limit>(&Value::Json(json!({"max": 0}))).unwrap_err();
        assert!(err.contains("max must be at least 1"));
        assert!(object::<Limit>(&Value::Json(json!({"other": 1}))).is_err());
        assert!(object::<Limit>(&Value::Null).is_ok());
    }
}
