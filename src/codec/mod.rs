// ============================================================================
// Field Codec
// ============================================================================
//
// Converts caller-facing `Value`s into driver-native `SqlValue`s and back.
//
// - JSON maps travel as UTF-8 bytes.
// - Decimals never pass through f64.
// - Timestamps keep microsecond resolution, always UTC.
// - NULL stays NULL in both directions.
//
// ============================================================================

use crate::core::{FieldType, OrmError, Result, SqlValue, Value};
use chrono::{DateTime, SubsecRound, Utc};
use rust_decimal::Decimal;
use std::str::FromStr;

/// Encodes a value for a column of the given type.
pub fn encode(column: &str, ty: FieldType, value: &Value) -> Result<SqlValue> {
    if value.is_null() {
        return Ok(SqlValue::Null);
    }

    let encoded = match (ty, value) {
        (FieldType::Bool, Value::Bool(b)) => SqlValue::Bool(*b),
        (FieldType::Int, Value::Int(i)) => SqlValue::Int(*i),
        (FieldType::Float, Value::Float(f)) => SqlValue::Float(*f),
        (FieldType::Float, Value::Int(i)) => SqlValue::Float(*i as f64),
        (FieldType::Text, Value::Text(s)) => SqlValue::Text(s.clone()),
        (FieldType::Decimal, Value::Decimal(d)) => SqlValue::Decimal(*d),
        (FieldType::Decimal, Value::Int(i)) => SqlValue::Decimal(Decimal::from(*i)),
        (FieldType::Time, Value::Time(t)) => SqlValue::Time(t.trunc_subsecs(6)),
        (FieldType::Json, Value::Json(json)) => {
            let bytes = serde_json::to_vec(json)
                .map_err(|e| OrmError::type_mismatch(column, e.to_string()))?;
            SqlValue::Bytes(bytes)
        }
        (FieldType::Enum(variants), Value::Text(s)) => {
            if !variants.contains(&s.as_str()) {
                return Err(OrmError::type_mismatch(
                    column,
                    format!("\"{}\" is not one of {}", s, variants.join(", ")),
                ));
            }
            SqlValue::Text(s.clone())
        }
        (ty, other) => {
            return Err(OrmError::type_mismatch(
                column,
                format!("cannot encode {} as {}", other.type_name(), ty),
            ));
        }
    };

    Ok(encoded)
}

/// Decodes a driver value scanned from `column`.
pub fn decode(column: &str, ty: FieldType, value: &SqlValue) -> Result<Value> {
    if value.is_null() {
        return Ok(Value::Null);
    }

    let mismatch = || {
        OrmError::type_mismatch(
            column,
            format!("cannot decode {} as {}", value.type_name(), ty),
        )
    };

    let decoded = match (ty, value) {
        (FieldType::Bool, SqlValue::Bool(b)) => Value::Bool(*b),
        (FieldType::Bool, SqlValue::Int(i)) if *i == 0 || *i == 1 => Value::Bool(*i == 1),
        (FieldType::Int, SqlValue::Int(i)) => Value::Int(*i),
        (FieldType::Float, SqlValue::Float(f)) => Value::Float(*f),
        (FieldType::Float, SqlValue::Int(i)) => Value::Float(*i as f64),
        (FieldType::Text, SqlValue::Text(s)) => Value::Text(s.clone()),
        (FieldType::Text, SqlValue::Bytes(b)) => {
            Value::Text(String::from_utf8(b.clone()).map_err(|_| mismatch())?)
        }
        (FieldType::Decimal, SqlValue::Decimal(d)) => Value::Decimal(*d),
        (FieldType::Decimal, SqlValue::Int(i)) => Value::Decimal(Decimal::from(*i)),
        (FieldType::Decimal, SqlValue::Text(s)) => {
            Value::Decimal(Decimal::from_str(s).map_err(|_| mismatch())?)
        }
        (FieldType::Time, SqlValue::Time(t)) => Value::Time(*t),
        (FieldType::Time, SqlValue::Text(s)) => {
            let parsed = DateTime::parse_from_rfc3339(s).map_err(|_| mismatch())?;
            Value::Time(parsed.with_timezone(&Utc))
        }
        (FieldType::Json, SqlValue::Bytes(b)) => decode_json(column, b)?,
        (FieldType::Json, SqlValue::Text(s)) => decode_json(column, s.as_bytes())?,
        (FieldType::Enum(variants), SqlValue::Text(s)) => {
            if !variants.contains(&s.as_str()) {
                return Err(OrmError::type_mismatch(
                    column,
                    format!("unexpected enum value \"{}\"", s),
                ));
            }
            Value::Text(s.clone())
        }
        _ => return Err(mismatch()),
    };

    Ok(decoded)
}

/// Decodes a value that has no schema type, such as an ad-hoc projection or
/// an aggregate. Bytes holding JSON become JSON, other bytes become text.
pub fn decode_untyped(value: &SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Bool(b) => Value::Bool(*b),
        SqlValue::Int(i) => Value::Int(*i),
        SqlValue::Float(f) => Value::Float(*f),
        SqlValue::Text(s) => Value::Text(s.clone()),
        SqlValue::Decimal(d) => Value::Decimal(*d),
        SqlValue::Time(t) => Value::Time(*t),
        SqlValue::Bytes(b) => match serde_json::from_slice::<serde_json::Value>(b) {
            Ok(json) => Value::from(json),
            Err(_) => Value::Text(String::from_utf8_lossy(b).into_owned()),
        },
    }
}

fn decode_json(column: &str, bytes: &[u8]) -> Result<Value> {
    let json: serde_json::Value = serde_json::from_slice(bytes)
        .map_err(|e| OrmError::type_mismatch(column, e.to_string()))?;
    Ok(Value::from(json))
}
