use super::Value;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::cmp::Ordering;
use std::fmt;

/// Logical type of a schema field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Bool,
    Int,
    Float,
    Text,
    Decimal,
    Time,
    Json,
    /// Closed set of text variants.
    Enum(&'static [&'static str]),
}

impl FieldType {
    pub fn is_compatible(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) => true,
            (Self::Bool, Value::Bool(_)) => true,
            (Self::Int, Value::Int(_)) => true,
            (Self::Float, Value::Float(_)) => true,
            (Self::Float, Value::Int(_)) => true,
            (Self::Text, Value::Text(_)) => true,
            (Self::Decimal, Value::Decimal(_)) => true,
            (Self::Decimal, Value::Int(_)) => true,
            (Self::Time, Value::Time(_)) => true,
            (Self::Json, Value::Json(_)) => true,
            (Self::Enum(variants), Value::Text(s)) => variants.contains(&s.as_str()),
            _ => false,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool => write!(f, "BOOL"),
            Self::Int => write!(f, "INT"),
            Self::Float => write!(f, "FLOAT"),
            Self::Text => write!(f, "TEXT"),
            Self::Decimal => write!(f, "DECIMAL"),
            Self::Time => write!(f, "TIME"),
            Self::Json => write!(f, "JSON"),
            Self::Enum(variants) => write!(f, "ENUM({})", variants.join("|")),
        }
    }
}

/// Driver-native column value.
///
/// This is the shape values take on the wire between the persistence layer
/// and a storage driver. The field codec converts it to and from [`Value`].
#[derive(Debug, Clone)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Decimal(Decimal),
    Time(DateTime<Utc>),
}

impl SqlValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "NULL",
            Self::Bool(_) => "BOOL",
            Self::Int(_) => "INT",
            Self::Float(_) => "FLOAT",
            Self::Text(_) => "TEXT",
            Self::Bytes(_) => "BYTES",
            Self::Decimal(_) => "DECIMAL",
            Self::Time(_) => "TIME",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Orders two values of comparable shape. `None` for NULLs and
    /// incompatible shapes.
    pub fn compare(&self, other: &SqlValue) -> Option<Ordering> {
        match (self, other) {
            (Self::Bool(a), Self::Bool(b)) => Some(a.cmp(b)),
            (Self::Int(a), Self::Int(b)) => Some(a.cmp(b)),
            (Self::Float(a), Self::Float(b)) => a.partial_cmp(b),
            (Self::Int(a), Self::Float(b)) => (*a as f64).partial_cmp(b),
            (Self::Float(a), Self::Int(b)) => a.partial_cmp(&(*b as f64)),
            (Self::Text(a), Self::Text(b)) => Some(a.cmp(b)),
            (Self::Bytes(a), Self::Bytes(b)) => Some(a.cmp(b)),
            (Self::Decimal(a), Self::Decimal(b)) => Some(a.cmp(b)),
            (Self::Decimal(a), Self::Int(b)) => Some(a.cmp(&Decimal::from(*b))),
            (Self::Int(a), Self::Decimal(b)) => Some(Decimal::from(*a).cmp(b)),
            (Self::Time(a), Self::Time(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl PartialEq for SqlValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            _ => self.compare(other) == Some(Ordering::Equal),
        }
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Int(i) => write!(f, "{}", i),
            Self::Float(fl) => write!(f, "{}", fl),
            Self::Text(s) => write!(f, "'{}'", s),
            Self::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            Self::Decimal(d) => write!(f, "{}", d),
            Self::Time(t) => write!(f, "'{}'", t.to_rfc3339()),
        }
    }
}

/// A decoded storage row: column names plus values in the same order.
pub type Row = Vec<SqlValue>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enum_compatibility() {
        let kind = FieldType::Enum(&["flat_fee", "usage_based"]);
        assert!(kind.is_compatible(&Value::Text("flat_fee".into())));
        assert!(!kind.is_compatible(&Value::Text("tiered".into())));
        assert!(kind.is_compatible(&Value::Null));
    }

    #[test]
    fn test_sql_value_compare() {
        assert_eq!(SqlValue::Int(1).compare(&SqlValue::Int(2)), Some(Ordering::Less));
        assert_eq!(
            SqlValue::Decimal(Decimal::new(15, 1)).compare(&SqlValue::Int(1)),
            Some(Ordering::Greater)
        );
        assert_eq!(SqlValue::Null.compare(&SqlValue::Int(1)), None);
        assert_eq!(SqlValue::Null, SqlValue::Null);
        assert_ne!(SqlValue::Text("a".into()), SqlValue::Int(1));
    }
}
