use crate::core::Value;

/// Row filter expressed over field and edge names.
///
/// Names are resolved against the entity schema when a statement is built;
/// many-to-one edge names compare against their foreign key column.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Eq(String, Value),
    Ne(String, Value),
    Gt(String, Value),
    Gte(String, Value),
    Lt(String, Value),
    Lte(String, Value),
    In(String, Vec<Value>),
    NotIn(String, Vec<Value>),
    IsNull(String),
    NotNull(String),
    /// Substring match on a text column.
    Contains(String, String),
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
}

pub fn eq(field: &str, value: impl Into<Value>) -> Predicate {
    Predicate::Eq(field.to_string(), value.into())
}

pub fn ne(field: &str, value: impl Into<Value>) -> Predicate {
    Predicate::Ne(field.to_string(), value.into())
}

pub fn gt(field: &str, value: impl Into<Value>) -> Predicate {
    Predicate::Gt(field.to_string(), value.into())
}

pub fn gte(field: &str, value: impl Into<Value>) -> Predicate {
    Predicate::Gte(field.to_string(), value.into())
}

pub fn lt(field: &str, value: impl Into<Value>) -> Predicate {
    Predicate::Lt(field.to_string(), value.into())
}

pub fn lte(field: &str, value: impl Into<Value>) -> Predicate {
    Predicate::Lte(field.to_string(), value.into())
}

pub fn is_in<V: Into<Value>>(field: &str, values: impl IntoIterator<Item = V>) -> Predicate {
    Predicate::In(field.to_string(), values.into_iter().map(Into::into).collect())
}

pub fn not_in<V: Into<Value>>(field: &str, values: impl IntoIterator<Item = V>) -> Predicate {
    Predicate::NotIn(field.to_string(), values.into_iter().map(Into::into).collect())
}

pub fn is_null(field: &str) -> Predicate {
    Predicate::IsNull(field.to_string())
}

pub fn not_null(field: &str) -> Predicate {
    Predicate::NotNull(field.to_string())
}

pub fn contains(field: &str, needle: &str) -> Predicate {
    Predicate::Contains(field.to_string(), needle.to_string())
}

/// Rows whose many-to-one edge points at `id`.
pub fn has_edge_id(edge: &str, id: impl Into<Value>) -> Predicate {
    Predicate::Eq(edge.to_string(), id.into())
}

pub fn and(predicates: impl IntoIterator<Item = Predicate>) -> Predicate {
    Predicate::And(predicates.into_iter().collect())
}

pub fn or(predicates: impl IntoIterator<Item = Predicate>) -> Predicate {
    Predicate::Or(predicates.into_iter().collect())
}

pub fn not(predicate: Predicate) -> Predicate {
    Predicate::Not(Box::new(predicate))
}
