use crate::codec;
use crate::core::{FieldType, OrmError, Result, SqlValue};
use crate::predicate::Predicate;
use crate::schema::EntitySchema;

/// Predicate resolved to columns with encoded operands.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(&'static str, SqlValue),
    Ne(&'static str, SqlValue),
    Gt(&'static str, SqlValue),
    Gte(&'static str, SqlValue),
    Lt(&'static str, SqlValue),
    Lte(&'static str, SqlValue),
    In(&'static str, Vec<SqlValue>),
    NotIn(&'static str, Vec<SqlValue>),
    IsNull(&'static str),
    NotNull(&'static str),
    Contains(&'static str, String),
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
}

impl Filter {
    /// Conjunction of the given filters, or `None` when there are none.
    pub fn all(filters: Vec<Filter>) -> Option<Filter> {
        let mut filters = filters;
        match filters.len() {
            0 => None,
            1 => filters.pop(),
            _ => Some(Filter::And(filters)),
        }
    }
}

pub fn compile_filter(schema: &EntitySchema, predicate: &Predicate) -> Result<Filter> {
    let operand = |name: &str, value| -> Result<(&'static str, SqlValue)> {
        let (column, ty) = resolve(schema, name)?;
        Ok((column, codec::encode(column, ty, value)?))
    };

    let filter = match predicate {
        Predicate::Eq(name, v) => {
            let (c, v) = operand(name, v)?;
            if v.is_null() { Filter::IsNull(c) } else { Filter::Eq(c, v) }
        }
        Predicate::Ne(name, v) => {
            let (c, v) = operand(name, v)?;
            if v.is_null() { Filter::NotNull(c) } else { Filter::Ne(c, v) }
        }
        Predicate::Gt(name, v) => {
            let (c, v) = operand(name, v)?;
            Filter::Gt(c, v)
        }
        Predicate::Gte(name, v) => {
            let (c, v) = operand(name, v)?;
            Filter::Gte(c, v)
        }
        Predicate::Lt(name, v) => {
            let (c, v) = operand(name, v)?;
            Filter::Lt(c, v)
        }
        Predicate::Lte(name, v) => {
            let (c, v) = operand(name, v)?;
            Filter::Lte(c, v)
        }
        Predicate::In(name, values) | Predicate::NotIn(name, values) => {
            let (column, ty) = resolve(schema, name)?;
            let encoded = values
                .iter()
                .map(|v| codec::encode(column, ty, v))
                .collect::<Result<Vec<_>>>()?;
            if matches!(predicate, Predicate::In(..)) {
                Filter::In(column, encoded)
            } else {
                Filter::NotIn(column, encoded)
            }
        }
        Predicate::IsNull(name) => Filter::IsNull(resolve(schema, name)?.0),
        Predicate::NotNull(name) => Filter::NotNull(resolve(schema, name)?.0),
        Predicate::Contains(name, needle) => {
            let (column, ty) = resolve(schema, name)?;
            if !matches!(ty, FieldType::Text | FieldType::Enum(_)) {
                return Err(OrmError::validation(
                    schema.name,
                    name,
                    format!("contains needs a text column, {} is {}", column, ty),
                ));
            }
            Filter::Contains(column, needle.clone())
        }
        Predicate::And(items) => Filter::And(compile_all(schema, items)?),
        Predicate::Or(items) => Filter::Or(compile_all(schema, items)?),
        Predicate::Not(inner) => Filter::Not(Box::new(compile_filter(schema, inner)?)),
    };

    Ok(filter)
}

fn compile_all(schema: &EntitySchema, items: &[Predicate]) -> Result<Vec<Filter>> {
    items.iter().map(|p| compile_filter(schema, p)).collect()
}

fn resolve(schema: &EntitySchema, name: &str) -> Result<(&'static str, FieldType)> {
    schema
        .resolve_column(name)
        .ok_or_else(|| OrmError::UnknownField(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Value;
    use crate::predicate::{self, Predicate};
    use crate::schema::{FieldDescriptor, IdDescriptor};

    static INVOICE: EntitySchema = EntitySchema {
        name: "Invoice",
        table: "invoices",
        id: IdDescriptor::serial(),
        fields: &[
            FieldDescriptor::new("number", FieldType::Text).column("invoice_number"),
            FieldDescriptor::new("total", FieldType::Decimal),
        ],
        edges: &[],
        unique_together: &[],
        soft_delete: None,
    };

    #[test]
    fn test_compile_resolves_columns() {
        let filter = compile_filter(
            &INVOICE,
            &predicate::and([predicate::eq("number", "INV-1"), predicate::gt("total", 10)]),
        )
        .unwrap();

        assert_eq!(
            filter,
            Filter::And(vec![
                Filter::Eq("invoice_number", SqlValue::Text("INV-1".into())),
                Filter::Gt("total", SqlValue::Decimal(10.into())),
            ])
        );
    }

    #[test]
    fn test_eq_null_becomes_is_null() {
        let filter =
            compile_filter(&INVOICE, &Predicate::Eq("number".into(), Value::Null)).unwrap();
        assert_eq!(filter, Filter::IsNull("invoice_number"));
    }

    #[test]
    fn test_unknown_and_mistyped_operands() {
        assert!(matches!(
            compile_filter(&INVOICE, &predicate::eq("missing", 1)),
            Err(OrmError::UnknownField(_))
        ));
        assert!(compile_filter(&INVOICE, &predicate::eq("number", 1)).is_err());
        assert!(compile_filter(&INVOICE, &predicate::contains("total", "1")).is_err());
    }
}
