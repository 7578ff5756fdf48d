// ============================================================================
// Entity Model
// ============================================================================

use crate::codec;
use crate::core::{OrmError, Result, SqlValue, Value};
use crate::schema::EntitySchema;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::fmt;

/// One decoded row of an entity table.
///
/// Static fields and many-to-one edge keys are decoded through the field
/// codec. Columns the schema does not know about (projections, aggregates)
/// land in an overflow map readable with [`Record::get`].
#[derive(Clone)]
pub struct Record {
    schema: &'static EntitySchema,
    id: Value,
    fields: BTreeMap<&'static str, Value>,
    edges: BTreeMap<&'static str, Value>,
    selected: BTreeMap<String, Value>,
}

impl Record {
    /// Decodes a scanned row. `columns` names the values in `row`.
    pub(crate) fn decode(
        schema: &'static EntitySchema,
        columns: &[String],
        row: &[SqlValue],
    ) -> Result<Self> {
        if columns.len() != row.len() {
            return Err(OrmError::type_mismatch(
                schema.table,
                format!("expected {} values, got {}", columns.len(), row.len()),
            ));
        }

        let mut record = Self {
            schema,
            id: Value::Null,
            fields: BTreeMap::new(),
            edges: BTreeMap::new(),
            selected: BTreeMap::new(),
        };

        for (column, value) in columns.iter().zip(row) {
            record.absorb(column, value)?;
        }

        for field in schema.fields {
            record.fields.entry(field.name).or_insert(Value::Null);
        }
        for edge in schema.many_to_one_edges() {
            record.edges.entry(edge.name).or_insert(Value::Null);
        }

        Ok(record)
    }

    fn absorb(&mut self, column: &str, value: &SqlValue) -> Result<()> {
        let schema = self.schema;
        if column == schema.id.column {
            self.id = codec::decode(column, schema.id.kind.field_type(), value)?;
        } else if let Some(field) = schema.field_by_column(column) {
            self.fields
                .insert(field.name, codec::decode(column, field.ty, value)?);
        } else if let Some(edge) = schema.many_to_one_edges().find(|e| e.column == column) {
            self.edges.insert(
                edge.name,
                codec::decode(column, edge.target_id.field_type(), value)?,
            );
        } else {
            self.selected
                .insert(column.to_string(), codec::decode_untyped(value));
        }
        Ok(())
    }

    /// Builds a record from the encoded values of a create statement, so the
    /// caller sees exactly what the codec will read back.
    pub(crate) fn from_assignments<'a>(
        schema: &'static EntitySchema,
        id: &SqlValue,
        assignments: impl IntoIterator<Item = (&'a str, &'a SqlValue)>,
    ) -> Result<Self> {
        let mut columns = vec![schema.id.column.to_string()];
        let mut row = vec![id.clone()];
        for (column, value) in assignments {
            columns.push(column.to_string());
            row.push(value.clone());
        }
        Self::decode(schema, &columns, &row)
    }

    pub fn schema(&self) -> &'static EntitySchema {
        self.schema
    }

    pub fn entity(&self) -> &'static str {
        self.schema.name
    }

    pub fn id(&self) -> &Value {
        &self.id
    }

    /// Static field value. NULL when the field is unset.
    pub fn field(&self, name: &str) -> Result<&Value> {
        self.fields
            .get(name)
            .ok_or_else(|| OrmError::UnknownField(name.to_string()))
    }

    /// Id held by a many-to-one edge.
    pub fn edge_id(&self, name: &str) -> Result<&Value> {
        self.edges
            .get(name)
            .ok_or_else(|| OrmError::UnknownField(name.to_string()))
    }

    /// Dynamically selected value that is not part of the static field set.
    pub fn get(&self, name: &str) -> Result<&Value> {
        self.selected
            .get(name)
            .ok_or_else(|| OrmError::UnknownField(name.to_string()))
    }

    pub fn fields(&self) -> impl Iterator<Item = (&'static str, &Value)> {
        self.fields.iter().map(|(k, v)| (*k, v))
    }

    pub fn selected(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.selected.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Converts into a typed entity.
    pub fn to<E: Entity>(&self) -> Result<E> {
        E::from_record(self)
    }

    // ------------------------------------------------------------------
    // Typed accessors used by `Entity` implementations.
    // ------------------------------------------------------------------

    pub fn string(&self, name: &str) -> Result<String> {
        self.opt_string(name)?
            .ok_or_else(|| self.unexpected(name, "TEXT"))
    }

    pub fn opt_string(&self, name: &str) -> Result<Option<String>> {
        match self.field(name)? {
            Value::Null => Ok(None),
            Value::Text(s) => Ok(Some(s.clone())),
            _ => Err(self.unexpected(name, "TEXT")),
        }
    }

    pub fn int(&self, name: &str) -> Result<i64> {
        self.field(name)?
            .as_i64()
            .ok_or_else(|| self.unexpected(name, "INT"))
    }

    pub fn time(&self, name: &str) -> Result<DateTime<Utc>> {
        self.opt_time(name)?
            .ok_or_else(|| self.unexpected(name, "TIME"))
    }

    pub fn opt_time(&self, name: &str) -> Result<Option<DateTime<Utc>>> {
        match self.field(name)? {
            Value::Null => Ok(None),
            Value::Time(t) => Ok(Some(*t)),
            _ => Err(self.unexpected(name, "TIME")),
        }
    }

    pub fn decimal(&self, name: &str) -> Result<Decimal> {
        self.field(name)?
            .as_decimal()
            .ok_or_else(|| self.unexpected(name, "DECIMAL"))
    }

    /// JSON field as a map; NULL reads as `None`, never as an empty map.
    pub fn json_map(&self, name: &str) -> Result<Option<serde_json::Map<String, serde_json::Value>>> {
        match self.field(name)? {
            Value::Null => Ok(None),
            Value::Json(serde_json::Value::Object(map)) => Ok(Some(map.clone())),
            _ => Err(self.unexpected(name, "JSON object")),
        }
    }

    pub fn object<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
        self.field(name)?.object().map_err(|e| match e {
            OrmError::TypeMismatch { message, .. } => OrmError::type_mismatch(name, message),
            other => other,
        })
    }

    pub fn id_string(&self) -> Result<String> {
        match &self.id {
            Value::Text(s) => Ok(s.clone()),
            Value::Int(i) => Ok(i.to_string()),
            _ => Err(self.unexpected(self.schema.id.column, "id")),
        }
    }

    fn unexpected(&self, name: &str, expected: &str) -> OrmError {
        let got = self.fields.get(name).map(Value::type_name).unwrap_or("nothing");
        OrmError::type_mismatch(name, format!("expected {}, got {}", expected, got))
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(self.schema.name)
            .field("id", &self.id)
            .field("fields", &self.fields)
            .field("edges", &self.edges)
            .field("selected", &self.selected)
            .finish()
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.schema, other.schema)
            && self.id == other.id
            && self.fields == other.fields
            && self.edges == other.edges
            && self.selected == other.selected
    }
}

/// A typed view over records of one schema.
pub trait Entity: Sized {
    fn schema() -> &'static EntitySchema;
    fn from_record(record: &Record) -> Result<Self>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::FieldType;
    use crate::schema::{EdgeDescriptor, FieldDescriptor, IdDescriptor};
    use serde_json::json;

    static METER: EntitySchema = EntitySchema {
        name: "Meter",
        table: "meters",
        id: IdDescriptor::uuid(),
        fields: &[
            FieldDescriptor::new("slug", FieldType::Text),
            FieldDescriptor::new("metadata", FieldType::Json).optional(),
        ],
        edges: &[EdgeDescriptor::many_to_one("feature", "Feature", "features", "feature_id")],
        unique_together: &[],
        soft_delete: None,
    };

    fn columns(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_decode_splits_fields_edges_and_extras() {
        let record = Record::decode(
            &METER,
            &columns(&["id", "slug", "metadata", "feature_id", "usage_total"]),
            &[
                SqlValue::Text("m1".into()),
                SqlValue::Text("api_calls".into()),
                SqlValue::Null,
                SqlValue::Text("f1".into()),
                SqlValue::Int(42),
            ],
        )
        .unwrap();

        assert_eq!(record.id(), &Value::from("m1"));
        assert_eq!(record.string("slug").unwrap(), "api_calls");
        assert!(record.json_map("metadata").unwrap().is_none());
        assert_eq!(record.edge_id("feature").unwrap(), &Value::from("f1"));
        assert_eq!(record.get("usage_total").unwrap(), &Value::Int(42));
    }

    #[test]
    fn test_get_unknown_overflow_field() {
        let record = Record::decode(&METER, &columns(&["id"]), &[SqlValue::Text("m1".into())])
            .unwrap();
        assert!(matches!(record.get("nope"), Err(OrmError::UnknownField(ref n)) if n == "nope"));
        assert!(record.field("slug").unwrap().is_null());
        assert!(record.field("nope").is_err());
    }

    #[test]
    fn test_decode_wrong_width() {
        let err = Record::decode(&METER, &columns(&["id", "slug"]), &[SqlValue::Null]).unwrap_err();
        assert!(matches!(err, OrmError::TypeMismatch { .. }));
    }

    #[test]
    fn test_json_map_accessor() {
        let record = Record::decode(
            &METER,
            &columns(&["id", "metadata"]),
            &[SqlValue::Text("m1".into()), SqlValue::Bytes(br#"{"k":"v"}"#.to_vec())],
        )
        .unwrap();
        let map = record.json_map("metadata").unwrap().unwrap();
        assert_eq!(map.get("k"), Some(&json!("v")));
    }
}
