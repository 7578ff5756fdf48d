use super::{DriverError, DriverResult};
use crate::core::{Row, SqlValue};
use crate::schema::EntitySchema;
use crate::spec::Filter;
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// One stored table. Rows are keyed by an internal row id so the change log
/// can address them after other rows come and go.
#[derive(Debug, Clone)]
pub(crate) struct Table {
    schema: &'static EntitySchema,
    columns: Vec<&'static str>,
    rows: BTreeMap<u64, Row>,
    next_row_id: u64,
    next_serial: i64,
}

impl Table {
    pub(crate) fn new(schema: &'static EntitySchema) -> Self {
        Self {
            schema,
            columns: schema.columns(),
            rows: BTreeMap::new(),
            next_row_id: 1,
            next_serial: 1,
        }
    }

    pub(crate) fn schema(&self) -> &'static EntitySchema {
        self.schema
    }

    pub(crate) fn column_index(&self, column: &str) -> DriverResult<usize> {
        self.columns
            .iter()
            .position(|c| *c == column)
            .ok_or_else(|| DriverError::UnknownColumn(format!("{}.{}", self.schema.table, column)))
    }

    pub(crate) fn empty_row(&self) -> Row {
        vec![SqlValue::Null; self.columns.len()]
    }

    pub(crate) fn next_serial(&mut self) -> SqlValue {
        let id = self.next_serial;
        self.next_serial += 1;
        SqlValue::Int(id)
    }

    pub(crate) fn get(&self, row_id: u64) -> Option<&Row> {
        self.rows.get(&row_id)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (u64, &Row)> {
        self.rows.iter().map(|(id, row)| (*id, row))
    }

    pub(crate) fn len(&self) -> usize {
        self.rows.len()
    }

    /// Row ids whose `column` equals `value`. NULL never matches.
    pub(crate) fn find(&self, column: &str, value: &SqlValue) -> DriverResult<Vec<u64>> {
        let idx = self.column_index(column)?;
        if value.is_null() {
            return Ok(Vec::new());
        }
        Ok(self
            .rows
            .iter()
            .filter(|(_, row)| &row[idx] == value)
            .map(|(id, _)| *id)
            .collect())
    }

    pub(crate) fn matching(&self, filter: Option<&Filter>) -> DriverResult<Vec<u64>> {
        let mut ids = Vec::new();
        for (id, row) in &self.rows {
            let keep = match filter {
                Some(filter) => self.eval(filter, row)?,
                None => true,
            };
            if keep {
                ids.push(*id);
            }
        }
        Ok(ids)
    }

    pub(crate) fn insert(&mut self, row: Row) -> DriverResult<u64> {
        self.validate_row(&row)?;
        self.check_uniqueness(&row, None)?;

        if let SqlValue::Int(id) = row[0]
            && id >= self.next_serial
        {
            self.next_serial = id + 1;
        }

        let row_id = self.next_row_id;
        self.next_row_id += 1;
        self.rows.insert(row_id, row);
        Ok(row_id)
    }

    /// Replaces a row, returning the previous version.
    pub(crate) fn update(&mut self, row_id: u64, row: Row) -> DriverResult<Row> {
        self.validate_row(&row)?;
        self.check_uniqueness(&row, Some(row_id))?;
        let slot = self
            .rows
            .get_mut(&row_id)
            .ok_or_else(|| DriverError::Other(format!("row {} vanished", row_id)))?;
        Ok(std::mem::replace(slot, row))
    }

    pub(crate) fn delete(&mut self, row_id: u64) -> Option<Row> {
        self.rows.remove(&row_id)
    }

    // Undo primitives: no constraint checks, the previous state was valid.

    pub(crate) fn restore(&mut self, row_id: u64, row: Row) {
        self.rows.insert(row_id, row);
    }

    pub(crate) fn forget(&mut self, row_id: u64) {
        self.rows.remove(&row_id);
    }

    fn validate_row(&self, row: &Row) -> DriverResult<()> {
        if row.len() != self.columns.len() {
            return Err(DriverError::Other(format!(
                "table {} expects {} values, got {}",
                self.schema.table,
                self.columns.len(),
                row.len()
            )));
        }

        for (idx, column) in self.columns.iter().enumerate() {
            if row[idx].is_null() && !self.nullable(column) {
                return Err(DriverError::NotNullViolation(format!(
                    "null value in column \"{}\" of relation \"{}\" violates not-null constraint",
                    column, self.schema.table
                )));
            }
        }
        Ok(())
    }

    fn nullable(&self, column: &str) -> bool {
        if column == self.schema.id.column {
            return false;
        }
        if let Some(field) = self.schema.field_by_column(column) {
            return field.optional;
        }
        !self
            .schema
            .many_to_one_edges()
            .any(|e| e.column == column && e.required)
    }

    fn check_uniqueness(&self, row: &Row, ignore: Option<u64>) -> DriverResult<()> {
        for column in self.schema.unique_columns() {
            let idx = self.column_index(column)?;
            let value = &row[idx];
            if value.is_null() {
                continue;
            }
            let taken = self
                .rows
                .iter()
                .any(|(id, other)| Some(*id) != ignore && &other[idx] == value);
            if taken {
                return Err(DriverError::UniqueViolation(format!(
                    "duplicate key value violates unique constraint \"{}_{}_key\": ({})=({})",
                    self.schema.table, column, column, value
                )));
            }
        }

        for set in self.schema.unique_together {
            let mut indexes = Vec::with_capacity(set.len());
            for name in *set {
                let (column, _) = self
                    .schema
                    .resolve_column(name)
                    .ok_or_else(|| DriverError::UnknownColumn(name.to_string()))?;
                indexes.push(self.column_index(column)?);
            }
            if indexes.iter().any(|i| row[*i].is_null()) {
                continue;
            }
            let taken = self.rows.iter().any(|(id, other)| {
                Some(*id) != ignore && indexes.iter().all(|i| other[*i] == row[*i])
            });
            if taken {
                return Err(DriverError::UniqueViolation(format!(
                    "duplicate key value violates unique constraint \"{}_{}_key\"",
                    self.schema.table,
                    set.join("_")
                )));
            }
        }
        Ok(())
    }

    /// Whether the row passes the filter. A filter that is unknown under
    /// SQL three-valued logic, e.g. any comparison with NULL, does not pass.
    pub(crate) fn eval(&self, filter: &Filter, row: &Row) -> DriverResult<bool> {
        Ok(self.truth(filter, row)? == Some(true))
    }

    fn cell<'r>(&self, row: &'r Row, column: &str) -> DriverResult<&'r SqlValue> {
        Ok(&row[self.column_index(column)?])
    }

    /// Three-valued evaluation: `None` is SQL's unknown.
    fn truth(&self, filter: &Filter, row: &Row) -> DriverResult<Option<bool>> {
        let cell = |column: &str| self.cell(row, column);
        let cmp = |column: &str, value: &SqlValue| -> DriverResult<Option<Ordering>> {
            Ok(self.cell(row, column)?.compare(value))
        };

        let result = match filter {
            Filter::Eq(c, v) => cmp(c, v)?.map(|o| o == Ordering::Equal),
            Filter::Ne(c, v) => cmp(c, v)?.map(|o| o != Ordering::Equal),
            Filter::Gt(c, v) => cmp(c, v)?.map(|o| o == Ordering::Greater),
            Filter::Gte(c, v) => cmp(c, v)?.map(|o| o != Ordering::Less),
            Filter::Lt(c, v) => cmp(c, v)?.map(|o| o == Ordering::Less),
            Filter::Lte(c, v) => cmp(c, v)?.map(|o| o != Ordering::Greater),
            Filter::In(c, values) => membership(cell(c)?, values),
            Filter::NotIn(c, values) => membership(cell(c)?, values).map(|found| !found),
            Filter::IsNull(c) => Some(cell(c)?.is_null()),
            Filter::NotNull(c) => Some(!cell(c)?.is_null()),
            Filter::Contains(c, needle) => match cell(c)? {
                SqlValue::Null => None,
                SqlValue::Text(s) => Some(s.contains(needle.as_str())),
                _ => Some(false),
            },
            Filter::And(items) => {
                let mut out = Some(true);
                for item in items {
                    match self.truth(item, row)? {
                        Some(false) => return Ok(Some(false)),
                        None => out = None,
                        Some(true) => {}
                    }
                }
                out
            }
            Filter::Or(items) => {
                let mut out = Some(false);
                for item in items {
                    match self.truth(item, row)? {
                        Some(true) => return Ok(Some(true)),
                        None => out = None,
                        Some(false) => {}
                    }
                }
                out
            }
            Filter::Not(inner) => self.truth(inner, row)?.map(|b| !b),
        };
        Ok(result)
    }
}

/// `cell IN (values)`. An empty list is false; a NULL on either side makes a
/// miss unknown.
fn membership(cell: &SqlValue, values: &[SqlValue]) -> Option<bool> {
    if values.is_empty() {
        return Some(false);
    }
    if cell.is_null() {
        return None;
    }
    let mut unknown = false;
    for value in values {
        match cell.compare(value) {
            Some(Ordering::Equal) => return Some(true),
            None => unknown = true,
            Some(_) => {}
        }
    }
    if unknown { None } else { Some(false) }
}
