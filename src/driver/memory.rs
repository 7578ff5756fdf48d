// ============================================================================
// In-Memory Driver
// ============================================================================
//
// Reference driver backing the test suite and embedded use. Each statement
// runs under the store's write lock and records its row writes in a change
// log; on failure the log is undone so the statement leaves no trace.
// Transactions keep their log open until commit (discard) or rollback (undo).
//
// Writers are serialized: an open transaction holds the writer lock until it
// ends, so no other statement can touch rows its log may restore. Readers
// are not blocked and observe uncommitted rows.
//
// ============================================================================

use super::change::{Change, ChangeLog};
use super::table::Table;
use super::{Capabilities, Driver, DriverError, DriverResult, DriverTx, ExecResult, Rows};
use crate::core::{Row, SqlValue};
use crate::schema::{EdgeDescriptor, EntitySchema, OnDelete, Relation};
use crate::spec::{
    AggregateFunc, AggregateSpec, ConflictAction, CreateSpec, DeleteSpec, EdgeSpec, IdSpec, Order,
    ProjectionSpec, QuerySpec, Resolution, Statement, UpdateSpec,
};
use async_trait::async_trait;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

/// In-memory reference store. Clones are handles to the same tables.
#[derive(Clone)]
pub struct MemoryDriver {
    backend: String,
    capabilities: Capabilities,
    store: Arc<RwLock<Store>>,
    writer: Arc<Mutex<()>>,
}

impl MemoryDriver {
    /// Creates a driver with one empty table per schema.
    pub fn new(schemas: &[&'static EntitySchema]) -> Self {
        let mut store = Store::default();
        for schema in schemas {
            store.tables.insert(schema.table, Table::new(schema));
        }
        Self {
            backend: "memory".to_string(),
            capabilities: Capabilities::default(),
            store: Arc::new(RwLock::new(store)),
            writer: Arc::new(Mutex::new(())),
        }
    }

    /// Like [`MemoryDriver::new`], but rejects a catalog whose edges disagree
    /// with the tables they point at.
    pub fn try_new(schemas: &[&'static EntitySchema]) -> DriverResult<Self> {
        for schema in schemas {
            schema.check_edges(schemas).map_err(DriverError::Other)?;
        }
        Ok(Self::new(schemas))
    }

    /// Emulates a backend with fewer features, e.g. no RETURNING.
    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_backend(mut self, name: &str) -> Self {
        self.backend = name.to_string();
        self
    }

    pub async fn register(&self, schema: &'static EntitySchema) {
        let mut store = self.store.write().await;
        store
            .tables
            .entry(schema.table)
            .or_insert_with(|| Table::new(schema));
    }

    pub async fn row_count(&self, table: &str) -> DriverResult<usize> {
        let store = self.store.read().await;
        Ok(store.table(table)?.len())
    }

    fn check_capabilities(&self, statement: &Statement) -> DriverResult<()> {
        match statement {
            Statement::Create(spec) if spec.on_conflict.is_some() && !self.capabilities.upsert => {
                Err(DriverError::Unsupported(format!(
                    "{} cannot resolve insert conflicts",
                    self.backend
                )))
            }
            Statement::Batch(items) => items.iter().try_for_each(|s| self.check_capabilities(s)),
            _ => Ok(()),
        }
    }
}

impl Default for MemoryDriver {
    fn default() -> Self {
        Self::new(&[])
    }
}

#[async_trait]
impl Driver for MemoryDriver {
    fn backend(&self) -> &str {
        &self.backend
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    async fn execute(&self, statement: &Statement) -> DriverResult<ExecResult> {
        self.check_capabilities(statement)?;
        let _writer = self.writer.lock().await;
        let mut store = self.store.write().await;
        let mut log = ChangeLog::default();
        store.apply(statement, &mut log)
    }

    async fn query(&self, query: &QuerySpec) -> DriverResult<Rows> {
        let store = self.store.read().await;
        store.query(query)
    }

    /// Waits for any other open transaction to end.
    async fn begin(&self) -> DriverResult<Box<dyn DriverTx>> {
        let writer = self.writer.clone().lock_owned().await;
        Ok(Box::new(MemoryTx {
            driver: self.clone(),
            log: Mutex::new(ChangeLog::default()),
            writer: StdMutex::new(Some(writer)),
            closed: AtomicBool::new(false),
        }))
    }
}

/// Transaction over the shared store. Writes are applied immediately and
/// undone on rollback, so other sessions observe uncommitted rows. The
/// writer lock is held until commit, rollback or drop.
pub struct MemoryTx {
    driver: MemoryDriver,
    log: Mutex<ChangeLog>,
    writer: StdMutex<Option<OwnedMutexGuard<()>>>,
    closed: AtomicBool,
}

impl MemoryTx {
    fn ensure_open(&self) -> DriverResult<()> {
        if self.closed.load(AtomicOrdering::SeqCst) {
            return Err(DriverError::TransactionClosed);
        }
        Ok(())
    }

    fn release_writer(&self) {
        let mut writer = match self.writer.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        writer.take();
    }
}

#[async_trait]
impl DriverTx for MemoryTx {
    async fn execute(&self, statement: &Statement) -> DriverResult<ExecResult> {
        self.ensure_open()?;
        self.driver.check_capabilities(statement)?;
        let mut store = self.driver.store.write().await;
        let mut log = self.log.lock().await;
        store.apply(statement, &mut log)
    }

    async fn query(&self, query: &QuerySpec) -> DriverResult<Rows> {
        self.ensure_open()?;
        let store = self.driver.store.read().await;
        store.query(query)
    }

    async fn commit(&self) -> DriverResult<()> {
        self.ensure_open()?;
        self.closed.store(true, AtomicOrdering::SeqCst);
        let mut log = self.log.lock().await;
        *log = ChangeLog::default();
        self.release_writer();
        Ok(())
    }

    async fn rollback(&self) -> DriverResult<()> {
        self.ensure_open()?;
        self.closed.store(true, AtomicOrdering::SeqCst);
        {
            let mut store = self.driver.store.write().await;
            let mut log = self.log.lock().await;
            store.undo(log.drain_since(0));
        }
        self.release_writer();
        Ok(())
    }
}

impl Drop for MemoryTx {
    fn drop(&mut self) {
        if self.closed.load(AtomicOrdering::SeqCst) {
            return;
        }
        let changes = self.log.get_mut().drain_since(0);
        let writer = match self.writer.get_mut() {
            Ok(writer) => writer.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if changes.is_empty() {
            return;
        }
        log::warn!(
            "transaction dropped while open, rolling back {} changes",
            changes.len()
        );

        let store = self.driver.store.clone();
        if let Ok(mut guard) = store.try_write() {
            guard.undo(changes);
            return;
        }
        // A reader holds the store. The writer lock moves into the undo so no
        // other write lands before it.
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    store.write().await.undo(changes);
                    drop(writer);
                });
            }
            Err(_) => store.blocking_write().undo(changes),
        }
    }
}

#[derive(Debug, Default)]
struct Store {
    tables: BTreeMap<&'static str, Table>,
}

impl Store {
    fn table(&self, name: &str) -> DriverResult<&Table> {
        self.tables
            .get(name)
            .ok_or_else(|| DriverError::UnknownTable(name.to_string()))
    }

    fn table_mut(&mut self, name: &str) -> DriverResult<&mut Table> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| DriverError::UnknownTable(name.to_string()))
    }

    /// Applies a statement all-or-nothing.
    fn apply(&mut self, statement: &Statement, log: &mut ChangeLog) -> DriverResult<ExecResult> {
        let mut scratch = ChangeLog::default();
        match self.apply_inner(statement, &mut scratch) {
            Ok(result) => {
                log.append(scratch);
                Ok(result)
            }
            Err(e) => {
                self.undo(scratch.drain_since(0));
                Err(e)
            }
        }
    }

    fn apply_inner(&mut self, statement: &Statement, log: &mut ChangeLog) -> DriverResult<ExecResult> {
        match statement {
            Statement::Create(spec) => self.insert(spec, log),
            Statement::Update(spec) => self.update(spec, log),
            Statement::Delete(spec) => self.delete(spec, log),
            Statement::Batch(items) => {
                let mut result = ExecResult::default();
                for item in items {
                    result.merge(self.apply_inner(item, log)?);
                }
                Ok(result)
            }
        }
    }

    fn undo(&mut self, changes: Vec<Change>) {
        for change in changes {
            let Some(table) = self.tables.get_mut(change.table_name()) else {
                continue;
            };
            match change {
                Change::InsertRow { row_id, .. } => table.forget(row_id),
                Change::UpdateRow { row_id, old_row, .. }
                | Change::DeleteRow { row_id, old_row, .. } => table.restore(row_id, old_row),
            }
        }
    }

    fn insert(&mut self, spec: &CreateSpec, log: &mut ChangeLog) -> DriverResult<ExecResult> {
        let table = self.table_mut(spec.table)?;
        let mut row = table.empty_row();
        let id = match &spec.id {
            IdSpec::Value(v) => v.clone(),
            IdSpec::Serial => table.next_serial(),
        };
        row[table.column_index(spec.id_column)?] = id.clone();
        for (column, value) in spec.row_values() {
            row[table.column_index(column)?] = value;
        }

        if let Some(conflict) = &spec.on_conflict {
            let table = self.table(spec.table)?;
            if let Some(existing) = find_conflict(table, &conflict.target, &row)? {
                return self.resolve_conflict(spec, existing, &row, &conflict.action, log);
            }
        }

        self.check_references(spec.table, &row)?;
        let row_id = self.table_mut(spec.table)?.insert(row)?;
        log.record(Change::InsertRow {
            table: spec.table,
            row_id,
        });
        self.apply_child_edges(&spec.edges, &id, log)?;

        Ok(ExecResult {
            affected: 1,
            ids: vec![Some(id)],
        })
    }

    fn resolve_conflict(
        &mut self,
        spec: &CreateSpec,
        existing: u64,
        attempted: &Row,
        action: &ConflictAction,
        log: &mut ChangeLog,
    ) -> DriverResult<ExecResult> {
        let table = self.table(spec.table)?;
        let old = table
            .get(existing)
            .cloned()
            .ok_or_else(|| DriverError::Other(format!("row {} vanished", existing)))?;
        let existing_id = old[table.column_index(spec.id_column)?].clone();

        let columns = match action {
            ConflictAction::DoNothing => {
                return Ok(ExecResult {
                    affected: 0,
                    ids: vec![None],
                });
            }
            ConflictAction::Update(columns) if columns.is_empty() => {
                return Ok(ExecResult {
                    affected: 0,
                    ids: vec![Some(existing_id)],
                });
            }
            ConflictAction::Update(columns) => columns,
        };

        let mut row = old.clone();
        for column in columns {
            let idx = table.column_index(column.column)?;
            row[idx] = match &column.resolution {
                Resolution::New => attempted[idx].clone(),
                Resolution::Existing => old[idx].clone(),
                Resolution::Value(v) => v.clone(),
            };
        }

        self.check_references(spec.table, &row)?;
        self.write_update(spec.table, existing, row, log)?;
        self.apply_child_edges(&spec.edges, &existing_id, log)?;

        Ok(ExecResult {
            affected: 1,
            ids: vec![Some(existing_id)],
        })
    }

    fn update(&mut self, spec: &UpdateSpec, log: &mut ChangeLog) -> DriverResult<ExecResult> {
        let targets = self.table(spec.table)?.matching(spec.filter.as_ref())?;
        let mut affected = 0;

        for row_id in targets {
            let table = self.table(spec.table)?;
            let Some(mut row) = table.get(row_id).cloned() else {
                continue;
            };
            for assignment in &spec.assignments {
                row[table.column_index(assignment.column)?] = assignment.value.clone();
            }
            for column in &spec.cleared {
                row[table.column_index(column)?] = SqlValue::Null;
            }
            for edge in spec.edges.iter().filter(|e| e.relation == Relation::ManyToOne) {
                let idx = table.column_index(edge.column)?;
                if edge.clear {
                    row[idx] = SqlValue::Null;
                }
                if let Some(id) = edge.add.first() {
                    row[idx] = id.clone();
                }
            }
            let id = row[table.column_index(spec.id_column)?].clone();

            self.check_references(spec.table, &row)?;
            self.write_update(spec.table, row_id, row, log)?;
            self.apply_child_edges(&spec.edges, &id, log)?;
            affected += 1;
        }

        if affected == 0
            && let Some(id) = &spec.target_id
        {
            return Err(DriverError::NotFound {
                entity: spec.entity.to_string(),
                id: match id {
                    SqlValue::Text(text) => text.clone(),
                    other => other.to_string(),
                },
            });
        }

        Ok(ExecResult {
            affected,
            ids: Vec::new(),
        })
    }

    fn delete(&mut self, spec: &DeleteSpec, log: &mut ChangeLog) -> DriverResult<ExecResult> {
        let targets = self.table(spec.table)?.matching(spec.filter.as_ref())?;
        let mut affected = 0;
        let mut visiting = BTreeSet::new();
        for row_id in targets {
            if self.delete_row(spec.table, row_id, &mut visiting, log)? {
                affected += 1;
            }
        }
        Ok(ExecResult {
            affected,
            ids: Vec::new(),
        })
    }

    /// Deletes one row after applying the `on_delete` rule of every
    /// many-to-one edge that points at it. Rows already being deleted further
    /// up a cascade are skipped.
    fn delete_row(
        &mut self,
        table_name: &'static str,
        row_id: u64,
        visiting: &mut BTreeSet<(&'static str, u64)>,
        log: &mut ChangeLog,
    ) -> DriverResult<bool> {
        if !visiting.insert((table_name, row_id)) {
            return Ok(false);
        }
        let Some(row) = self.table(table_name)?.get(row_id).cloned() else {
            return Ok(false);
        };

        for (child_table, edge) in self.referencing(table_name) {
            let key = row[self.table(table_name)?.column_index(edge.target_key)?].clone();
            let children: Vec<u64> = self
                .table(child_table)?
                .find(edge.column, &key)?
                .into_iter()
                .filter(|child| !(child_table == table_name && *child == row_id))
                .collect();
            if children.is_empty() {
                continue;
            }

            match edge.on_delete {
                OnDelete::Restrict => {
                    return Err(DriverError::ForeignKeyViolation(format!(
                        "update or delete on table \"{}\" violates foreign key constraint \"{}_{}_fkey\" on table \"{}\"",
                        table_name, child_table, edge.column, child_table
                    )));
                }
                OnDelete::SetNull => {
                    for child in children {
                        self.set_child_key(child_table, child, edge.column, SqlValue::Null, log)?;
                    }
                }
                OnDelete::Cascade => {
                    for child in children {
                        self.delete_row(child_table, child, visiting, log)?;
                    }
                }
            }
        }

        if let Some(old_row) = self.table_mut(table_name)?.delete(row_id) {
            log.record(Change::DeleteRow {
                table: table_name,
                row_id,
                old_row,
            });
        }
        Ok(true)
    }

    fn referencing(&self, table_name: &str) -> Vec<(&'static str, &'static EdgeDescriptor)> {
        let mut out = Vec::new();
        for table in self.tables.values() {
            let schema = table.schema();
            for edge in schema.many_to_one_edges() {
                if edge.target_table == table_name {
                    out.push((schema.table, edge));
                }
            }
        }
        out
    }

    fn write_update(
        &mut self,
        table_name: &'static str,
        row_id: u64,
        row: Row,
        log: &mut ChangeLog,
    ) -> DriverResult<()> {
        let old_row = self.table_mut(table_name)?.update(row_id, row)?;
        log.record(Change::UpdateRow {
            table: table_name,
            row_id,
            old_row,
        });
        Ok(())
    }

    /// Every non-null many-to-one key must point at an existing row.
    fn check_references(&self, table_name: &str, row: &Row) -> DriverResult<()> {
        let table = self.table(table_name)?;
        for edge in table.schema().many_to_one_edges() {
            let value = &row[table.column_index(edge.column)?];
            if value.is_null() {
                continue;
            }
            let target = self.table(edge.target_table)?;
            if target.find(edge.target_key, value)?.is_empty() {
                return Err(DriverError::ForeignKeyViolation(format!(
                    "insert or update on table \"{}\" violates foreign key constraint \"{}_{}_fkey\": key ({})=({}) is not present in table \"{}\"",
                    table_name, table_name, edge.column, edge.column, value, edge.target_table
                )));
            }
        }
        Ok(())
    }

    /// Rewrites the foreign key column on child rows of one-to-many edges.
    fn apply_child_edges(
        &mut self,
        edges: &[EdgeSpec],
        parent_id: &SqlValue,
        log: &mut ChangeLog,
    ) -> DriverResult<()> {
        for edge in edges.iter().filter(|e| e.relation == Relation::OneToMany) {
            let child_table = edge.table;

            if edge.clear {
                for child in self.table(child_table)?.find(edge.column, parent_id)? {
                    self.set_child_key(child_table, child, edge.column, SqlValue::Null, log)?;
                }
            }

            for child_id in &edge.add {
                let table = self.table(child_table)?;
                let rows = table.find(table.schema().id.column, child_id)?;
                if rows.is_empty() {
                    return Err(DriverError::ForeignKeyViolation(format!(
                        "{} row ({}) referenced by edge \"{}\" does not exist",
                        child_table, child_id, edge.edge
                    )));
                }
                for child in rows {
                    self.set_child_key(child_table, child, edge.column, parent_id.clone(), log)?;
                }
            }

            for child_id in &edge.remove {
                let table = self.table(child_table)?;
                let id_idx = table.column_index(table.schema().id.column)?;
                let linked: Vec<u64> = table
                    .find(edge.column, parent_id)?
                    .into_iter()
                    .filter(|r| table.get(*r).is_some_and(|row| &row[id_idx] == child_id))
                    .collect();
                for child in linked {
                    self.set_child_key(child_table, child, edge.column, SqlValue::Null, log)?;
                }
            }
        }
        Ok(())
    }

    fn set_child_key(
        &mut self,
        table_name: &'static str,
        row_id: u64,
        column: &str,
        value: SqlValue,
        log: &mut ChangeLog,
    ) -> DriverResult<()> {
        let table = self.table(table_name)?;
        let idx = table.column_index(column)?;
        let Some(mut row) = table.get(row_id).cloned() else {
            return Ok(());
        };
        row[idx] = value;
        self.write_update(table_name, row_id, row, log)
    }

    fn query(&self, spec: &QuerySpec) -> DriverResult<Rows> {
        let table = self.table(spec.table)?;
        let ids = table.matching(spec.filter.as_ref())?;
        let mut rows: Vec<&Row> = ids.iter().filter_map(|id| table.get(*id)).collect();

        if !spec.order.is_empty() {
            let keys = spec
                .order
                .iter()
                .map(|(column, order)| Ok((table.column_index(column)?, *order)))
                .collect::<DriverResult<Vec<_>>>()?;
            rows.sort_by(|a, b| {
                for (idx, order) in &keys {
                    let ord = nulls_first(&a[*idx], &b[*idx]);
                    let ord = match order {
                        Order::Asc => ord,
                        Order::Desc => ord.reverse(),
                    };
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                Ordering::Equal
            });
        }

        let window = rows
            .into_iter()
            .skip(spec.offset.unwrap_or(0))
            .take(spec.limit.unwrap_or(usize::MAX));

        if let Some(aggregate) = &spec.aggregate {
            let rows: Vec<&Row> = window.collect();
            return aggregate_rows(table, &rows, aggregate);
        }

        let mut indexes = Vec::with_capacity(spec.columns.len());
        for column in &spec.columns {
            indexes.push(table.column_index(column)?);
        }
        let mut projections = Vec::with_capacity(spec.projections.len());
        for projection in &spec.projections {
            projections.push(match projection {
                ProjectionSpec::Column { column, .. } => Some(table.column_index(column)?),
                ProjectionSpec::Literal { .. } => None,
            });
        }

        let mut columns: Vec<String> = spec.columns.iter().map(|c| c.to_string()).collect();
        columns.extend(spec.projections.iter().map(|p| p.alias().to_string()));

        let out = window
            .map(|row| {
                let mut values: Row = indexes.iter().map(|i| row[*i].clone()).collect();
                for (projection, idx) in spec.projections.iter().zip(&projections) {
                    values.push(match (projection, idx) {
                        (_, Some(i)) => row[*i].clone(),
                        (ProjectionSpec::Literal { value, .. }, None) => value.clone(),
                        (ProjectionSpec::Column { .. }, None) => SqlValue::Null,
                    });
                }
                values
            })
            .collect();

        Ok(Rows { columns, rows: out })
    }
}

fn find_conflict(table: &Table, target: &[&'static str], row: &Row) -> DriverResult<Option<u64>> {
    let mut indexes = Vec::with_capacity(target.len());
    for column in target {
        indexes.push(table.column_index(column)?);
    }
    if indexes.iter().any(|i| row[*i].is_null()) {
        return Ok(None);
    }
    Ok(table
        .iter()
        .find(|(_, other)| indexes.iter().all(|i| other[*i] == row[*i]))
        .map(|(id, _)| id))
}

fn nulls_first(a: &SqlValue, b: &SqlValue) -> Ordering {
    match (a.is_null(), b.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => a.compare(b).unwrap_or(Ordering::Equal),
    }
}

fn aggregate_rows(table: &Table, rows: &[&Row], aggregate: &AggregateSpec) -> DriverResult<Rows> {
    let idx = aggregate
        .column
        .map(|c| table.column_index(c))
        .transpose()?;
    let values: Vec<&SqlValue> = match idx {
        Some(i) => rows.iter().map(|r| &r[i]).filter(|v| !v.is_null()).collect(),
        None => Vec::new(),
    };

    let (name, value) = match aggregate.func {
        AggregateFunc::Count => {
            let n = if idx.is_some() { values.len() } else { rows.len() };
            ("count", SqlValue::Int(n as i64))
        }
        AggregateFunc::Sum => {
            let mut total: Option<SqlValue> = None;
            for v in values {
                total = Some(match total {
                    None => v.clone(),
                    Some(acc) => add(&acc, v)?,
                });
            }
            ("sum", total.unwrap_or(SqlValue::Null))
        }
        AggregateFunc::Min | AggregateFunc::Max => {
            let wanted = if aggregate.func == AggregateFunc::Min {
                Ordering::Less
            } else {
                Ordering::Greater
            };
            let mut best: Option<&SqlValue> = None;
            for v in values {
                best = match best {
                    Some(b) if v.compare(b) != Some(wanted) => Some(b),
                    _ => Some(v),
                };
            }
            let name = if wanted == Ordering::Less { "min" } else { "max" };
            (name, best.cloned().unwrap_or(SqlValue::Null))
        }
    };

    Ok(Rows {
        columns: vec![name.to_string()],
        rows: vec![vec![value]],
    })
}

fn add(a: &SqlValue, b: &SqlValue) -> DriverResult<SqlValue> {
    let sum = match (a, b) {
        (SqlValue::Int(x), SqlValue::Int(y)) => SqlValue::Int(
            x.checked_add(*y)
                .ok_or_else(|| DriverError::Other("integer overflow in sum".into()))?,
        ),
        (SqlValue::Float(x), SqlValue::Float(y)) => SqlValue::Float(x + y),
        (SqlValue::Decimal(x), SqlValue::Decimal(y)) => SqlValue::Decimal(*x + *y),
        (SqlValue::Decimal(x), SqlValue::Int(y)) | (SqlValue::Int(y), SqlValue::Decimal(x)) => {
            SqlValue::Decimal(*x + rust_decimal::Decimal::from(*y))
        }
        _ => {
            return Err(DriverError::Unsupported(format!(
                "sum over {} and {}",
                a.type_name(),
                b.type_name()
            )));
        }
    };
    Ok(sum)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::FieldType;
    use crate::schema::{FieldDescriptor, IdDescriptor, IdKind};
    use crate::spec::{Assignment, Filter};
    use std::time::Duration;

    static OWNERS: EntitySchema = EntitySchema {
        name: "Owner",
        table: "owners",
        id: IdDescriptor::serial(),
        fields: &[FieldDescriptor::new("name", FieldType::Text).unique()],
        edges: &[],
        unique_together: &[],
        soft_delete: None,
    };

    static PETS: EntitySchema = EntitySchema {
        name: "Pet",
        table: "pets",
        id: IdDescriptor::serial(),
        fields: &[FieldDescriptor::new("name", FieldType::Text)],
        edges: &[EdgeDescriptor::many_to_one("owner", "Owner", "owners", "owner_id")
            .target_id(IdKind::Int)
            .on_delete(OnDelete::Cascade)],
        unique_together: &[],
        soft_delete: None,
    };

    static NODES: EntitySchema = EntitySchema {
        name: "Node",
        table: "nodes",
        id: IdDescriptor::serial(),
        fields: &[FieldDescriptor::new("name", FieldType::Text)],
        edges: &[EdgeDescriptor::many_to_one("next", "Node", "nodes", "next_id")
            .target_id(IdKind::Int)
            .on_delete(OnDelete::Cascade)],
        unique_together: &[],
        soft_delete: None,
    };

    fn text(column: &'static str, value: &str) -> Assignment {
        Assignment {
            column,
            ty: FieldType::Text,
            value: SqlValue::Text(value.into()),
        }
    }

    fn update_by_id(table: &'static str, id: i64, assignment: Assignment) -> Statement {
        Statement::Update(UpdateSpec {
            entity: "Any",
            table,
            id_column: "id",
            filter: Some(Filter::Eq("id", SqlValue::Int(id))),
            target_id: Some(SqlValue::Int(id)),
            assignments: vec![assignment],
            cleared: vec![],
            edges: vec![],
        })
    }

    fn create(table: &'static str, name: &str, owner: Option<i64>) -> Statement {
        let mut edges = Vec::new();
        if let Some(owner) = owner {
            edges.push(EdgeSpec {
                edge: "owner",
                relation: Relation::ManyToOne,
                table: "pets",
                column: "owner_id",
                target_table: "owners",
                target_key: "id",
                clear: false,
                add: vec![SqlValue::Int(owner)],
                remove: vec![],
            });
        }
        Statement::Create(CreateSpec {
            entity: "Any",
            table,
            id_column: "id",
            id: IdSpec::Serial,
            assignments: vec![Assignment {
                column: "name",
                ty: FieldType::Text,
                value: SqlValue::Text(name.into()),
            }],
            edges,
            on_conflict: None,
        })
    }

    #[tokio::test]
    async fn test_batch_is_all_or_nothing() {
        let driver = MemoryDriver::new(&[&OWNERS, &PETS]);
        let batch = Statement::Batch(vec![
            create("owners", "ann", None),
            create("owners", "bob", None),
            create("owners", "ann", None),
        ]);

        let err = driver.execute(&batch).await.unwrap_err();
        assert!(matches!(err, DriverError::UniqueViolation(_)));
        assert_eq!(driver.row_count("owners").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_foreign_key_and_cascade() {
        let driver = MemoryDriver::new(&[&OWNERS, &PETS]);
        let owner = driver.execute(&create("owners", "ann", None)).await.unwrap();
        assert_eq!(owner.ids, vec![Some(SqlValue::Int(1))]);

        let missing = driver.execute(&create("pets", "rex", Some(42))).await;
        assert!(matches!(missing, Err(DriverError::ForeignKeyViolation(_))));

        driver.execute(&create("pets", "rex", Some(1))).await.unwrap();
        driver.execute(&create("pets", "tom", Some(1))).await.unwrap();

        let delete = Statement::Delete(DeleteSpec {
            entity: "Owner",
            table: "owners",
            id_column: "id",
            filter: Some(Filter::Eq("id", SqlValue::Int(1))),
        });
        let result = driver.execute(&delete).await.unwrap();
        assert_eq!(result.affected, 1);
        assert_eq!(driver.row_count("pets").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_rollback_undoes_writes() {
        let driver = MemoryDriver::new(&[&OWNERS, &PETS]);
        let tx = driver.begin().await.unwrap();
        tx.execute(&create("owners", "ann", None)).await.unwrap();
        assert_eq!(driver.row_count("owners").await.unwrap(), 1);

        tx.rollback().await.unwrap();
        assert_eq!(driver.row_count("owners").await.unwrap(), 0);
        assert!(matches!(
            tx.execute(&create("owners", "bob", None)).await,
            Err(DriverError::TransactionClosed)
        ));
    }

    #[tokio::test]
    async fn test_writes_wait_for_open_transaction() {
        let driver = MemoryDriver::new(&[&OWNERS, &PETS]);
        let tx = driver.begin().await.unwrap();
        tx.execute(&create("owners", "ann", None)).await.unwrap();

        let writer = driver.clone();
        let pet = create("pets", "rex", Some(1));
        let pending = tokio::spawn(async move { writer.execute(&pet).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!pending.is_finished());
        assert_eq!(driver.row_count("owners").await.unwrap(), 1);

        tx.rollback().await.unwrap();
        let result = pending.await.unwrap();
        assert!(matches!(result, Err(DriverError::ForeignKeyViolation(_))));
        assert_eq!(driver.row_count("pets").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_drop_rolls_back_while_store_is_read() {
        let driver = MemoryDriver::new(&[&OWNERS]);
        let tx = driver.begin().await.unwrap();
        tx.execute(&create("owners", "ann", None)).await.unwrap();

        let reading = driver.store.read().await;
        drop(tx);
        assert_eq!(reading.table("owners").unwrap().len(), 1);
        drop(reading);

        driver.execute(&create("owners", "bob", None)).await.unwrap();
        assert_eq!(driver.row_count("owners").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_cascade_cycle_terminates() {
        let driver = MemoryDriver::new(&[&NODES]);
        driver.execute(&create("nodes", "a", None)).await.unwrap();
        let Statement::Create(mut second) = create("nodes", "b", None) else {
            unreachable!()
        };
        second.assignments.push(Assignment {
            column: "next_id",
            ty: FieldType::Int,
            value: SqlValue::Int(1),
        });
        driver.execute(&Statement::Create(second)).await.unwrap();
        let close = Assignment {
            column: "next_id",
            ty: FieldType::Int,
            value: SqlValue::Int(2),
        };
        driver.execute(&update_by_id("nodes", 1, close)).await.unwrap();

        let delete = Statement::Delete(DeleteSpec {
            entity: "Node",
            table: "nodes",
            id_column: "id",
            filter: Some(Filter::Eq("id", SqlValue::Int(1))),
        });
        let result = driver.execute(&delete).await.unwrap();
        assert_eq!(result.affected, 1);
        assert_eq!(driver.row_count("nodes").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_by_id_miss_fails_the_batch() {
        let driver = MemoryDriver::new(&[&OWNERS]);
        driver.execute(&create("owners", "ann", None)).await.unwrap();

        let batch = Statement::Batch(vec![
            update_by_id("owners", 1, text("name", "anna")),
            update_by_id("owners", 99, text("name", "ghost")),
        ]);
        let err = driver.execute(&batch).await.unwrap_err();
        assert_eq!(
            err,
            DriverError::NotFound {
                entity: "Any".into(),
                id: "99".into(),
            }
        );

        let store = driver.store.read().await;
        let owners = store.table("owners").unwrap();
        let (_, row) = owners.iter().next().unwrap();
        assert_eq!(row[1], SqlValue::Text("ann".into()));
    }

    #[tokio::test]
    async fn test_query_orders_and_aggregates() {
        let driver = MemoryDriver::new(&[&OWNERS]);
        for name in ["cat", "ann", "bob"] {
            driver.execute(&create("owners", name, None)).await.unwrap();
        }

        let mut query = QuerySpec {
            entity: "Owner",
            table: "owners",
            columns: vec!["id", "name"],
            filter: None,
            order: vec![("name", Order::Desc)],
            limit: Some(2),
            offset: None,
            projections: vec![],
            aggregate: None,
        };
        let rows = driver.query(&query).await.unwrap();
        assert_eq!(rows.columns, vec!["id", "name"]);
        assert_eq!(rows.rows[0][1], SqlValue::Text("cat".into()));
        assert_eq!(rows.len(), 2);

        query.aggregate = Some(AggregateSpec {
            func: AggregateFunc::Max,
            column: Some("id"),
        });
        let rows = driver.query(&query).await.unwrap();
        assert_eq!(rows.rows, vec![vec![SqlValue::Int(3)]]);

        query.aggregate = Some(AggregateSpec {
            func: AggregateFunc::Count,
            column: None,
        });
        let rows = driver.query(&query).await.unwrap();
        assert_eq!(rows.rows, vec![vec![SqlValue::Int(2)]]);

        query.limit = None;
        query.offset = Some(1);
        let rows = driver.query(&query).await.unwrap();
        assert_eq!(rows.rows, vec![vec![SqlValue::Int(2)]]);

        query.offset = None;
        let rows = driver.query(&query).await.unwrap();
        assert_eq!(rows.rows, vec![vec![SqlValue::Int(3)]]);
    }

    #[tokio::test]
    async fn test_upsert_without_capability_is_unsupported() {
        let driver = MemoryDriver::new(&[&OWNERS]).with_capabilities(Capabilities {
            returning: true,
            upsert: false,
        });
        let Statement::Create(mut spec) = create("owners", "ann", None) else {
            unreachable!()
        };
        spec.on_conflict = Some(crate::spec::ConflictSpec {
            target: vec!["name"],
            action: ConflictAction::DoNothing,
        });
        let err = driver.execute(&Statement::Create(spec)).await.unwrap_err();
        assert!(matches!(err, DriverError::Unsupported(_)));
    }
}
