// ============================================================================
// Statement Specs
// ============================================================================
//
// Dialect-neutral descriptions of what a driver must do. Everything here is
// plain data: built from mutation state without side effects, consumed by the
// in-memory driver and by the SQL renderer.
//
// ============================================================================

pub mod builder;
pub mod conflict;
pub mod filter;

pub use builder::{apply_defaults, build_create, build_delete, build_update, check};
pub use conflict::{ConflictPolicy, ConflictTarget, Merge, OnConflict};
pub use filter::{Filter, compile_filter};

use crate::core::{FieldType, SqlValue};
use crate::schema::Relation;

/// One column assignment of an INSERT or UPDATE.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub column: &'static str,
    pub ty: FieldType,
    pub value: SqlValue,
}

/// Identifier of a row being created.
#[derive(Debug, Clone, PartialEq)]
pub enum IdSpec {
    Value(SqlValue),
    /// Assigned by the store.
    Serial,
}

/// Edge delta for one relation.
///
/// For many-to-one edges `table`/`column` is the FK column on the mutated
/// row itself; for one-to-many it is the FK column on the child table.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeSpec {
    pub edge: &'static str,
    pub relation: Relation,
    pub table: &'static str,
    pub column: &'static str,
    pub target_table: &'static str,
    pub target_key: &'static str,
    pub clear: bool,
    pub add: Vec<SqlValue>,
    pub remove: Vec<SqlValue>,
}

/// How a conflicting column is resolved by an upsert.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// Take the value the insert attempted to write.
    New,
    /// Keep the stored value.
    Existing,
    Value(SqlValue),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnResolution {
    pub column: &'static str,
    pub resolution: Resolution,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConflictAction {
    DoNothing,
    /// Update the listed columns of the existing row. Empty keeps the row
    /// untouched but still reports its id.
    Update(Vec<ColumnResolution>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConflictSpec {
    pub target: Vec<&'static str>,
    pub action: ConflictAction,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateSpec {
    pub entity: &'static str,
    pub table: &'static str,
    pub id_column: &'static str,
    pub id: IdSpec,
    pub assignments: Vec<Assignment>,
    pub edges: Vec<EdgeSpec>,
    pub on_conflict: Option<ConflictSpec>,
}

impl CreateSpec {
    pub fn assignment(&self, column: &str) -> Option<&Assignment> {
        self.assignments.iter().find(|a| a.column == column)
    }

    /// Assignments plus many-to-one keys, as written to the new row.
    pub fn row_values(&self) -> Vec<(&'static str, SqlValue)> {
        let mut values: Vec<(&'static str, SqlValue)> = self
            .assignments
            .iter()
            .map(|a| (a.column, a.value.clone()))
            .collect();
        for edge in &self.edges {
            if edge.relation == Relation::ManyToOne
                && let Some(id) = edge.add.first()
            {
                values.push((edge.column, id.clone()));
            }
        }
        values
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateSpec {
    pub entity: &'static str,
    pub table: &'static str,
    pub id_column: &'static str,
    pub filter: Option<Filter>,
    /// Id of the single row a by-id update targets. The statement fails with
    /// `DriverError::NotFound` when that row is missing.
    pub target_id: Option<SqlValue>,
    pub assignments: Vec<Assignment>,
    pub cleared: Vec<&'static str>,
    pub edges: Vec<EdgeSpec>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteSpec {
    pub entity: &'static str,
    pub table: &'static str,
    pub id_column: &'static str,
    pub filter: Option<Filter>,
}

/// Unit of work handed to a driver. A batch is applied all-or-nothing.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Create(CreateSpec),
    Update(UpdateSpec),
    Delete(DeleteSpec),
    Batch(Vec<Statement>),
}

impl Statement {
    pub fn kind(&self) -> &'static str {
        match self {
            Statement::Create(_) => "create",
            Statement::Update(_) => "update",
            Statement::Delete(_) => "delete",
            Statement::Batch(_) => "batch",
        }
    }

    pub fn table(&self) -> Option<&'static str> {
        match self {
            Statement::Create(spec) => Some(spec.table),
            Statement::Update(spec) => Some(spec.table),
            Statement::Delete(spec) => Some(spec.table),
            Statement::Batch(items) => items.first().and_then(Statement::table),
        }
    }

    /// Number of entity-level statements, counting batch items.
    pub fn len(&self) -> usize {
        match self {
            Statement::Batch(items) => items.iter().map(Statement::len).sum(),
            _ => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFunc {
    Count,
    Sum,
    Min,
    Max,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AggregateSpec {
    pub func: AggregateFunc,
    /// `None` counts rows.
    pub column: Option<&'static str>,
}

/// Extra value selected alongside the static columns.
#[derive(Debug, Clone, PartialEq)]
pub enum ProjectionSpec {
    Column { column: &'static str, alias: String },
    Literal { value: SqlValue, alias: String },
}

impl ProjectionSpec {
    pub fn alias(&self) -> &str {
        match self {
            ProjectionSpec::Column { alias, .. } | ProjectionSpec::Literal { alias, .. } => alias,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QuerySpec {
    pub entity: &'static str,
    pub table: &'static str,
    pub columns: Vec<&'static str>,
    pub filter: Option<Filter>,
    pub order: Vec<(&'static str, Order)>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    pub projections: Vec<ProjectionSpec>,
    /// When set the query returns a single row with the aggregate.
    pub aggregate: Option<AggregateSpec>,
}
