// ============================================================================
// Driver Boundary
// ============================================================================
//
// The storage collaborator. A driver executes specs and returns raw rows in
// driver-native values; the executor normalizes both outcomes and errors.
//
// ============================================================================

mod change;
pub mod memory;
mod table;

pub use memory::MemoryDriver;

use crate::core::{Row, SqlValue};
use crate::spec::{QuerySpec, Statement};
use async_trait::async_trait;
use thiserror::Error;

/// Raw storage failure reported by a driver. The executor maps it to an
/// `OrmError` before it reaches callers.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DriverError {
    #[error("{0}")]
    UniqueViolation(String),

    #[error("{0}")]
    ForeignKeyViolation(String),

    #[error("{0}")]
    NotNullViolation(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    #[error("relation \"{0}\" does not exist")]
    UnknownTable(String),

    #[error("column \"{0}\" does not exist")]
    UnknownColumn(String),

    #[error("not supported: {0}")]
    Unsupported(String),

    #[error("transaction is already closed")]
    TransactionClosed,

    #[error("{0}")]
    Other(String),
}

pub type DriverResult<T> = std::result::Result<T, DriverError>;

/// What a backend can do beyond plain statements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// `INSERT ... RETURNING` is available.
    pub returning: bool,
    /// Native conflict handling on insert.
    pub upsert: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            returning: true,
            upsert: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecResult {
    /// Rows inserted, updated or deleted.
    pub affected: u64,
    /// One entry per create, in statement order. `None` when the insert was
    /// skipped by a conflict clause.
    pub ids: Vec<Option<SqlValue>>,
}

impl ExecResult {
    pub(crate) fn merge(&mut self, other: ExecResult) {
        self.affected += other.affected;
        self.ids.extend(other.ids);
    }
}

/// Result set of a query: column names and positional values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Rows {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl Rows {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[async_trait]
pub trait Driver: Send + Sync {
    /// Backend name used in capability errors and logs.
    fn backend(&self) -> &str;

    fn capabilities(&self) -> Capabilities;

    /// Applies a statement atomically.
    async fn execute(&self, statement: &Statement) -> DriverResult<ExecResult>;

    async fn query(&self, query: &QuerySpec) -> DriverResult<Rows>;

    async fn begin(&self) -> DriverResult<Box<dyn DriverTx>>;
}

/// An open driver transaction.
#[async_trait]
pub trait DriverTx: Send + Sync {
    async fn execute(&self, statement: &Statement) -> DriverResult<ExecResult>;

    async fn query(&self, query: &QuerySpec) -> DriverResult<Rows>;

    async fn commit(&self) -> DriverResult<()>;

    async fn rollback(&self) -> DriverResult<()>;
}
