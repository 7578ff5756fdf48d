// ============================================================================
// meterstore Library
// ============================================================================
//
// Schema-driven persistence layer for the metering and billing platform.
//
//   schema ─► mutation state ─► spec ─► hooks ─► driver
//                                                  │
//   Record ◄──────────── codec ◄───────────────────┘
//
// ============================================================================

//! Schema-driven persistence for metering entities.
//!
//! Entities are described by static [`EntitySchema`]s. A [`Session`] hands out
//! single-use builders for creates, updates, deletes, upserts and bulk
//! operations, plus a [`Query`] builder for reads. Statements go through the
//! hook chain and a [`Driver`]; [`MemoryDriver`] is the reference store and
//! [`sql::render`] produces parameterized SQL for real backends.
//!
//! ```
//! use meterstore::models::{self, PLAN};
//! use meterstore::{Conn, Context, MemoryDriver, Session, Value};
//!
//! # #[tokio::main]
//! # async fn main() -> meterstore::Result<()> {
//! let session = Session::new(MemoryDriver::new(&models::schemas()));
//! let ctx = Context::background();
//!
//! let plan = session
//!     .create(&PLAN)
//!     .set("namespace", "acme")
//!     .set("key", "pro")
//!     .set("name", "Pro")
//!     .save(&ctx)
//!     .await?;
//!
//! let found = session.query(&PLAN).get(&ctx, plan.id().clone()).await?;
//! assert_eq!(found.field("currency")?, &Value::from("USD"));
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod config;
pub mod context;
pub mod core;
pub mod driver;
pub mod entity;
pub mod executor;
pub mod hooks;
pub mod models;
pub mod mutation;
pub mod ops;
pub mod predicate;
pub mod query;
pub mod schema;
pub mod session;
pub mod spec;
pub mod sql;

pub use config::SessionConfig;
pub use context::{CancelHandle, Context};
pub use crate::core::{ConstraintKind, FieldType, OrmError, Result, SqlValue, Value};
pub use driver::{Capabilities, Driver, DriverTx, MemoryDriver};
pub use entity::{Entity, Record};
pub use hooks::{Hook, HookContext, LogHook, Next, OpFilter, Outcome};
pub use mutation::Op;
pub use query::{Aggregate, Projection, Query};
pub use schema::{EntitySchema, ValueObject};
pub use session::{Conn, Session, Transaction};
pub use spec::{ConflictTarget, Order};
