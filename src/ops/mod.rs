// ============================================================================
// Mutation Builders
// ============================================================================
//
// Fluent, single-use builders over a `MutationState`. Setters chain by value
// and never fail on the spot: the first error is kept and returned by the
// terminal call, before any I/O. Terminal calls consume the builder.
//
// Every terminal runs the same pipeline:
//   defaults -> check -> spec build -> hooks -> driver
//
// ============================================================================

pub mod bulk;
pub mod create;
pub mod delete;
pub mod update;
pub mod upsert;

pub use bulk::{CreateBulk, UpdateBulk};
pub use create::Create;
pub use delete::{Delete, DeleteOne};
pub use update::{Update, UpdateOne};
pub use upsert::Upsert;

use crate::core::{OrmError, Result, SqlValue};
use crate::entity::Record;
use crate::mutation::{MutationState, Op};
use crate::schema::EntitySchema;
use crate::spec::{self, CreateSpec, IdSpec};

/// Mutation state plus the first setter error.
#[derive(Debug)]
pub(crate) struct Draft {
    state: MutationState,
    error: Option<OrmError>,
}

impl Draft {
    pub(crate) fn new(schema: &'static EntitySchema, op: Op) -> Self {
        Self {
            state: MutationState::new(schema, op),
            error: None,
        }
    }

    pub(crate) fn schema(&self) -> &'static EntitySchema {
        self.state.schema()
    }

    pub(crate) fn apply(&mut self, f: impl FnOnce(&mut MutationState) -> Result<()>) {
        if self.error.is_some() {
            return;
        }
        if let Err(e) = f(&mut self.state) {
            self.error = Some(e);
        }
    }

    pub(crate) fn fail(&mut self, error: OrmError) {
        self.error.get_or_insert(error);
    }

    /// Applies defaults and validation. The returned state is ready for a
    /// spec to be built from it.
    pub(crate) fn prepare(self) -> Result<MutationState> {
        if let Some(e) = self.error {
            return Err(e);
        }
        let mut state = self.state;
        spec::apply_defaults(&mut state)?;
        spec::check(&state)?;
        Ok(state)
    }
}

/// Id of a created row: what the store reported, else what was sent.
pub(crate) fn created_id(spec: &CreateSpec, returned: Option<&Option<SqlValue>>) -> Result<SqlValue> {
    if let Some(Some(id)) = returned {
        return Ok(id.clone());
    }
    match &spec.id {
        IdSpec::Value(id) => Ok(id.clone()),
        IdSpec::Serial => Err(OrmError::Driver(format!(
            "store returned no id for new {}",
            spec.entity
        ))),
    }
}

pub(crate) fn record_from_spec(
    schema: &'static EntitySchema,
    spec: &CreateSpec,
    id: &SqlValue,
) -> Result<Record> {
    let values = spec.row_values();
    Record::from_assignments(schema, id, values.iter().map(|(c, v)| (*c, v)))
}

/// Generates the field and edge setters shared by create and update
/// builders.
macro_rules! mutation_setters {
    ($builder:ident) => {
        impl<'c> $builder<'c> {
            /// Sets a field. NULL on an optional field clears it.
            pub fn set(mut self, field: &str, value: impl Into<$crate::core::Value>) -> Self {
                self.draft.apply(|s| s.set_field(field, value));
                self
            }

            /// Sets the field when `value` is `Some`, leaves it untouched
            /// otherwise.
            pub fn set_opt<V: Into<$crate::core::Value>>(self, field: &str, value: Option<V>) -> Self {
                match value {
                    Some(value) => self.set(field, value),
                    None => self,
                }
            }

            /// Sets an optional field to NULL.
            pub fn clear(mut self, field: &str) -> Self {
                self.draft.apply(|s| s.clear_field(field));
                self
            }

            pub fn add_edge<I, V>(mut self, edge: &str, ids: I) -> Self
            where
                I: IntoIterator<Item = V>,
                V: Into<$crate::core::Value>,
            {
                self.draft.apply(|s| s.add_edge(edge, ids));
                self
            }

            /// Shorthand for adding the single id of a many-to-one edge.
            pub fn set_edge(self, edge: &str, id: impl Into<$crate::core::Value>) -> Self {
                self.add_edge(edge, [id.into()])
            }

            pub fn remove_edge<I, V>(mut self, edge: &str, ids: I) -> Self
            where
                I: IntoIterator<Item = V>,
                V: Into<$crate::core::Value>,
            {
                self.draft.apply(|s| s.remove_edge(edge, ids));
                self
            }

            pub fn clear_edge(mut self, edge: &str) -> Self {
                self.draft.apply(|s| s.clear_edge(edge));
                self
            }
        }
    };
}

/// Generates the row-predicate setters of update and delete builders.
macro_rules! predicate_setters {
    ($builder:ident) => {
        impl<'c> $builder<'c> {
            pub fn filter(mut self, predicate: $crate::predicate::Predicate) -> Self {
                self.draft.apply(|s| s.add_predicate(predicate));
                self
            }

            pub fn namespace(self, namespace: &str) -> Self {
                self.filter($crate::predicate::eq("namespace", namespace))
            }
        }
    };
}

pub(crate) use {mutation_setters, predicate_setters};
