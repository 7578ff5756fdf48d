use super::{Draft, Upsert, created_id, mutation_setters, record_from_spec};
use crate::context::Context;
use crate::core::{Result, Value};
use crate::entity::Record;
use crate::executor::Executor;
use crate::mutation::Op;
use crate::schema::EntitySchema;
use crate::spec::{self, ConflictTarget, CreateSpec, OnConflict, Statement};

/// Builder for inserting one row.
pub struct Create<'c> {
    exec: Executor<'c>,
    draft: Draft,
}

impl<'c> Create<'c> {
    pub(crate) fn new(exec: Executor<'c>, schema: &'static EntitySchema) -> Self {
        Self {
            exec,
            draft: Draft::new(schema, Op::Create),
        }
    }

    pub fn schema(&self) -> &'static EntitySchema {
        self.draft.schema()
    }

    /// Supplies the id of the new row. Only accepted when the schema's id is
    /// assignable.
    pub fn with_id(mut self, id: impl Into<Value>) -> Self {
        self.draft.apply(|s| s.set_id(id));
        self
    }

    /// Turns the insert into an upsert against the given constraint.
    pub fn on_conflict(self, target: ConflictTarget) -> Upsert<'c> {
        Upsert::new(self, target)
    }

    /// Upsert on a set of field or edge names.
    pub fn on_conflict_columns<S: Into<String>>(
        self,
        columns: impl IntoIterator<Item = S>,
    ) -> Upsert<'c> {
        self.on_conflict(ConflictTarget::columns(columns))
    }

    pub(crate) fn executor(&self) -> Executor<'c> {
        self.exec
    }

    pub(crate) fn into_spec(self, on_conflict: Option<&OnConflict>) -> Result<CreateSpec> {
        let mut state = self.draft.prepare()?;
        let spec = spec::build_create(&state, on_conflict)?;
        state.finish()?;
        Ok(spec)
    }

    /// Inserts the row and returns it as stored, generated id included.
    pub async fn save(self, ctx: &Context) -> Result<Record> {
        let exec = self.exec;
        let schema = self.schema();
        let spec = self.into_spec(None)?;

        let outcome = exec
            .run(ctx, schema.name, Op::Create, Statement::Create(spec.clone()))
            .await?;

        let id = created_id(&spec, outcome.ids.first())?;
        record_from_spec(schema, &spec, &id)
    }

    /// Inserts the row without building a record.
    pub async fn exec(self, ctx: &Context) -> Result<()> {
        let exec = self.exec;
        let schema = self.schema();
        let spec = self.into_spec(None)?;
        exec.run(ctx, schema.name, Op::Create, Statement::Create(spec))
            .await?;
        Ok(())
    }
}

mutation_setters!(Create);
