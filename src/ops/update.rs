use super::{Draft, mutation_setters, predicate_setters};
use crate::context::Context;
use crate::core::{OrmError, Result, Value};
use crate::entity::Record;
use crate::executor::Executor;
use crate::mutation::Op;
use crate::query::fetch_by_ids;
use crate::schema::{EntitySchema, validators};
use crate::spec::{self, Statement, UpdateSpec};

/// Builder for updating every row that matches its predicates.
pub struct Update<'c> {
    exec: Executor<'c>,
    draft: Draft,
}

impl<'c> Update<'c> {
    pub(crate) fn new(exec: Executor<'c>, schema: &'static EntitySchema) -> Self {
        Self {
            exec,
            draft: Draft::new(schema, Op::Update),
        }
    }

    pub fn schema(&self) -> &'static EntitySchema {
        self.draft.schema()
    }

    /// Applies the update and returns the number of rows changed.
    pub async fn exec(self, ctx: &Context) -> Result<u64> {
        let exec = self.exec;
        let schema = self.schema();
        let mut state = self.draft.prepare()?;
        let spec = spec::build_update(&state)?;
        state.finish()?;

        let outcome = exec
            .run(ctx, schema.name, Op::Update, Statement::Update(spec))
            .await?;
        Ok(outcome.affected)
    }
}

mutation_setters!(Update);
predicate_setters!(Update);

/// Builder for updating one row by id.
pub struct UpdateOne<'c> {
    exec: Executor<'c>,
    draft: Draft,
    id: Value,
}

impl<'c> UpdateOne<'c> {
    pub(crate) fn new(
        exec: Executor<'c>,
        schema: &'static EntitySchema,
        id: impl Into<Value>,
    ) -> Self {
        let id = id.into();
        let mut draft = Draft::new(schema, Op::UpdateOne);
        draft.apply(|s| s.set_id(id.clone()));
        Self { exec, draft, id }
    }

    pub fn schema(&self) -> &'static EntitySchema {
        self.draft.schema()
    }

    pub fn id(&self) -> &Value {
        &self.id
    }

    /// Stamps the soft-delete timestamp. The row disappears from default
    /// queries but keeps its edges.
    pub fn soft_delete(mut self) -> Self {
        let schema = self.schema();
        match schema.soft_delete {
            Some(field) => self.draft.apply(|s| s.set_field(field, validators::now())),
            None => self.draft.fail(no_soft_delete(schema)),
        }
        self
    }

    /// Clears the soft-delete timestamp.
    pub fn restore(mut self) -> Self {
        let schema = self.schema();
        match schema.soft_delete {
            Some(field) => self.draft.apply(|s| s.clear_field(field)),
            None => self.draft.fail(no_soft_delete(schema)),
        }
        self
    }

    pub(crate) fn into_spec(self) -> Result<UpdateSpec> {
        let mut state = self.draft.prepare()?;
        let spec = spec::build_update(&state)?;
        state.finish()?;
        Ok(spec)
    }

    /// Applies the update and returns the row as stored afterwards.
    pub async fn save(self, ctx: &Context) -> Result<Record> {
        let exec = self.exec;
        let schema = self.schema();
        let id = self.id.clone();
        self.run(ctx).await?;

        fetch_by_ids(exec, ctx, schema, std::slice::from_ref(&id))
            .await?
            .pop()
            .ok_or_else(|| OrmError::not_found(schema.name, &id))
    }

    pub async fn exec(self, ctx: &Context) -> Result<()> {
        self.run(ctx).await
    }

    async fn run(self, ctx: &Context) -> Result<()> {
        let exec = self.exec;
        let schema = self.schema();
        let id = self.id.clone();
        let spec = self.into_spec()?;

        let outcome = exec
            .run(ctx, schema.name, Op::UpdateOne, Statement::Update(spec))
            .await?;
        if outcome.affected == 0 {
            return Err(OrmError::not_found(schema.name, &id));
        }
        Ok(())
    }
}

mutation_setters!(UpdateOne);

fn no_soft_delete(schema: &EntitySchema) -> OrmError {
    OrmError::validation(schema.name, "deleted_at", "entity does not support soft delete")
}
