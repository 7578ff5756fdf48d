use super::{Draft, predicate_setters};
use crate::context::Context;
use crate::core::{OrmError, Result, Value};
use crate::executor::Executor;
use crate::mutation::Op;
use crate::schema::EntitySchema;
use crate::spec::{self, Statement};

/// Builder for deleting every row that matches its predicates.
pub struct Delete<'c> {
    exec: Executor<'c>,
    draft: Draft,
}

impl<'c> Delete<'c> {
    pub(crate) fn new(exec: Executor<'c>, schema: &'static EntitySchema) -> Self {
        Self {
            exec,
            draft: Draft::new(schema, Op::Delete),
        }
    }

    /// Deletes the matching rows and returns how many were removed.
    /// Referencing rows follow their edge's delete rule.
    pub async fn exec(self, ctx: &Context) -> Result<u64> {
        let exec = self.exec;
        let schema = self.draft.schema();
        let mut state = self.draft.prepare()?;
        let spec = spec::build_delete(&state)?;
        state.finish()?;

        let outcome = exec
            .run(ctx, schema.name, Op::Delete, Statement::Delete(spec))
            .await?;
        Ok(outcome.affected)
    }
}

predicate_setters!(Delete);

/// Builder for deleting one row by id.
pub struct DeleteOne<'c> {
    exec: Executor<'c>,
    draft: Draft,
    id: Value,
}

impl<'c> DeleteOne<'c> {
    pub(crate) fn new(
        exec: Executor<'c>,
        schema: &'static EntitySchema,
        id: impl Into<Value>,
    ) -> Self {
        let id = id.into();
        let mut draft = Draft::new(schema, Op::DeleteOne);
        draft.apply(|s| s.set_id(id.clone()));
        Self { exec, draft, id }
    }

    /// Fails with `NotFound` when no row has the id.
    pub async fn exec(self, ctx: &Context) -> Result<()> {
        let exec = self.exec;
        let schema = self.draft.schema();
        let mut state = self.draft.prepare()?;
        let spec = spec::build_delete(&state)?;
        state.finish()?;

        let outcome = exec
            .run(ctx, schema.name, Op::DeleteOne, Statement::Delete(spec))
            .await?;
        if outcome.affected == 0 {
            return Err(OrmError::not_found(schema.name, &self.id));
        }
        Ok(())
    }
}
