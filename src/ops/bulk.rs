// Bulk builders send every item in one batch statement, so hooks observe a
// single invocation and the driver applies the items all-or-nothing.

use super::upsert::merge_ignored;
use super::{Create, UpdateOne, created_id, record_from_spec};
use crate::codec;
use crate::context::Context;
use crate::core::{OrmError, Result, Value};
use crate::entity::Record;
use crate::executor::Executor;
use crate::mutation::Op;
use crate::query::fetch_by_ids;
use crate::schema::EntitySchema;
use crate::spec::conflict::Resolver;
use crate::spec::{ConflictPolicy, ConflictTarget, CreateSpec, OnConflict, Statement};

/// Checks size and schema homogeneity of a batch.
fn batch_schema<T>(
    exec: &Executor<'_>,
    items: &[T],
    schema_of: impl Fn(&T) -> &'static EntitySchema,
) -> Result<&'static EntitySchema> {
    let Some(first) = items.first() else {
        return Err(OrmError::validation("batch", "items", "batch is empty"));
    };
    let schema = schema_of(first);
    let max = exec.config().max_batch_size;
    if items.len() > max {
        return Err(OrmError::validation(
            schema.name,
            "batch",
            format!("{} items exceed the batch limit of {}", items.len(), max),
        ));
    }
    if let Some(other) = items.iter().map(&schema_of).find(|s| s.name != schema.name) {
        return Err(OrmError::validation(
            schema.name,
            "batch",
            format!("batch mixes {} and {}", schema.name, other.name),
        ));
    }
    Ok(schema)
}

/// Builder for inserting many rows of one entity.
pub struct CreateBulk<'c> {
    exec: Executor<'c>,
    items: Vec<Create<'c>>,
    on_conflict: Option<OnConflict>,
}

impl<'c> CreateBulk<'c> {
    pub(crate) fn new(exec: Executor<'c>, items: Vec<Create<'c>>) -> Self {
        Self {
            exec,
            items,
            on_conflict: None,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Resolves conflicts on every item. Defaults to overwriting with the
    /// attempted values.
    pub fn on_conflict(mut self, target: ConflictTarget) -> Self {
        self.on_conflict = Some(OnConflict {
            target,
            policy: ConflictPolicy::UpdateNewValues { ignore: Vec::new() },
        });
        self
    }

    pub fn on_conflict_columns<S: Into<String>>(
        self,
        columns: impl IntoIterator<Item = S>,
    ) -> Self {
        self.on_conflict(ConflictTarget::columns(columns))
    }

    fn with_policy(mut self, f: impl FnOnce(ConflictPolicy) -> ConflictPolicy) -> Self {
        if let Some(on_conflict) = self.on_conflict.as_mut() {
            let policy = std::mem::replace(&mut on_conflict.policy, ConflictPolicy::DoNothing);
            on_conflict.policy = f(policy);
        }
        self
    }

    pub fn update_new_values(self) -> Self {
        self.with_policy(|_| ConflictPolicy::UpdateNewValues { ignore: Vec::new() })
    }

    pub fn ignore_columns<S: Into<String>>(self, fields: impl IntoIterator<Item = S>) -> Self {
        self.with_policy(|policy| merge_ignored(policy, fields))
    }

    pub fn ignore(self) -> Self {
        self.with_policy(|_| ConflictPolicy::Ignore)
    }

    pub fn do_nothing(self) -> Self {
        self.with_policy(|_| ConflictPolicy::DoNothing)
    }

    pub fn resolve(self, f: impl FnOnce(Resolver) -> Resolver) -> Self {
        self.with_policy(|_| ConflictPolicy::Custom(f(Resolver::default()).into_rules()))
    }

    #[allow(clippy::type_complexity)]
    fn prepare(
        self,
    ) -> Result<(Executor<'c>, &'static EntitySchema, Option<OnConflict>, Vec<CreateSpec>)> {
        let exec = self.exec;
        let schema = batch_schema(&exec, &self.items, |c| c.schema())?;
        if self.on_conflict.is_some() && !exec.capabilities().upsert {
            return Err(OrmError::Capability {
                backend: exec.backend().to_string(),
                operation: "bulk insert with conflict resolution".into(),
            });
        }
        let specs = self
            .items
            .into_iter()
            .map(|item| item.into_spec(self.on_conflict.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Ok((exec, schema, self.on_conflict, specs))
    }

    /// Inserts every item and returns the stored rows in item order. With
    /// `do_nothing`, items skipped by a conflict are left out.
    pub async fn save(self, ctx: &Context) -> Result<Vec<Record>> {
        if self.items.is_empty() {
            return Ok(Vec::new());
        }
        let (exec, schema, on_conflict, specs) = self.prepare()?;
        let statement = Statement::Batch(specs.iter().cloned().map(Statement::Create).collect());
        let outcome = exec.run(ctx, schema.name, Op::Create, statement).await?;

        if on_conflict.is_none() {
            return specs
                .iter()
                .enumerate()
                .map(|(i, spec)| {
                    let id = created_id(spec, outcome.ids.get(i))?;
                    record_from_spec(schema, spec, &id)
                })
                .collect();
        }

        // Conflicting rows keep stored values the specs do not know about.
        let ids = outcome
            .ids
            .iter()
            .flatten()
            .map(|id| codec::decode(schema.id.column, schema.id.kind.field_type(), id))
            .collect::<Result<Vec<Value>>>()?;
        fetch_by_ids(exec, ctx, schema, &ids).await
    }

    pub async fn exec(self, ctx: &Context) -> Result<()> {
        if self.items.is_empty() {
            return Ok(());
        }
        let (exec, schema, _, specs) = self.prepare()?;
        let statement = Statement::Batch(specs.into_iter().map(Statement::Create).collect());
        exec.run(ctx, schema.name, Op::Create, statement).await?;
        Ok(())
    }
}

/// Builder for updating many rows by id in one batch.
pub struct UpdateBulk<'c> {
    exec: Executor<'c>,
    items: Vec<UpdateOne<'c>>,
}

impl<'c> UpdateBulk<'c> {
    pub(crate) fn new(exec: Executor<'c>, items: Vec<UpdateOne<'c>>) -> Self {
        Self { exec, items }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Applies every update and returns the rows as stored afterwards, in
    /// item order. A missing id fails with `NotFound`.
    pub async fn save(self, ctx: &Context) -> Result<Vec<Record>> {
        if self.items.is_empty() {
            return Ok(Vec::new());
        }
        let exec = self.exec;
        let schema = batch_schema(&exec, &self.items, |u| u.schema())?;
        let ids: Vec<Value> = self.items.iter().map(|u| u.id().clone()).collect();
        let statement = Statement::Batch(
            self.items
                .into_iter()
                .map(|item| item.into_spec().map(Statement::Update))
                .collect::<Result<Vec<_>>>()?,
        );

        exec.run(ctx, schema.name, Op::UpdateOne, statement).await?;
        fetch_by_ids(exec, ctx, schema, &ids).await
    }

    pub async fn exec(self, ctx: &Context) -> Result<()> {
        self.save(ctx).await.map(|_| ())
    }
}
