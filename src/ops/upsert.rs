use super::Create;
use crate::codec;
use crate::context::Context;
use crate::core::{OrmError, Result, Value};
use crate::executor::Executor;
use crate::mutation::Op;
use crate::schema::{EntitySchema, IdKind};
use crate::spec::conflict::Resolver;
use crate::spec::{ConflictPolicy, ConflictTarget, CreateSpec, OnConflict, Statement};

/// Insert with conflict resolution. Defaults to overwriting the conflicting
/// row with the attempted values.
pub struct Upsert<'c> {
    create: Create<'c>,
    on_conflict: OnConflict,
}

impl<'c> Upsert<'c> {
    pub(crate) fn new(create: Create<'c>, target: ConflictTarget) -> Self {
        Self {
            create,
            on_conflict: OnConflict {
                target,
                policy: ConflictPolicy::UpdateNewValues { ignore: Vec::new() },
            },
        }
    }

    /// Overwrite every written column except the key and immutable fields.
    pub fn update_new_values(mut self) -> Self {
        self.on_conflict.policy = ConflictPolicy::UpdateNewValues { ignore: Vec::new() };
        self
    }

    /// Like `update_new_values`, leaving the named fields as stored.
    pub fn ignore_columns<S: Into<String>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
        self.on_conflict.policy = merge_ignored(self.on_conflict.policy, fields);
        self
    }

    /// Keep the stored row untouched; `id` still reports it.
    pub fn ignore(mut self) -> Self {
        self.on_conflict.policy = ConflictPolicy::Ignore;
        self
    }

    pub fn do_nothing(mut self) -> Self {
        self.on_conflict.policy = ConflictPolicy::DoNothing;
        self
    }

    /// Per-column resolution: `r.new("name").existing("created_by").value("version", 2)`.
    pub fn resolve(mut self, f: impl FnOnce(Resolver) -> Resolver) -> Self {
        self.on_conflict.policy = ConflictPolicy::Custom(f(Resolver::default()).into_rules());
        self
    }

    fn prepare(self) -> Result<(Executor<'c>, &'static EntitySchema, CreateSpec)> {
        let exec = self.create.executor();
        let schema = self.create.schema();
        if !exec.capabilities().upsert {
            return Err(OrmError::Capability {
                backend: exec.backend().to_string(),
                operation: "insert with conflict resolution".into(),
            });
        }
        let spec = self.create.into_spec(Some(&self.on_conflict))?;
        Ok((exec, schema, spec))
    }

    pub async fn exec(self, ctx: &Context) -> Result<()> {
        let (exec, schema, spec) = self.prepare()?;
        exec.run(ctx, schema.name, Op::Create, Statement::Create(spec))
            .await?;
        Ok(())
    }

    /// Id of the inserted or conflicting row. Text ids can only be read back
    /// from backends with RETURNING.
    pub async fn id(self, ctx: &Context) -> Result<Value> {
        let schema = self.create.schema();
        let exec = self.create.executor();
        if schema.id.kind == IdKind::Text && !exec.capabilities().returning {
            return Err(OrmError::Capability {
                backend: exec.backend().to_string(),
                operation: format!("upsert id of {} without RETURNING", schema.name),
            });
        }

        let (exec, schema, spec) = self.prepare()?;
        let outcome = exec
            .run(ctx, schema.name, Op::Create, Statement::Create(spec))
            .await?;

        match outcome.ids.first() {
            Some(Some(id)) => {
                codec::decode(schema.id.column, schema.id.kind.field_type(), id)
            }
            _ => Err(OrmError::not_found(schema.name, "conflicting row, insert skipped")),
        }
    }
}

pub(crate) fn merge_ignored<S: Into<String>>(
    policy: ConflictPolicy,
    fields: impl IntoIterator<Item = S>,
) -> ConflictPolicy {
    let mut ignore = match policy {
        ConflictPolicy::UpdateNewValues { ignore } => ignore,
        _ => Vec::new(),
    };
    ignore.extend(fields.into_iter().map(Into::into));
    ConflictPolicy::UpdateNewValues { ignore }
}
