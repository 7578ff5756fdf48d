// ============================================================================
// Executor
// ============================================================================
//
// Runs a built statement through the hook chain and the driver, inside the
// caller's context, and reclassifies storage failures. Raw driver errors
// never escape this module.
//
// ============================================================================

use crate::config::SessionConfig;
use crate::context::Context;
use crate::core::{ConstraintKind, OrmError, Result};
use crate::driver::{Capabilities, Driver, DriverError, DriverResult, DriverTx, ExecResult, Rows};
use crate::hooks::{HookContext, Hooks, Next, Outcome, Terminal};
use crate::mutation::Op;
use crate::spec::{QuerySpec, Statement};
use async_trait::async_trait;
use tracing::{Instrument, Level, event, info_span};

/// Where statements go: the session's driver or an open transaction.
#[derive(Clone, Copy)]
pub(crate) enum Target<'a> {
    Driver(&'a dyn Driver),
    Tx(&'a dyn DriverTx),
}

impl Target<'_> {
    async fn execute(&self, statement: &Statement) -> DriverResult<ExecResult> {
        match self {
            Target::Driver(driver) => driver.execute(statement).await,
            Target::Tx(tx) => tx.execute(statement).await,
        }
    }

    async fn query(&self, query: &QuerySpec) -> DriverResult<Rows> {
        match self {
            Target::Driver(driver) => driver.query(query).await,
            Target::Tx(tx) => tx.query(query).await,
        }
    }
}

/// Execution handle borrowed from a session or transaction.
#[derive(Clone, Copy)]
pub struct Executor<'a> {
    target: Target<'a>,
    backend: &'a str,
    capabilities: Capabilities,
    config: &'a SessionConfig,
    hooks: &'a Hooks,
}

impl<'a> Executor<'a> {
    pub(crate) fn new(
        target: Target<'a>,
        backend: &'a str,
        capabilities: Capabilities,
        config: &'a SessionConfig,
        hooks: &'a Hooks,
    ) -> Self {
        Self {
            target,
            backend,
            capabilities,
            config,
            hooks,
        }
    }

    pub fn backend(&self) -> &str {
        self.backend
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn config(&self) -> &SessionConfig {
        self.config
    }

    /// Applies the session's statement timeout on top of the caller's
    /// deadline.
    fn scoped(&self, ctx: &Context) -> Context {
        match self.config.statement_timeout {
            Some(timeout) => ctx.clone().with_timeout(timeout),
            None => ctx.clone(),
        }
    }

    /// Runs a mutation statement through hooks and driver.
    pub(crate) async fn run(
        &self,
        ctx: &Context,
        entity: &'static str,
        op: Op,
        statement: Statement,
    ) -> Result<Outcome> {
        ctx.check()?;
        let ctx = self.scoped(ctx);

        let span = info_span!(
            "meterstore.mutation",
            entity = entity,
            op = %op,
            statements = statement.len(),
            backend = self.backend
        );

        let hook_ctx = HookContext::new(entity, op, statement);
        let chain = self.hooks.chain(entity);
        let terminal = DriverCall { executor: self };

        let result = ctx
            .run(Next::new(&chain, &terminal).run(&hook_ctx))
            .instrument(span.clone())
            .await;

        let _enter = span.enter();
        match &result {
            Ok(outcome) => event!(Level::DEBUG, affected = outcome.affected, "mutation done"),
            Err(err) => event!(Level::DEBUG, error = %err, "mutation rejected"),
        }
        result
    }

    pub(crate) async fn query(&self, ctx: &Context, query: &QuerySpec) -> Result<Rows> {
        ctx.check()?;
        let ctx = self.scoped(ctx);
        let span = info_span!("meterstore.query", entity = query.entity, table = query.table);

        ctx.run(async {
            if self.config.log_statements {
                event!(Level::DEBUG, query = ?query, "query");
            }
            self.target
                .query(query)
                .await
                .map_err(|e| map_driver_error(self.backend, e))
        })
        .instrument(span)
        .await
    }
}

struct DriverCall<'a, 'e> {
    executor: &'e Executor<'a>,
}

#[async_trait]
impl Terminal for DriverCall<'_, '_> {
    async fn run(&self, ctx: &HookContext) -> Result<Outcome> {
        let executor = self.executor;
        if executor.config.log_statements {
            event!(Level::DEBUG, statement = ?ctx.statement(), "statement");
        }
        executor
            .target
            .execute(ctx.statement())
            .await
            .map(Outcome::from)
            .map_err(|e| map_driver_error(executor.backend, e))
    }
}

/// Maps a storage failure onto the public error taxonomy.
pub(crate) fn map_driver_error(backend: &str, error: DriverError) -> OrmError {
    match error {
        DriverError::UniqueViolation(message) => OrmError::ConstraintViolation {
            kind: ConstraintKind::Unique,
            message,
        },
        DriverError::ForeignKeyViolation(message) => OrmError::ConstraintViolation {
            kind: ConstraintKind::ForeignKey,
            message,
        },
        DriverError::NotNullViolation(message) => OrmError::ConstraintViolation {
            kind: ConstraintKind::NotNull,
            message,
        },
        DriverError::Unsupported(operation) => OrmError::Capability {
            backend: backend.to_string(),
            operation,
        },
        DriverError::NotFound { entity, id } => OrmError::NotFound { entity, id },
        DriverError::TransactionClosed => OrmError::Transaction(error.to_string()),
        other => OrmError::Driver(other.to_string()),
    }
}
