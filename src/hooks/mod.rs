// ============================================================================
// Hook Chain
// ============================================================================
//
// Around-interceptors on mutation execution. Each hook receives the
// statement about to run and a `Next` continuation; it may call `next.run`
// (optionally inspecting or rewriting the outcome) or return an outcome of
// its own without touching the driver.
//
// Global hooks run before entity hooks, each group in registration order.
//
// ============================================================================

mod builtin;

pub use builtin::{LogHook, OpFilter};

use crate::core::{Result, SqlValue};
use crate::driver::ExecResult;
use crate::mutation::Op;
use crate::spec::Statement;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// What the hook chain is about to execute.
#[derive(Debug, Clone)]
pub struct HookContext {
    entity: &'static str,
    op: Op,
    statement: Statement,
}

impl HookContext {
    pub(crate) fn new(entity: &'static str, op: Op, statement: Statement) -> Self {
        Self {
            entity,
            op,
            statement,
        }
    }

    pub fn entity(&self) -> &'static str {
        self.entity
    }

    pub fn op(&self) -> Op {
        self.op
    }

    pub fn statement(&self) -> &Statement {
        &self.statement
    }

    /// Entity-level statements in this execution, 1 unless bulk.
    pub fn size(&self) -> usize {
        self.statement.len()
    }
}

/// Result of one execution as seen by hooks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Outcome {
    pub affected: u64,
    /// Ids of created rows in statement order; `None` for skipped inserts.
    pub ids: Vec<Option<SqlValue>>,
}

impl From<ExecResult> for Outcome {
    fn from(result: ExecResult) -> Self {
        Self {
            affected: result.affected,
            ids: result.ids,
        }
    }
}

#[async_trait]
pub trait Hook: Send + Sync {
    fn name(&self) -> &str {
        "hook"
    }

    async fn handle(&self, ctx: &HookContext, next: Next<'_>) -> Result<Outcome>;
}

/// Innermost step of the chain: the driver call.
#[async_trait]
pub(crate) trait Terminal: Send + Sync {
    async fn run(&self, ctx: &HookContext) -> Result<Outcome>;
}

/// The rest of the chain after the current hook.
pub struct Next<'a> {
    hooks: &'a [Arc<dyn Hook>],
    terminal: &'a dyn Terminal,
}

impl<'a> Next<'a> {
    pub(crate) fn new(hooks: &'a [Arc<dyn Hook>], terminal: &'a dyn Terminal) -> Self {
        Self { hooks, terminal }
    }

    pub async fn run(self, ctx: &HookContext) -> Result<Outcome> {
        match self.hooks.split_first() {
            Some((hook, rest)) => {
                hook.handle(
                    ctx,
                    Next {
                        hooks: rest,
                        terminal: self.terminal,
                    },
                )
                .await
            }
            None => self.terminal.run(ctx).await,
        }
    }
}

/// Registered hooks of a session.
#[derive(Clone, Default)]
pub struct Hooks {
    global: Vec<Arc<dyn Hook>>,
    entity: HashMap<&'static str, Vec<Arc<dyn Hook>>>,
}

impl Hooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, hook: Arc<dyn Hook>) {
        self.global.push(hook);
    }

    pub fn register_for(&mut self, entity: &'static str, hook: Arc<dyn Hook>) {
        self.entity.entry(entity).or_default().push(hook);
    }

    /// Hooks applying to `entity`, outermost first.
    pub fn chain(&self, entity: &str) -> Vec<Arc<dyn Hook>> {
        let mut chain = self.global.clone();
        if let Some(hooks) = self.entity.get(entity) {
            chain.extend(hooks.iter().cloned());
        }
        chain
    }

    pub fn len(&self) -> usize {
        self.global.len() + self.entity.values().map(Vec::len).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
