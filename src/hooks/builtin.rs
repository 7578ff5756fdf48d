use super::{Hook, HookContext, Next, Outcome};
use crate::core::Result;
use crate::mutation::Op;
use async_trait::async_trait;
use std::time::Instant;
use tracing::{Level, event};

/// Emits one structured event per mutation with its size, outcome and
/// latency.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogHook;

#[async_trait]
impl Hook for LogHook {
    fn name(&self) -> &str {
        "log"
    }

    async fn handle(&self, ctx: &HookContext, next: Next<'_>) -> Result<Outcome> {
        let started = Instant::now();
        let result = next.run(ctx).await;
        let elapsed_us = started.elapsed().as_micros() as u64;

        match &result {
            Ok(outcome) => event!(
                Level::INFO,
                entity = ctx.entity(),
                op = %ctx.op(),
                statements = ctx.size(),
                affected = outcome.affected,
                elapsed_us,
                "mutation applied"
            ),
            Err(err) => event!(
                Level::WARN,
                entity = ctx.entity(),
                op = %ctx.op(),
                statements = ctx.size(),
                error = %err,
                elapsed_us,
                "mutation failed"
            ),
        }
        result
    }
}

/// Applies the wrapped hook only to the listed operations.
pub struct OpFilter<H> {
    ops: Vec<Op>,
    inner: H,
}

impl<H: Hook> OpFilter<H> {
    pub fn new(inner: H, ops: impl IntoIterator<Item = Op>) -> Self {
        Self {
            ops: ops.into_iter().collect(),
            inner,
        }
    }
}

#[async_trait]
impl<H: Hook> Hook for OpFilter<H> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn handle(&self, ctx: &HookContext, next: Next<'_>) -> Result<Outcome> {
        if self.ops.contains(&ctx.op()) {
            self.inner.handle(ctx, next).await
        } else {
            next.run(ctx).await
        }
    }
}
