use crate::core::{OrmError, Result};
use std::time::Duration;

/// Session-wide execution settings.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Default deadline applied to every statement.
    pub statement_timeout: Option<Duration>,

    /// Largest number of items accepted by one bulk operation.
    pub max_batch_size: usize,

    /// Hide soft-deleted rows from queries unless a query opts in.
    pub exclude_soft_deleted: bool,

    /// Emit every statement as a debug event.
    pub log_statements: bool,
}

impl SessionConfig {
    pub fn new() -> Self {
        Self {
            statement_timeout: None,
            max_batch_size: 1000,
            exclude_soft_deleted: true,
            log_statements: false,
        }
    }

    /// Set statement timeout
    pub fn statement_timeout(mut self, timeout: Duration) -> Self {
        self.statement_timeout = Some(timeout);
        self
    }

    /// Set maximum bulk size
    pub fn max_batch_size(mut self, max: usize) -> Self {
        self.max_batch_size = max;
        self
    }

    pub fn exclude_soft_deleted(mut self, exclude: bool) -> Self {
        self.exclude_soft_deleted = exclude;
        self
    }

    pub fn log_statements(mut self, enabled: bool) -> Self {
        self.log_statements = enabled;
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.max_batch_size == 0 {
            return Err(OrmError::Config("max_batch_size must be > 0".into()));
        }

        if let Some(timeout) = self.statement_timeout
            && timeout.is_zero()
        {
            return Err(OrmError::Config("statement_timeout must be > 0".into()));
        }

        Ok(())
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new()
    }
}
