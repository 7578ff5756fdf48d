// ============================================================================
// Session & Transaction
// ============================================================================

use crate::config::SessionConfig;
use crate::context::Context;
use crate::core::{OrmError, Result, Value};
use crate::driver::{Driver, DriverTx};
use crate::executor::{Executor, Target, map_driver_error};
use crate::hooks::{Hook, Hooks};
use crate::ops::{Create, CreateBulk, Delete, DeleteOne, Update, UpdateBulk, UpdateOne};
use crate::query::Query;
use crate::schema::EntitySchema;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Anything statements can be executed against.
pub trait Conn: Send + Sync {
    fn executor(&self) -> Executor<'_>;

    fn create(&self, schema: &'static EntitySchema) -> Create<'_> {
        Create::new(self.executor(), schema)
    }

    fn create_bulk<'a>(&'a self, items: Vec<Create<'a>>) -> CreateBulk<'a> {
        CreateBulk::new(self.executor(), items)
    }

    fn update(&self, schema: &'static EntitySchema) -> Update<'_> {
        Update::new(self.executor(), schema)
    }

    fn update_one(&self, schema: &'static EntitySchema, id: impl Into<Value>) -> UpdateOne<'_> {
        UpdateOne::new(self.executor(), schema, id)
    }

    fn update_bulk<'a>(&'a self, items: Vec<UpdateOne<'a>>) -> UpdateBulk<'a> {
        UpdateBulk::new(self.executor(), items)
    }

    fn delete(&self, schema: &'static EntitySchema) -> Delete<'_> {
        Delete::new(self.executor(), schema)
    }

    fn delete_one(&self, schema: &'static EntitySchema, id: impl Into<Value>) -> DeleteOne<'_> {
        DeleteOne::new(self.executor(), schema, id)
    }

    fn query(&self, schema: &'static EntitySchema) -> Query<'_> {
        Query::new(self.executor(), schema)
    }
}

/// Non-transactional handle over a driver. Cheap to clone.
#[derive(Clone)]
pub struct Session {
    driver: Arc<dyn Driver>,
    config: Arc<SessionConfig>,
    hooks: Arc<Hooks>,
}

impl Session {
    pub fn new(driver: impl Driver + 'static) -> Self {
        Self::from_arc(Arc::new(driver))
    }

    pub fn from_arc(driver: Arc<dyn Driver>) -> Self {
        Self {
            driver,
            config: Arc::new(SessionConfig::default()),
            hooks: Arc::new(Hooks::new()),
        }
    }

    pub fn with_config(mut self, config: SessionConfig) -> Result<Self> {
        config.validate()?;
        self.config = Arc::new(config);
        Ok(self)
    }

    /// Registers a hook for every entity.
    pub fn with_hook(mut self, hook: impl Hook + 'static) -> Self {
        Arc::make_mut(&mut self.hooks).register(Arc::new(hook));
        self
    }

    /// Registers a hook for one entity. Runs after all global hooks.
    pub fn with_entity_hook(mut self, entity: &'static str, hook: impl Hook + 'static) -> Self {
        Arc::make_mut(&mut self.hooks).register_for(entity, Arc::new(hook));
        self
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn driver(&self) -> &Arc<dyn Driver> {
        &self.driver
    }

    pub async fn begin(&self, ctx: &Context) -> Result<Transaction> {
        let tx = ctx
            .run(async {
                self.driver
                    .begin()
                    .await
                    .map_err(|e| map_driver_error(self.driver.backend(), e))
            })
            .await?;
        Ok(Transaction {
            session: self.clone(),
            tx,
            closed: AtomicBool::new(false),
        })
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("backend", &self.driver.backend())
            .field("config", &self.config)
            .field("hooks", &self.hooks.len())
            .finish()
    }
}

impl Conn for Session {
    fn executor(&self) -> Executor<'_> {
        Executor::new(
            Target::Driver(self.driver.as_ref()),
            self.driver.backend(),
            self.driver.capabilities(),
            &self.config,
            &self.hooks,
        )
    }
}

/// A session bound to one driver transaction.
pub struct Transaction {
    session: Session,
    tx: Box<dyn DriverTx>,
    closed: AtomicBool,
}

impl Transaction {
    /// Commits the transaction. A failed commit leaves it open so the caller
    /// can still roll back.
    pub async fn commit(&self) -> Result<()> {
        self.ensure_open()?;
        self.tx
            .commit()
            .await
            .map_err(|e| OrmError::Transaction(format!("commit failed: {}", e)))?;
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    pub async fn rollback(&self) -> Result<()> {
        self.ensure_open()?;
        let result = self
            .tx
            .rollback()
            .await
            .map_err(|e| OrmError::Transaction(format!("rollback failed: {}", e)));
        self.closed.store(true, Ordering::SeqCst);
        result
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Returns the non-transactional session. Fails while the transaction is
    /// still open; the transaction is then dropped and its driver rolls it
    /// back.
    pub fn unwrap(self) -> Result<Session> {
        if !self.is_closed() {
            log::warn!("transaction unwrapped before commit or rollback, discarding it");
            return Err(OrmError::Transaction(
                "transaction must be committed or rolled back first".into(),
            ));
        }
        Ok(self.session)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(OrmError::Transaction("transaction is already closed".into()));
        }
        Ok(())
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("session", &self.session)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Conn for Transaction {
    fn executor(&self) -> Executor<'_> {
        let driver = self.session.driver.as_ref();
        Executor::new(
            Target::Tx(self.tx.as_ref()),
            driver.backend(),
            driver.capabilities(),
            &self.session.config,
            &self.session.hooks,
        )
    }
}
