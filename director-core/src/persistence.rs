//! Transaction abstraction used by the operation directives.
//!
//! Directives only need begin/commit/rollback. Repositories that actually
//! talk to SQLite recover the concrete [`SqliteTx`] from the request context.

use crate::context::RequestContext;
use crate::error::{OperationError, Result};
use async_trait::async_trait;
use sqlx::{Sqlite, SqliteConnection, SqlitePool, Transaction};
use std::any::Any;
use std::sync::Arc;
use tokio::sync::{MappedMutexGuard, Mutex, MutexGuard};

/// A unit of work. Finishing it twice is an error for `commit` and a no-op
/// for `rollback`.
#[async_trait]
pub trait PersistenceTx: Send + Sync {
    async fn commit(&self) -> Result<()>;
    async fn rollback(&self) -> Result<()>;
    fn as_any(&self) -> &dyn Any;
}

/// Opens transactions.
#[async_trait]
pub trait Transactioner: Send + Sync {
    async fn begin(&self) -> Result<Arc<dyn PersistenceTx>>;
}

#[derive(Clone)]
pub struct SqliteTransactioner {
    pool: SqlitePool,
}

impl SqliteTransactioner {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl Transactioner for SqliteTransactioner {
    async fn begin(&self) -> Result<Arc<dyn PersistenceTx>> {
        let tx = self.pool.begin().await?;
        Ok(Arc::new(SqliteTx::new(tx)))
    }
}

pub struct SqliteTx {
    inner: Mutex<Option<Transaction<'static, Sqlite>>>,
}

impl SqliteTx {
    pub fn new(tx: Transaction<'static, Sqlite>) -> Self {
        Self {
            inner: Mutex::new(Some(tx)),
        }
    }

    /// Locks the underlying connection for the duration of one statement.
    pub async fn connection(&self) -> Result<MappedMutexGuard<'_, SqliteConnection>> {
        let guard = self.inner.lock().await;
        MutexGuard::try_map(guard, |slot| slot.as_mut().map(|tx| &mut **tx))
            .map_err(|_| OperationError::internal("transaction already finished"))
    }
}

#[async_trait]
impl PersistenceTx for SqliteTx {
    async fn commit(&self) -> Result<()> {
        let tx = self
            .inner
            .lock()
            .await
            .take()
            .ok_or_else(|| OperationError::internal("transaction already finished"))?;
        tx.commit().await?;
        Ok(())
    }

    async fn rollback(&self) -> Result<()> {
        let tx = self.inner.lock().await.take();
        if let Some(tx) = tx {
            tx.rollback().await?;
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// The SQLite transaction carried by `ctx`.
pub fn sqlite_tx(ctx: &RequestContext) -> Result<&SqliteTx> {
    ctx.transaction()?
        .as_any()
        .downcast_ref::<SqliteTx>()
        .ok_or_else(|| OperationError::internal("request transaction is not a SQLite transaction"))
}

/// Rolls back `tx`, logging instead of failing. Used on error paths where the
/// original error is the one worth returning.
pub async fn rollback_unless_committed(tx: &Arc<dyn PersistenceTx>) {
    if let Err(e) = tx.rollback().await {
        tracing::warn!(error = %e, "Failed to roll back transaction");
    }
}
