use crate::domain::error::SqlCacheError;
use crate::domain::model::{Query, QueryOutput, QueryValue};
use async_trait::async_trait;

/// Capability to open connections to the underlying database.
///
/// This trait is the only seam between the cache/facade core and a concrete
/// driver. Implementations can be swapped without changing the calling code
/// (the shipped one wraps SQLite, tests use an in-memory fake).
#[async_trait]
pub trait StatementExecutor: Send + Sync {
    /// Acquires a fresh connection. The handle owns it; dropping the handle
    /// releases the connection.
    async fn open(&self) -> Result<Box<dyn ConnectionHandle>, SqlCacheError>;
}

/// An open connection, optionally carrying an explicit transaction.
///
/// `execute` runs a statement on this connection; between `begin` and
/// `commit`/`rollback` every statement joins the same transaction, which is
/// what lets callbacks issue nested statements atomically with their parent
/// batch.
#[async_trait]
pub trait ConnectionHandle: Send {
    async fn execute(&mut self, query: &Query) -> Result<QueryValue, SqlCacheError>;

    async fn begin(&mut self) -> Result<(), SqlCacheError>;

    async fn commit(&mut self) -> Result<(), SqlCacheError>;

    async fn rollback(&mut self) -> Result<(), SqlCacheError>;
}

/// Completion callback attached to a [`Query`].
///
/// The handle is the connection the query ran on; inside a batch it shares
/// the batch's transaction, so nested statements issued through it are
/// atomic with their parent. It is `None` when the result came from the
/// cache outside any transaction. A returned error aborts (and in a batch,
/// rolls back) the execution that fired the callback.
#[async_trait]
pub trait QueryCallback: Send + Sync {
    async fn on_complete(
        &self,
        output: &QueryOutput,
        handle: Option<&mut dyn ConnectionHandle>,
    ) -> anyhow::Result<()>;
}

/// Adapts a plain closure into a [`QueryCallback`] for observers that do not
/// need the connection.
pub struct FnCallback<F>(pub F);

#[async_trait]
impl<F> QueryCallback for FnCallback<F>
where
    F: Fn(&QueryOutput) -> anyhow::Result<()> + Send + Sync,
{
    async fn on_complete(
        &self,
        output: &QueryOutput,
        _handle: Option<&mut dyn ConnectionHandle>,
    ) -> anyhow::Result<()> {
        (self.0)(output)
    }
}
