//! Query engine seam.
//!
//! The data-access layer never talks to a store directly. It drives a
//! [`QueryEngine`], which owns one schema node, opens transactions and runs
//! the find/insert/update/remove primitives against a transaction handle.

pub mod memory;

use crate::core::{Result, Row};
use crate::query::{
    CountQuery, FindQuery, InsertQuery, RemoveQuery, RemoveWithFilterQuery, UpdateQuery,
    UpdateWithFilterQuery,
};
use crate::schema::SchemaNode;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

pub use memory::{MemoryEngine, MemoryStore, MemoryTx};

/// Primitive operations over one schema node.
///
/// Reads accept an optional transaction; without one they observe committed
/// state. Writes always run against a transaction.
#[async_trait]
pub trait QueryEngine: Send + Sync + 'static {
    /// Transaction handle. Cloning must yield a handle to the same transaction.
    type Tx: Clone + Send + Sync + 'static;

    /// Caller identity threaded through every request.
    type Auth: Clone + Send + Sync + 'static;

    /// Resolves the live schema node this engine serves.
    async fn schema(&self) -> Result<Arc<SchemaNode>>;

    async fn begin(&self) -> Result<Self::Tx>;

    async fn commit(&self, tx: Self::Tx) -> Result<()>;

    async fn rollback(&self, tx: Self::Tx) -> Result<()>;

    async fn find_all(
        &self,
        query: FindQuery<Self::Auth>,
        tx: Option<&Self::Tx>,
    ) -> Result<Vec<Row>>;

    async fn find_count(&self, query: CountQuery<Self::Auth>, tx: Option<&Self::Tx>)
    -> Result<u64>;

    /// Inserts every item and returns the stored rows, including generated keys.
    async fn insert_many(&self, query: InsertQuery<Self::Auth>, tx: &Self::Tx)
    -> Result<Vec<Row>>;

    /// Returns the number of rows touched.
    async fn update_many(&self, query: UpdateQuery<Self::Auth>, tx: &Self::Tx) -> Result<u64>;

    async fn update_with_filter(
        &self,
        query: UpdateWithFilterQuery<Self::Auth>,
        tx: &Self::Tx,
    ) -> Result<u64>;

    /// Returns the number of rows removed.
    async fn remove_many(&self, query: RemoveQuery<Self::Auth>, tx: &Self::Tx) -> Result<u64>;

    async fn remove_with_filter(
        &self,
        query: RemoveWithFilterQuery<Self::Auth>,
        tx: &Self::Tx,
    ) -> Result<u64>;
}

/// Runs `work` inside a transaction scope.
///
/// A supplied transaction is reused as is and left open for its owner.
/// Otherwise a new one is opened, committed when `work` succeeds and rolled
/// back when it fails.
pub async fn with_transaction<E, T, F, Fut>(engine: &E, tx: Option<&E::Tx>, work: F) -> Result<T>
where
    E: QueryEngine + ?Sized,
    F: FnOnce(E::Tx) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    if let Some(tx) = tx {
        return work(tx.clone()).await;
    }

    let tx = engine.begin().await?;
    match work(tx.clone()).await {
        Ok(value) => {
            engine.commit(tx).await?;
            Ok(value)
        }
        Err(err) => {
            debug!(error = %err, "rolling back transaction");
            if let Err(rollback_err) = engine.rollback(tx).await {
                warn!(error = %rollback_err, "transaction rollback failed");
            }
            Err(err)
        }
    }
}
