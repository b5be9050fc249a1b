use crate::core::Result;
use async_trait::async_trait;

/// Lifecycle hooks around service writes. Every hook runs inside the write's
/// transaction; returning `Some` overrides the value flowing onward.
#[async_trait]
pub trait WriteHooks<M, A, Tx>: Send + Sync
where
    M: Send + Sync + 'static,
    A: Send + Sync + 'static,
    Tx: Send + Sync + 'static,
{
    /// May replace the item about to be inserted.
    async fn before_insert(&self, _item: &M, _auth: Option<&A>, _tx: &Tx) -> Result<Option<M>> {
        Ok(None)
    }

    /// May replace the value returned for an insert. `original` is the item
    /// the caller submitted.
    async fn after_insert(
        &self,
        _inserted: &M,
        _original: &M,
        _auth: Option<&A>,
        _tx: &Tx,
    ) -> Result<Option<M>> {
        Ok(None)
    }

    async fn before_update(&self, _item: &M, _auth: Option<&A>, _tx: &Tx) -> Result<Option<M>> {
        Ok(None)
    }

    async fn after_update(
        &self,
        _updated: &M,
        _original: &M,
        _auth: Option<&A>,
        _tx: &Tx,
    ) -> Result<Option<M>> {
        Ok(None)
    }

    /// Receives the full stored row about to be removed.
    async fn before_remove(
        &self,
        _existing: &M,
        _auth: Option<&A>,
        _tx: &Tx,
    ) -> Result<Option<M>> {
        Ok(None)
    }

    async fn after_remove(
        &self,
        _removed: bool,
        _existing: &M,
        _auth: Option<&A>,
        _tx: &Tx,
    ) -> Result<Option<bool>> {
        Ok(None)
    }
}

/// Hooks that never override anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHooks;

impl<M, A, Tx> WriteHooks<M, A, Tx> for NoHooks
where
    M: Send + Sync + 'static,
    A: Send + Sync + 'static,
    Tx: Send + Sync + 'static,
{
}
