//! Commit step shared by the SeaORM backends.
//!
//! A write is staged inside [`RequestContext::run`], so cancellation drops the
//! open transaction and rolls it back. The commit itself happens outside that
//! race: once COMMIT is sent the call runs to completion, and a cancelled
//! result always means nothing was written.

use std::future::Future;

use sea_orm::{DatabaseTransaction, TransactionTrait};

use crate::context::RequestContext;
use crate::errors::StoreResult;

/// A transaction that has done all of its work but not committed yet, with
/// the value to return once it has.
pub(crate) struct Staged<T> {
    txn: DatabaseTransaction,
    value: T,
}

impl<T> Staged<T> {
    pub(crate) fn new(txn: DatabaseTransaction, value: T) -> Self { Self { txn, value } }

    /// Last cancellation check, then commit. Returning early drops the
    /// transaction, which rolls it back.
    pub(crate) async fn commit(self, ctx: &RequestContext) -> StoreResult<T> {
        ctx.check()?;
        self.txn.commit().await?;
        Ok(self.value)
    }
}

/// Stage a write under `ctx` and commit it.
pub(crate) async fn write<F, T>(ctx: &RequestContext, stage: F) -> StoreResult<T>
where
    F: Future<Output = StoreResult<Staged<T>>>,
{
    ctx.run(stage).await?.commit(ctx).await
}
