use async_trait::async_trait;

use super::domain::Exploration;
use crate::context::RequestContext;
use crate::errors::StoreResult;
use crate::ids::{ExplorationId, UserId};

/// Saved explorations, partitioned by owner.
#[async_trait]
pub trait ExplorationStore: Send + Sync {
    /// Every exploration owned by `user_id`, oldest first (ties broken by ID).
    async fn query(&self, ctx: &RequestContext, user_id: UserId) -> StoreResult<Vec<Exploration>>;
    /// Store a new exploration. ID and both timestamps are assigned here.
    async fn add(&self, ctx: &RequestContext, exploration: Exploration) -> StoreResult<Exploration>;
    async fn delete(&self, ctx: &RequestContext, exploration: &Exploration) -> StoreResult<()>;
    async fn get(&self, ctx: &RequestContext, id: ExplorationId) -> StoreResult<Exploration>;
    /// Overwrite name and data and refresh `updated_at`. Owner and
    /// `created_at` are kept from the stored record.
    async fn update(&self, ctx: &RequestContext, exploration: &Exploration) -> StoreResult<Exploration>;
}
