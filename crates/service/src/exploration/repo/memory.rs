use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::clock;
use crate::context::RequestContext;
use crate::errors::{StoreError, StoreResult};
use crate::exploration::domain::Exploration;
use crate::exploration::repository::ExplorationStore;
use crate::ids::{ExplorationId, UserId};
use crate::storage::StateCell;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExplorationState {
    explorations: BTreeMap<ExplorationId, Exploration>,
    last_id: i64,
}

#[derive(Debug)]
pub struct MemoryExplorationStore {
    cell: StateCell<ExplorationState>,
}

impl MemoryExplorationStore {
    pub fn new() -> Self { Self { cell: StateCell::in_memory() } }

    pub async fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        Ok(Self { cell: StateCell::open(path).await? })
    }
}

impl Default for MemoryExplorationStore {
    fn default() -> Self { Self::new() }
}

#[async_trait]
impl ExplorationStore for MemoryExplorationStore {
    #[instrument(skip(self, ctx))]
    async fn query(&self, ctx: &RequestContext, user_id: UserId) -> StoreResult<Vec<Exploration>> {
        let mut found = self
            .cell
            .read(ctx, |s| Ok(s.explorations.values().filter(|e| e.user_id == user_id).cloned().collect::<Vec<_>>()))
            .await?;
        found.sort_by_key(|e| (e.created_at, e.id));
        debug!(count = found.len(), "explorations queried");
        Ok(found)
    }

    #[instrument(skip_all, fields(user_id = %exploration.user_id))]
    async fn add(&self, ctx: &RequestContext, exploration: Exploration) -> StoreResult<Exploration> {
        exploration.validate_owner()?;
        let created = self
            .cell
            .update(ctx, move |s| {
                s.last_id += 1;
                let now = clock::now();
                let stored = Exploration {
                    id: ExplorationId(s.last_id),
                    created_at: now,
                    updated_at: now,
                    ..exploration
                };
                s.explorations.insert(stored.id, stored.clone());
                Ok(stored)
            })
            .await?;
        info!(exploration_id = %created.id, "exploration added");
        Ok(created)
    }

    #[instrument(skip_all, fields(exploration_id = %exploration.id))]
    async fn delete(&self, ctx: &RequestContext, exploration: &Exploration) -> StoreResult<()> {
        let id = exploration.id;
        self.cell
            .update(ctx, move |s| {
                s.explorations.remove(&id).map(|_| ()).ok_or_else(|| StoreError::not_found("exploration", id))
            })
            .await?;
        info!("exploration deleted");
        Ok(())
    }

    #[instrument(skip(self, ctx))]
    async fn get(&self, ctx: &RequestContext, id: ExplorationId) -> StoreResult<Exploration> {
        self.cell
            .read(ctx, |s| s.explorations.get(&id).cloned().ok_or_else(|| StoreError::not_found("exploration", id)))
            .await
    }

    #[instrument(skip_all, fields(exploration_id = %exploration.id))]
    async fn update(&self, ctx: &RequestContext, exploration: &Exploration) -> StoreResult<Exploration> {
        let id = exploration.id;
        let name = exploration.name.clone();
        let data = exploration.data.clone();
        let updated = self
            .cell
            .update(ctx, move |s| {
                let stored = s.explorations.get_mut(&id).ok_or_else(|| StoreError::not_found("exploration", id))?;
                stored.name = name;
                stored.data = data;
                stored.updated_at = clock::after(stored.updated_at);
                Ok(stored.clone())
            })
            .await?;
        info!("exploration updated");
        Ok(updated)
    }
}
