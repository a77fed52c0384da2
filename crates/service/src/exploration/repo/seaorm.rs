use async_trait::async_trait;
use chrono::Utc;
use models::{exploration as exploration_row, id_sequence};
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, Set, TransactionTrait};
use tracing::{debug, info, instrument};

use crate::clock;
use crate::context::RequestContext;
use crate::errors::{StoreError, StoreResult};
use crate::exploration::domain::Exploration;
use crate::exploration::repository::ExplorationStore;
use crate::ids::{ExplorationId, UserId};
use crate::storage::transaction::{self, Staged};

#[derive(Debug, Clone)]
pub struct SeaOrmExplorationStore {
    db: DatabaseConnection,
}

impl SeaOrmExplorationStore {
    pub fn new(db: DatabaseConnection) -> Self { Self { db } }

    async fn insert(&self, exploration: Exploration) -> StoreResult<Staged<Exploration>> {
        let txn = self.db.begin().await?;
        let id = id_sequence::next_id(&txn, id_sequence::EXPLORATIONS).await?;
        let now = clock::now();
        let row = exploration_row::ActiveModel {
            id: Set(id),
            name: Set(exploration.name.clone()),
            user_id: Set(exploration.user_id.get()),
            data: Set(exploration.data.clone()),
            created_at: Set(now.fixed_offset()),
            updated_at: Set(now.fixed_offset()),
        };
        exploration_row::Entity::insert(row).exec_without_returning(&txn).await?;
        Ok(Staged::new(txn, Exploration { id: ExplorationId(id), created_at: now, updated_at: now, ..exploration }))
    }

    async fn remove(&self, id: ExplorationId) -> StoreResult<Staged<()>> {
        let txn = self.db.begin().await?;
        let res = exploration_row::Entity::delete_by_id(id.get()).exec(&txn).await?;
        if res.rows_affected == 0 {
            return Err(StoreError::not_found("exploration", id));
        }
        Ok(Staged::new(txn, ()))
    }

    async fn overwrite(&self, exploration: &Exploration) -> StoreResult<Staged<Exploration>> {
        let txn = self.db.begin().await?;
        let existing = exploration_row::Entity::find_by_id(exploration.id.get())
            .one(&txn)
            .await?
            .ok_or_else(|| StoreError::not_found("exploration", exploration.id))?;
        let updated_at = clock::after(existing.updated_at.with_timezone(&Utc));
        let mut row = exploration_row::ActiveModel::from(existing);
        row.name = Set(exploration.name.clone());
        row.data = Set(exploration.data.clone());
        row.updated_at = Set(updated_at.fixed_offset());
        let saved = from_row(row.update(&txn).await?);
        Ok(Staged::new(txn, saved))
    }

    async fn by_id(&self, id: ExplorationId) -> StoreResult<Exploration> {
        exploration_row::Entity::find_by_id(id.get())
            .one(&self.db)
            .await?
            .map(from_row)
            .ok_or_else(|| StoreError::not_found("exploration", id))
    }
}

fn from_row(m: exploration_row::Model) -> Exploration {
    Exploration {
        id: ExplorationId(m.id),
        name: m.name,
        user_id: UserId(m.user_id),
        data: m.data,
        created_at: m.created_at.with_timezone(&Utc),
        updated_at: m.updated_at.with_timezone(&Utc),
    }
}

#[async_trait]
impl ExplorationStore for SeaOrmExplorationStore {
    #[instrument(skip(self, ctx))]
    async fn query(&self, ctx: &RequestContext, user_id: UserId) -> StoreResult<Vec<Exploration>> {
        let rows = ctx
            .run(async { exploration_row::list_by_user(&self.db, user_id.get()).await.map_err(StoreError::from) })
            .await?;
        debug!(count = rows.len(), "explorations queried");
        Ok(rows.into_iter().map(from_row).collect())
    }

    #[instrument(skip_all, fields(user_id = %exploration.user_id))]
    async fn add(&self, ctx: &RequestContext, exploration: Exploration) -> StoreResult<Exploration> {
        exploration.validate_owner()?;
        let created = transaction::write(ctx, self.insert(exploration)).await?;
        info!(exploration_id = %created.id, "exploration added");
        Ok(created)
    }

    #[instrument(skip_all, fields(exploration_id = %exploration.id))]
    async fn delete(&self, ctx: &RequestContext, exploration: &Exploration) -> StoreResult<()> {
        transaction::write(ctx, self.remove(exploration.id)).await?;
        info!("exploration deleted");
        Ok(())
    }

    #[instrument(skip(self, ctx))]
    async fn get(&self, ctx: &RequestContext, id: ExplorationId) -> StoreResult<Exploration> {
        ctx.run(self.by_id(id)).await
    }

    #[instrument(skip_all, fields(exploration_id = %exploration.id))]
    async fn update(&self, ctx: &RequestContext, exploration: &Exploration) -> StoreResult<Exploration> {
        let updated = transaction::write(ctx, self.overwrite(exploration)).await?;
        info!("exploration updated");
        Ok(updated)
    }
}
