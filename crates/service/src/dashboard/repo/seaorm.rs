use async_trait::async_trait;
use models::{dashboard as dashboard_row, id_sequence};
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, Set, TransactionTrait};
use tracing::{debug, info, instrument};

use crate::clock;
use crate::context::RequestContext;
use crate::dashboard::domain::{Cell, Dashboard};
use crate::dashboard::repository::DashboardStore;
use crate::errors::{StoreError, StoreResult};
use crate::ids::DashboardId;
use crate::storage::transaction::{self, Staged};

#[derive(Debug, Clone)]
pub struct SeaOrmDashboardStore {
    db: DatabaseConnection,
}

impl SeaOrmDashboardStore {
    pub fn new(db: DatabaseConnection) -> Self { Self { db } }

    async fn insert(&self, dashboard: Dashboard) -> StoreResult<Staged<Dashboard>> {
        let cells = serde_json::to_string(&dashboard.cells)?;
        let txn = self.db.begin().await?;
        let id = id_sequence::next_id(&txn, id_sequence::DASHBOARDS).await?;
        let now = clock::now().fixed_offset();
        let row = dashboard_row::ActiveModel { id: Set(id), cells: Set(cells), created_at: Set(now), updated_at: Set(now) };
        dashboard_row::Entity::insert(row).exec_without_returning(&txn).await?;
        Ok(Staged::new(txn, Dashboard { id: DashboardId(id), cells: dashboard.cells }))
    }

    async fn remove(&self, id: DashboardId) -> StoreResult<Staged<()>> {
        let txn = self.db.begin().await?;
        let res = dashboard_row::Entity::delete_by_id(id.get()).exec(&txn).await?;
        if res.rows_affected == 0 {
            return Err(StoreError::not_found("dashboard", id));
        }
        Ok(Staged::new(txn, ()))
    }

    async fn overwrite(&self, dashboard: &Dashboard) -> StoreResult<Staged<Dashboard>> {
        let cells = serde_json::to_string(&dashboard.cells)?;
        let txn = self.db.begin().await?;
        let existing = dashboard_row::Entity::find_by_id(dashboard.id.get())
            .one(&txn)
            .await?
            .ok_or_else(|| StoreError::not_found("dashboard", dashboard.id))?;
        let mut row = dashboard_row::ActiveModel::from(existing);
        row.cells = Set(cells);
        row.updated_at = Set(clock::now().fixed_offset());
        let saved = from_row(row.update(&txn).await?)?;
        Ok(Staged::new(txn, saved))
    }

    async fn by_id(&self, id: DashboardId) -> StoreResult<Dashboard> {
        let row = dashboard_row::Entity::find_by_id(id.get())
            .one(&self.db)
            .await?
            .ok_or_else(|| StoreError::not_found("dashboard", id))?;
        from_row(row)
    }

    async fn all(&self) -> StoreResult<Vec<Dashboard>> {
        dashboard_row::list(&self.db).await?.into_iter().map(from_row).collect()
    }
}

fn from_row(m: dashboard_row::Model) -> StoreResult<Dashboard> {
    let cells: Vec<Cell> = serde_json::from_str(&m.cells)?;
    Ok(Dashboard { id: DashboardId(m.id), cells })
}

#[async_trait]
impl DashboardStore for SeaOrmDashboardStore {
    #[instrument(skip_all, fields(cells = dashboard.cells.len()))]
    async fn add(&self, ctx: &RequestContext, dashboard: Dashboard) -> StoreResult<Dashboard> {
        let created = transaction::write(ctx, self.insert(dashboard)).await?;
        info!(dashboard_id = %created.id, "dashboard added");
        Ok(created)
    }

    #[instrument(skip_all, fields(dashboard_id = %dashboard.id))]
    async fn delete(&self, ctx: &RequestContext, dashboard: &Dashboard) -> StoreResult<()> {
        transaction::write(ctx, self.remove(dashboard.id)).await?;
        info!("dashboard deleted");
        Ok(())
    }

    #[instrument(skip(self, ctx))]
    async fn get(&self, ctx: &RequestContext, id: DashboardId) -> StoreResult<Dashboard> {
        ctx.run(self.by_id(id)).await
    }

    #[instrument(skip_all, fields(dashboard_id = %dashboard.id, cells = dashboard.cells.len()))]
    async fn update(&self, ctx: &RequestContext, dashboard: &Dashboard) -> StoreResult<Dashboard> {
        let updated = transaction::write(ctx, self.overwrite(dashboard)).await?;
        info!("dashboard updated");
        Ok(updated)
    }

    #[instrument(skip_all)]
    async fn list(&self, ctx: &RequestContext) -> StoreResult<Vec<Dashboard>> {
        let all = ctx.run(self.all()).await?;
        debug!(count = all.len(), "dashboards listed");
        Ok(all)
    }
}
