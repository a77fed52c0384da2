use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::context::RequestContext;
use crate::dashboard::domain::{Cell, Dashboard};
use crate::dashboard::repository::DashboardStore;
use crate::errors::{StoreError, StoreResult};
use crate::ids::DashboardId;
use crate::storage::StateCell;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DashboardState {
    dashboards: BTreeMap<DashboardId, Vec<Cell>>,
    last_id: i64,
}

#[derive(Debug)]
pub struct MemoryDashboardStore {
    cell: StateCell<DashboardState>,
}

impl MemoryDashboardStore {
    pub fn new() -> Self { Self { cell: StateCell::in_memory() } }

    pub async fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        Ok(Self { cell: StateCell::open(path).await? })
    }
}

impl Default for MemoryDashboardStore {
    fn default() -> Self { Self::new() }
}

#[async_trait]
impl DashboardStore for MemoryDashboardStore {
    #[instrument(skip_all, fields(cells = dashboard.cells.len()))]
    async fn add(&self, ctx: &RequestContext, dashboard: Dashboard) -> StoreResult<Dashboard> {
        let created = self
            .cell
            .update(ctx, move |s| {
                s.last_id += 1;
                let id = DashboardId(s.last_id);
                s.dashboards.insert(id, dashboard.cells.clone());
                Ok(Dashboard { id, cells: dashboard.cells })
            })
            .await?;
        info!(dashboard_id = %created.id, "dashboard added");
        Ok(created)
    }

    #[instrument(skip_all, fields(dashboard_id = %dashboard.id))]
    async fn delete(&self, ctx: &RequestContext, dashboard: &Dashboard) -> StoreResult<()> {
        let id = dashboard.id;
        self.cell
            .update(ctx, move |s| {
                s.dashboards.remove(&id).map(|_| ()).ok_or_else(|| StoreError::not_found("dashboard", id))
            })
            .await?;
        info!("dashboard deleted");
        Ok(())
    }

    #[instrument(skip(self, ctx))]
    async fn get(&self, ctx: &RequestContext, id: DashboardId) -> StoreResult<Dashboard> {
        self.cell
            .read(ctx, |s| {
                s.dashboards
                    .get(&id)
                    .map(|cells| Dashboard { id, cells: cells.clone() })
                    .ok_or_else(|| StoreError::not_found("dashboard", id))
            })
            .await
    }

    #[instrument(skip_all, fields(dashboard_id = %dashboard.id, cells = dashboard.cells.len()))]
    async fn update(&self, ctx: &RequestContext, dashboard: &Dashboard) -> StoreResult<Dashboard> {
        let id = dashboard.id;
        let cells = dashboard.cells.clone();
        let updated = self
            .cell
            .update(ctx, move |s| {
                let stored = s.dashboards.get_mut(&id).ok_or_else(|| StoreError::not_found("dashboard", id))?;
                *stored = cells;
                Ok(Dashboard { id, cells: stored.clone() })
            })
            .await?;
        info!("dashboard updated");
        Ok(updated)
    }

    #[instrument(skip_all)]
    async fn list(&self, ctx: &RequestContext) -> StoreResult<Vec<Dashboard>> {
        let all: Vec<Dashboard> = self
            .cell
            .read(ctx, |s| {
                Ok(s.dashboards.iter().map(|(id, cells)| Dashboard { id: *id, cells: cells.clone() }).collect())
            })
            .await?;
        debug!(count = all.len(), "dashboards listed");
        Ok(all)
    }
}
