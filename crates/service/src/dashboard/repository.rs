use async_trait::async_trait;

use super::domain::Dashboard;
use crate::context::RequestContext;
use crate::errors::StoreResult;
use crate::ids::DashboardId;

#[async_trait]
pub trait DashboardStore: Send + Sync {
    /// Store a new dashboard; cells are kept exactly as given.
    async fn add(&self, ctx: &RequestContext, dashboard: Dashboard) -> StoreResult<Dashboard>;
    async fn delete(&self, ctx: &RequestContext, dashboard: &Dashboard) -> StoreResult<()>;
    async fn get(&self, ctx: &RequestContext, id: DashboardId) -> StoreResult<Dashboard>;
    /// Replace the whole cell list of an existing dashboard.
    async fn update(&self, ctx: &RequestContext, dashboard: &Dashboard) -> StoreResult<Dashboard>;
    /// All dashboards by ascending ID.
    async fn list(&self, ctx: &RequestContext) -> StoreResult<Vec<Dashboard>>;
}
