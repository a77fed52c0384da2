//! Backend wiring.
//!
//! Turns an [`AppConfig`] into ready-to-use store handles so binaries and
//! callers never construct a backend by hand.

use std::sync::Arc;

use configs::{AppConfig, LogFormat, LoggingConfig, StorageBackend};
use tracing::info;

use crate::auth::repo::{MemoryAuthStore, SeaOrmAuthStore};
use crate::auth::AuthStore;
use crate::context::RequestContext;
use crate::dashboard::repo::{MemoryDashboardStore, SeaOrmDashboardStore};
use crate::dashboard::DashboardStore;
use crate::errors::StoreResult;
use crate::exploration::repo::{MemoryExplorationStore, SeaOrmExplorationStore};
use crate::exploration::ExplorationStore;

pub const AUTH_SNAPSHOT: &str = "auth.json";
pub const EXPLORATIONS_SNAPSHOT: &str = "explorations.json";
pub const DASHBOARDS_SNAPSHOT: &str = "dashboards.json";

/// One handle per storage contract.
#[derive(Clone)]
pub struct Stores {
    pub auth: AuthStore,
    pub explorations: Arc<dyn ExplorationStore>,
    pub dashboards: Arc<dyn DashboardStore>,
}

/// Build the stores for the configured backend. For the database backend
/// this creates missing tables and seeds the permission catalog.
pub async fn build_stores(cfg: &AppConfig) -> StoreResult<Stores> {
    match cfg.storage.backend {
        StorageBackend::Memory => build_memory(cfg).await,
        StorageBackend::Database => build_database(cfg).await,
    }
}

async fn build_memory(cfg: &AppConfig) -> StoreResult<Stores> {
    let catalog = cfg.auth.permissions.iter().map(String::as_str);
    let stores = match &cfg.storage.snapshot_dir {
        Some(dir) => {
            info!(dir = %dir.display(), "memory backend with snapshots");
            Stores {
                auth: AuthStore::from_backend(Arc::new(MemoryAuthStore::open(catalog, dir.join(AUTH_SNAPSHOT)).await?)),
                explorations: Arc::new(MemoryExplorationStore::open(dir.join(EXPLORATIONS_SNAPSHOT)).await?),
                dashboards: Arc::new(MemoryDashboardStore::open(dir.join(DASHBOARDS_SNAPSHOT)).await?),
            }
        }
        None => {
            info!("memory backend without persistence");
            Stores {
                auth: AuthStore::from_backend(Arc::new(MemoryAuthStore::new(catalog)?)),
                explorations: Arc::new(MemoryExplorationStore::new()),
                dashboards: Arc::new(MemoryDashboardStore::new()),
            }
        }
    };
    Ok(stores)
}

async fn build_database(cfg: &AppConfig) -> StoreResult<Stores> {
    if cfg.database.is_sqlite() && !cfg.database.is_sqlite_memory() {
        common::env::ensure_sqlite_parent(&cfg.database.url)
            .await
            .map_err(|e| crate::errors::StoreError::Backend(e.to_string()))?;
    }
    let db = models::db::connect_with_config(&cfg.database).await?;
    models::db::bootstrap_schema(&db).await?;
    let auth = SeaOrmAuthStore::new(db.clone());
    auth.seed_catalog(&RequestContext::background(), &cfg.auth.permissions).await?;
    info!("database backend ready");
    Ok(Stores {
        auth: AuthStore::from_backend(Arc::new(auth)),
        explorations: Arc::new(SeaOrmExplorationStore::new(db.clone())),
        dashboards: Arc::new(SeaOrmDashboardStore::new(db)),
    })
}

/// Install the tracing subscriber in the configured format.
pub fn init_logging(cfg: &LoggingConfig) {
    match cfg.format {
        LogFormat::Compact => common::utils::logging::init_logging_default(),
        LogFormat::Json => common::utils::logging::init_logging_json(),
    }
}
