use std::process::ExitCode;
use std::time::Duration;

use tracing::{error, info};
use uuid::Uuid;

use service::RequestContext;

/// Upper bound for the catalog read once the backend is up.
const REPORT_TIMEOUT: Duration = Duration::from_secs(10);

async fn run(cfg: configs::AppConfig) -> anyhow::Result<()> {
    let stores = service::build_stores(&cfg).await?;
    let ctx = RequestContext::background().with_timeout(REPORT_TIMEOUT);
    let catalog = stores.auth.permissions.all(&ctx).await?;
    let dashboards = stores.dashboards.list(&ctx).await?;
    info!(
        service = "bootstrap",
        event = "ready",
        backend = ?cfg.storage.backend,
        permissions = catalog.len(),
        dashboards = dashboards.len(),
        "storage ready"
    );
    for p in catalog.iter() {
        println!("{p}");
    }
    Ok(())
}

fn main() -> ExitCode {
    common::env::load_dotenv();

    let cfg = match configs::AppConfig::load_and_validate() {
        Ok(cfg) => cfg,
        Err(e) => {
            common::utils::logging::init_logging_default();
            error!(service = "bootstrap", event = "config_invalid", error = %e, "cannot load configuration");
            return ExitCode::FAILURE;
        }
    };
    service::runtime::init_logging(&cfg.logging);

    let run_id = Uuid::new_v4();
    let pid = std::process::id();
    let version = env!("CARGO_PKG_VERSION");

    let rt = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            error!(service = "bootstrap", event = "runtime_build_failed", error = %e, "failed to build tokio runtime");
            return ExitCode::FAILURE;
        }
    };

    info!(service = "bootstrap", event = "start", %run_id, pid, version, "bootstrap starting");

    rt.block_on(async move {
        tokio::select! {
            res = run(cfg) => match res {
                Ok(()) => {
                    info!(service = "bootstrap", event = "stop", %run_id, "bootstrap finished");
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    error!(service = "bootstrap", event = "run_failed", %run_id, error = %e, "bootstrap failed");
                    ExitCode::FAILURE
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!(service = "bootstrap", event = "shutdown_signal", %run_id, "received Ctrl+C, aborting");
                ExitCode::FAILURE
            }
        }
    })
}
