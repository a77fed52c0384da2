//! Environment/runtime helpers
//!
//! Loads `.env` files and makes sure the directories a backend writes into
//! exist before it opens them.

use std::path::Path;

use tracing::{debug, warn};

/// Load a `.env` file from the working directory if one is present.
/// Returns whether a file was loaded.
pub fn load_dotenv() -> bool {
    match dotenvy::dotenv() {
        Ok(path) => {
            debug!(path = %path.display(), "loaded .env");
            true
        }
        Err(e) if e.not_found() => false,
        Err(e) => {
            warn!(error = %e, ".env present but unreadable; ignoring");
            false
        }
    }
}

/// Ensure `dir` exists, creating it and any missing parents.
pub async fn ensure_dir(dir: &Path) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| anyhow::anyhow!("cannot create {}: {e}", dir.display()))?;
    Ok(())
}

/// Ensure the directory holding a SQLite database file exists.
///
/// Accepts URLs such as `sqlite://data/app.db?mode=rwc`. In-memory databases
/// and non-SQLite URLs are left alone.
pub async fn ensure_sqlite_parent(url: &str) -> anyhow::Result<()> {
    let Some(rest) = url.strip_prefix("sqlite:") else { return Ok(()) };
    let path = rest.trim_start_matches("//");
    let path = path.split('?').next().unwrap_or_default();
    if path.is_empty() || path.contains(":memory:") {
        return Ok(());
    }
    match Path::new(path).parent() {
        Some(parent) if !parent.as_os_str().is_empty() => ensure_dir(parent).await,
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ensure_dir_creates_nested_directories() -> anyhow::Result<()> {
        let root = std::env::temp_dir().join(format!("vizstore_env_{}", uuid::Uuid::new_v4()));
        let nested = root.join("a").join("b");
        ensure_dir(&nested).await?;
        assert!(nested.is_dir());
        let _ = tokio::fs::remove_dir_all(&root).await;
        Ok(())
    }

    #[tokio::test]
    async fn sqlite_parent_is_created_for_file_urls() -> anyhow::Result<()> {
        let root = std::env::temp_dir().join(format!("vizstore_sqlite_{}", uuid::Uuid::new_v4()));
        let url = format!("sqlite://{}/db/app.db?mode=rwc", root.display());
        ensure_sqlite_parent(&url).await?;
        assert!(root.join("db").is_dir());
        let _ = tokio::fs::remove_dir_all(&root).await;
        Ok(())
    }

    #[tokio::test]
    async fn memory_and_postgres_urls_are_ignored() -> anyhow::Result<()> {
        ensure_sqlite_parent("sqlite::memory:").await?;
        ensure_sqlite_parent("postgres://localhost/db").await?;
        Ok(())
    }
}
