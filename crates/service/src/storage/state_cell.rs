use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};
use tokio::{fs, sync::RwLock};
use tracing::{debug, info, warn};

use crate::context::RequestContext;
use crate::errors::{StoreError, StoreResult};

/// Whole-state container for an in-process backend.
///
/// Writes run against a clone of the state and are swapped in only when the
/// closure succeeds, the context is still live and (in snapshot mode) the new
/// state has reached disk. A failed or cancelled write therefore leaves both
/// memory and snapshot untouched.
#[derive(Debug)]
pub struct StateCell<S> {
    inner: RwLock<S>,
    snapshot: Option<PathBuf>,
}

impl<S> StateCell<S>
where
    S: Clone + Default + Serialize + DeserializeOwned + Send + Sync,
{
    /// State kept in process only.
    pub fn in_memory() -> Self {
        Self::from_state(S::default())
    }

    /// In-process cell starting from `state`.
    pub fn from_state(state: S) -> Self {
        Self { inner: RwLock::new(state), snapshot: None }
    }

    /// Open a snapshot-backed cell. Creates the file with an empty state if
    /// missing; an unreadable or corrupt snapshot is an error, never silently
    /// replaced.
    pub async fn open<P: Into<PathBuf>>(path: P) -> StoreResult<Self> {
        let file_path = path.into();
        if let Some(parent) = file_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            common::env::ensure_dir(parent)
                .await
                .map_err(|e| StoreError::Backend(e.to_string()))?;
        }

        let state: S = match fs::read(&file_path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let empty = S::default();
                write_atomically(&file_path, &serde_json::to_vec_pretty(&empty)?).await?;
                empty
            }
            Err(e) => return Err(e.into()),
        };
        info!(path = %file_path.display(), "snapshot opened");
        Ok(Self { inner: RwLock::new(state), snapshot: Some(file_path) })
    }

    pub fn snapshot_path(&self) -> Option<&Path> { self.snapshot.as_deref() }

    /// Run `f` against the current state under a shared lock.
    pub async fn read<T, F>(&self, ctx: &RequestContext, f: F) -> StoreResult<T>
    where
        F: FnOnce(&S) -> StoreResult<T> + Send,
        T: Send,
    {
        let guard = ctx.run(async { Ok(self.inner.read().await) }).await?;
        f(&guard)
    }

    /// Apply `f` as one all-or-nothing write.
    pub async fn update<T, F>(&self, ctx: &RequestContext, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut S) -> StoreResult<T> + Send,
        T: Send,
    {
        let mut guard = ctx.run(async { Ok(self.inner.write().await) }).await?;
        let mut next = guard.clone();
        let out = f(&mut next)?;

        match &self.snapshot {
            Some(path) => {
                let bytes = serde_json::to_vec_pretty(&next)?;
                let tmp = tmp_path(path);
                // The temp write is not raced against cancellation: a dropped
                // blocking write could still land after the cleanup below.
                let staged = fs::write(&tmp, &bytes).await.map_err(StoreError::from);
                // Last point at which cancellation is honoured.
                if let Err(e) = staged.and_then(|()| ctx.check()) {
                    discard(&tmp).await;
                    return Err(e);
                }
                if let Err(e) = fs::rename(&tmp, path).await {
                    discard(&tmp).await;
                    return Err(e.into());
                }
                debug!(path = %path.display(), bytes = bytes.len(), "snapshot written");
            }
            None => ctx.check()?,
        }

        *guard = next;
        Ok(out)
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

async fn discard(tmp: &Path) {
    if let Err(e) = fs::remove_file(tmp).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %tmp.display(), error = %e, "cannot remove stale snapshot temp file");
        }
    }
}

async fn write_atomically(path: &Path, bytes: &[u8]) -> StoreResult<()> {
    let tmp = tmp_path(path);
    fs::write(&tmp, bytes).await?;
    fs::rename(&tmp, path).await?;
    Ok(())
}
