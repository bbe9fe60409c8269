//! Local working directory
//!
//! Downloads and unpacked files are staged here. The directory is emptied at
//! the start and at the end of a run, and each package gets its own
//! subdirectory so one package's leftovers never leak into the next.

use feedloader_common::{PackageIdentity, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::config::check_workspace;

/// Create the working directory if needed and remove everything inside it.
pub async fn refresh_workspace(path: &Path) -> Result<()> {
    check_workspace(path)?;

    tokio::fs::create_dir_all(path).await?;

    let mut reader = tokio::fs::read_dir(path).await?;
    let mut removed = 0usize;
    while let Some(entry) = reader.next_entry().await? {
        if entry.file_type().await?.is_dir() {
            tokio::fs::remove_dir_all(entry.path()).await?;
        } else {
            tokio::fs::remove_file(entry.path()).await?;
        }
        removed += 1;
    }

    debug!(workspace = %path.display(), removed, "Workspace refreshed");
    Ok(())
}

/// Fresh staging directory for one package.
pub async fn package_dir(workspace: &Path, identity: &PackageIdentity) -> Result<PathBuf> {
    let dir = workspace.join(format!("{}__{}", identity.product, identity.bundle));
    if tokio::fs::try_exists(&dir).await? {
        tokio::fs::remove_dir_all(&dir).await?;
    }
    tokio::fs::create_dir_all(&dir).await?;
    Ok(dir)
}
