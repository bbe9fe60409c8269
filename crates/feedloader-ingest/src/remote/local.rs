//! Feed mirror on local disk
//!
//! Maps remote paths such as `/datafeeds/people/ppl_premium` onto a root
//! directory. Listings are sorted by name so selection ties resolve the same
//! way on every run.

use async_trait::async_trait;
use feedloader_common::{FeedError, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::{remote_file_name, RemoteEntry, RemoteStore};

/// [`RemoteStore`] over a local directory tree
#[derive(Debug, Clone)]
pub struct LocalRemoteStore {
    root: PathBuf,
}

impl LocalRemoteStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, remote_path: &str) -> PathBuf {
        self.root.join(remote_path.trim_start_matches('/'))
    }
}

#[async_trait]
impl RemoteStore for LocalRemoteStore {
    async fn list(&self, dir: &str) -> Result<Vec<RemoteEntry>> {
        let path = self.resolve(dir);
        let mut reader = tokio::fs::read_dir(&path).await.map_err(|e| {
            FeedError::transport(format!("Failed to list directory {}: {}", path.display(), e))
        })?;

        let mut entries = Vec::new();
        while let Some(entry) = reader
            .next_entry()
            .await
            .map_err(|e| FeedError::transport(format!("Failed to read entry: {}", e)))?
        {
            let metadata = entry
                .metadata()
                .await
                .map_err(|e| FeedError::transport(format!("Failed to stat entry: {}", e)))?;

            entries.push(RemoteEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                is_directory: metadata.is_dir(),
                size: Some(metadata.len()),
            });
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        debug!(dir = %path.display(), count = entries.len(), "Listed local feed directory");
        Ok(entries)
    }

    async fn fetch(&self, remote_path: &str, dest_dir: &Path) -> Result<PathBuf> {
        let source = self.resolve(remote_path);
        let dest = dest_dir.join(remote_file_name(remote_path));

        tokio::fs::copy(&source, &dest).await.map_err(|e| {
            FeedError::transport(format!("Failed to copy {}: {}", source.display(), e))
        })?;

        info!(path = %remote_path, local = %dest.display(), "Fetched file from local feed");
        Ok(dest)
    }
}
