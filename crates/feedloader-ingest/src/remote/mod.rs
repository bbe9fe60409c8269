//! Remote feed access
//!
//! The orchestrator only needs two operations from the vendor feed: list a
//! directory and copy one file into the local working directory.
//!
//! - **ftp**: the vendor FTP server, via `suppaftp`
//! - **local**: a mounted or mirrored copy of the feed on local disk

pub mod ftp;
pub mod local;

use async_trait::async_trait;
use feedloader_common::Result;
use std::path::{Path, PathBuf};

pub use ftp::{FtpConfig, FtpRemoteStore};
pub use local::LocalRemoteStore;

/// One entry of a remote directory listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    /// File or directory name, without the directory part
    pub name: String,

    pub is_directory: bool,

    /// Size in bytes, when the listing reports it
    pub size: Option<u64>,
}

impl RemoteEntry {
    pub fn file(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_directory: false,
            size: None,
        }
    }

    pub fn directory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_directory: true,
            size: None,
        }
    }
}

/// Capability to list and fetch files from the vendor feed.
///
/// Calls block the caller until they complete or fail; nothing is retried.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// List the entries of a remote directory
    async fn list(&self, dir: &str) -> Result<Vec<RemoteEntry>>;

    /// Copy `remote_path` into `dest_dir`, returning the local file path
    async fn fetch(&self, remote_path: &str, dest_dir: &Path) -> Result<PathBuf>;
}

/// Join a remote directory and a name with exactly one `/`
pub fn join_remote(dir: &str, name: &str) -> String {
    format!("{}/{}", dir.trim_end_matches('/'), name.trim_start_matches('/'))
}

/// Last path segment of a remote path
pub fn remote_file_name(remote_path: &str) -> &str {
    remote_path.rsplit('/').next().unwrap_or(remote_path)
}
