//! Vendor FTP transport
//!
//! `suppaftp`'s blocking client runs on `spawn_blocking`; each call opens its
//! own session, so no connection state is shared between packages. Failed
//! calls are returned to the caller as transport errors without retrying.

use anyhow::{Context, Result};
use async_trait::async_trait;
use feedloader_common::FeedError;
use std::io::Read;
use std::path::{Path, PathBuf};
use suppaftp::FtpStream;
use tracing::{debug, info, warn};

use super::{remote_file_name, RemoteEntry, RemoteStore};

/// Configuration for the vendor FTP connection
#[derive(Debug, Clone)]
pub struct FtpConfig {
    pub host: String,

    pub port: u16,

    pub username: String,

    pub password: String,
}

impl Default for FtpConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 21,
            username: "anonymous".to_string(),
            password: String::new(),
        }
    }
}

impl FtpConfig {
    /// Read `FEED_FTP_HOST`, `FEED_FTP_PORT`, `FEED_FTP_USER` and
    /// `FEED_FTP_PASSWORD`, falling back to the defaults
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();

        let port = match std::env::var("FEED_FTP_PORT") {
            Ok(raw) => raw
                .parse()
                .with_context(|| format!("FEED_FTP_PORT is not a port number: {}", raw))?,
            Err(_) => defaults.port,
        };

        Ok(Self {
            host: std::env::var("FEED_FTP_HOST").unwrap_or(defaults.host),
            port,
            username: std::env::var("FEED_FTP_USER").unwrap_or(defaults.username),
            password: std::env::var("FEED_FTP_PASSWORD").unwrap_or(defaults.password),
        })
    }
}

/// [`RemoteStore`] over FTP
pub struct FtpRemoteStore {
    config: FtpConfig,
}

impl FtpRemoteStore {
    pub fn new(config: FtpConfig) -> Self {
        Self { config }
    }

    fn connect(config: &FtpConfig) -> Result<FtpStream> {
        debug!(host = %config.host, port = config.port, "Connecting to FTP server");

        let mut stream = FtpStream::connect(format!("{}:{}", config.host, config.port))
            .context("Failed to connect to FTP server")?;

        // Extended passive mode behaves better behind NAT
        stream.set_mode(suppaftp::Mode::ExtendedPassive);

        stream
            .login(&config.username, &config.password)
            .context("FTP login failed")?;

        Ok(stream)
    }

    fn list_sync(config: &FtpConfig, dir: &str) -> Result<Vec<RemoteEntry>> {
        let mut stream = Self::connect(config)?;

        let lines = stream
            .list(Some(dir))
            .with_context(|| format!("Failed to list directory: {}", dir))?;

        let entries = lines.iter().filter_map(|line| parse_list_line(line)).collect();

        if let Err(e) = stream.quit() {
            warn!("Failed to quit FTP session gracefully: {}", e);
        }

        Ok(entries)
    }

    fn fetch_sync(config: &FtpConfig, remote_path: &str, dest: &Path) -> Result<()> {
        let mut stream = Self::connect(config)?;

        stream
            .transfer_type(suppaftp::types::FileType::Binary)
            .context("Failed to set binary mode")?;

        let mut reader = stream
            .retr_as_buffer(remote_path)
            .with_context(|| format!("Failed to download file: {}", remote_path))?;

        let mut data = Vec::new();
        reader
            .read_to_end(&mut data)
            .context("Failed to read file data")?;

        std::fs::write(dest, &data)
            .with_context(|| format!("Failed to write {}", dest.display()))?;

        debug!(bytes = data.len(), path = %remote_path, "Downloaded file");

        if let Err(e) = stream.quit() {
            warn!("Failed to quit FTP session gracefully: {}", e);
        }

        Ok(())
    }
}

#[async_trait]
impl RemoteStore for FtpRemoteStore {
    async fn list(&self, dir: &str) -> feedloader_common::Result<Vec<RemoteEntry>> {
        let config = self.config.clone();
        let path = dir.to_string();

        let entries = tokio::task::spawn_blocking(move || Self::list_sync(&config, &path))
            .await
            .map_err(|e| FeedError::transport(format!("FTP LIST task panicked: {}", e)))?
            .map_err(|e| FeedError::transport(format!("{:#}", e)))?;

        info!(dir = %dir, count = entries.len(), "Listed remote directory");
        Ok(entries)
    }

    async fn fetch(&self, remote_path: &str, dest_dir: &Path) -> feedloader_common::Result<PathBuf> {
        let config = self.config.clone();
        let path = remote_path.to_string();
        let dest = dest_dir.join(remote_file_name(remote_path));
        let target = dest.clone();

        tokio::task::spawn_blocking(move || Self::fetch_sync(&config, &path, &target))
            .await
            .map_err(|e| FeedError::transport(format!("FTP download task panicked: {}", e)))?
            .map_err(|e| FeedError::transport(format!("{:#}", e)))?;

        info!(path = %remote_path, local = %dest.display(), "Fetched remote file");
        Ok(dest)
    }
}

/// Parse one Unix-style `LIST` line:
///
/// `drwxr-xr-x   2 ftp ftp  4096 Jan 15 12:00 docs_ppl`
/// `-rw-r--r--   1 ftp ftp  1234 Jan 15 12:00 ppl_v1_schema_12.zip`
pub fn parse_list_line(line: &str) -> Option<RemoteEntry> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() < 4 {
        return None;
    }

    let name = (*parts.last()?).to_string();
    if name == "." || name == ".." {
        return None;
    }

    Some(RemoteEntry {
        name,
        is_directory: parts[0].starts_with('d'),
        size: parts.get(4).and_then(|s| s.parse().ok()),
    })
}
