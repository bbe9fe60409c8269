//! Feedloader Ingest Library
//!
//! Keeps a local Postgres database in step with the versioned snapshot
//! archives a vendor publishes on its file feed.
//!
//! # Modules
//!
//! - **catalog**: decodes vendor file names into versioned entries
//! - **resolver**: picks the newest schema and the newest archive
//! - **orchestrator**: per-package schema reload / data load state machine
//! - **remote**: FTP and local-mirror access to the feed
//! - **db**: Postgres metadata store and bulk-load sink
//!
//! # Example
//!
//! ```no_run
//! use feedloader_ingest::{
//!     config::LoaderConfig,
//!     db::{create_pool, DbConfig, PgMetadataStore, PgTableSink},
//!     orchestrator::LoadOrchestrator,
//!     remote::LocalRemoteStore,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let pool = create_pool(&DbConfig::from_env()?).await?;
//!     let orchestrator = LoadOrchestrator::new(
//!         LoaderConfig::from_env()?,
//!         Arc::new(LocalRemoteStore::new("/mnt/feed")),
//!         Arc::new(PgMetadataStore::new(pool.clone())),
//!         Arc::new(PgTableSink::new(pool)),
//!     );
//!     let report = orchestrator.load_packages().await?;
//!     println!("{}", report.summary());
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod catalog;
pub mod config;
pub mod db;
pub mod decompression;
pub mod orchestrator;
pub mod remote;
pub mod resolver;
pub mod store;
pub mod workspace;

pub use orchestrator::{LoadOrchestrator, RunReport};
pub use store::{LoadMode, MetadataStore, TableSink};
