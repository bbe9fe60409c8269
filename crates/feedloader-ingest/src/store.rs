//! Persistence contracts used by the orchestrator
//!
//! Production implementations live in [`crate::db`]; tests use in-memory
//! fakes behind the same traits.

use async_trait::async_trait;
use feedloader_common::{PackageIdentity, PackageMetadata, Result, VersionKey};
use std::fmt;
use std::path::Path;

/// Durable record of what has been loaded, keyed by `(product, bundle)`.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Create the bookkeeping tables if they do not exist
    async fn ensure_schema(&self) -> Result<()>;

    /// Stored record for a package, `None` before its first load
    async fn get(&self, identity: &PackageIdentity) -> Result<Option<PackageMetadata>>;

    /// Insert or replace a package record
    async fn upsert(&self, metadata: &PackageMetadata) -> Result<()>;

    /// Record the version a table was last loaded from.
    ///
    /// A table already recorded against another package keeps its owner and
    /// version, so dropping this package never takes a sibling's table.
    async fn upsert_table_version(
        &self,
        table: &str,
        version: VersionKey,
        identity: &PackageIdentity,
    ) -> Result<()>;

    /// Drop every table recorded against the package and forget them.
    /// Returns the names removed.
    async fn drop_tables(&self, identity: &PackageIdentity) -> Result<Vec<String>>;
}

/// How a table is prepared before a bulk load
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMode {
    /// Table was just created by a schema rebuild; clear it outright
    Clear,

    /// Table holds a previous snapshot; replace its rows atomically
    Overwrite,
}

impl fmt::Display for LoadMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadMode::Clear => write!(f, "clear"),
            LoadMode::Overwrite => write!(f, "overwrite"),
        }
    }
}

/// Tables touched by a DDL script
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DdlOutcome {
    /// Tables this script created
    pub created: Vec<String>,

    /// Tables that already existed and were left alone
    pub existing: Vec<String>,
}

/// Destination relational engine.
#[async_trait]
pub trait TableSink: Send + Sync {
    /// Run a DDL script. "Table already exists" failures are tolerated and
    /// reported in [`DdlOutcome::existing`].
    async fn execute_ddl(&self, sql: &str) -> Result<DdlOutcome>;

    /// Bulk-load a pipe-delimited flat file with a header row into `table`.
    /// Returns the number of rows loaded.
    async fn load_table(&self, table: &str, file: &Path, mode: LoadMode) -> Result<u64>;
}
