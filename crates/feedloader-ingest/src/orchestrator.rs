//! Load orchestration
//!
//! One package at a time:
//!
//! ```text
//! CheckMetadata ─┬─ schema stale ──► ReloadSchema ──► FullLoad ──► PersistMetadata
//!                └─ schema current ─────────────────► FullLoad ──► PersistMetadata
//! ```
//!
//! Everything that can be resolved without side effects (stored metadata,
//! newest schema, newest full archive) is resolved first, so a package with
//! no archive for its feed version fails before any table is dropped. A
//! failure aborts only the package it happened in; nothing is retried or
//! rolled back and metadata is left alone, so the next run tries again.

use chrono::Utc;
use feedloader_common::{
    CatalogEntry, FeedError, PackageIdentity, PackageMetadata, Result, VersionKey,
};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::catalog::{parse_catalog, parse_schema_catalog};
use crate::config::LoaderConfig;
use crate::decompression::extract_archive;
use crate::remote::RemoteStore;
use crate::resolver::{latest_archive, latest_schema};
use crate::store::{LoadMode, MetadataStore, TableSink};
use crate::workspace::{package_dir, refresh_workspace};

/// Whether the stored schema matches the newest published one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaState {
    Stale,
    Current,
}

/// Stored schema is stale when absent, or when the observed schema sorts
/// strictly after it.
pub fn schema_state(stored: Option<&PackageMetadata>, observed: VersionKey) -> SchemaState {
    match stored {
        Some(metadata) if !observed.is_newer_than(&metadata.schema_version) => SchemaState::Current,
        _ => SchemaState::Stale,
    }
}

/// Step of the per-package state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStage {
    CheckMetadata,
    ReloadSchema,
    FullLoad,
    PersistMetadata,
}

impl fmt::Display for LoadStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LoadStage::CheckMetadata => "check-metadata",
            LoadStage::ReloadSchema => "reload-schema",
            LoadStage::FullLoad => "full-load",
            LoadStage::PersistMetadata => "persist-metadata",
        };
        f.write_str(name)
    }
}

/// A package that could not be loaded
#[derive(Error, Debug)]
#[error("{identity} failed during {stage}: {error}")]
pub struct PackageFailure {
    pub identity: PackageIdentity,
    pub stage: LoadStage,
    #[source]
    pub error: FeedError,
}

fn failed_at(
    stage: LoadStage,
    identity: &PackageIdentity,
) -> impl Fn(FeedError) -> PackageFailure + Copy + '_ {
    move |error| PackageFailure {
        identity: identity.clone(),
        stage,
        error,
    }
}

/// What a run will do with a package
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadDecision {
    /// Drop tables, apply the new schema, load the newest full archive
    RebuildAndLoad,

    /// Schema is current, a newer archive is available
    Load,

    /// Nothing newer on the feed
    UpToDate,
}

impl fmt::Display for LoadDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadDecision::RebuildAndLoad => write!(f, "rebuild schema and load"),
            LoadDecision::Load => write!(f, "load"),
            LoadDecision::UpToDate => write!(f, "up to date"),
        }
    }
}

/// Everything resolved for a package before anything is changed
#[derive(Debug, Clone)]
pub struct LoadPlan {
    pub identity: PackageIdentity,
    pub stored: Option<PackageMetadata>,
    pub schema: CatalogEntry,
    pub schema_version: VersionKey,
    pub schema_state: SchemaState,
    pub archive: CatalogEntry,
    pub archive_version: VersionKey,
}

impl LoadPlan {
    /// After a rebuild the stored data version is meaningless (the tables are
    /// gone), so a stale schema always loads.
    pub fn decision(&self) -> LoadDecision {
        match self.schema_state {
            SchemaState::Stale => LoadDecision::RebuildAndLoad,
            SchemaState::Current => match &self.stored {
                Some(metadata) if metadata.data_version >= self.archive_version => {
                    LoadDecision::UpToDate
                },
                _ => LoadDecision::Load,
            },
        }
    }
}

/// One loaded table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableLoad {
    pub table: String,
    pub rows: u64,
}

/// Result of a package that completed
#[derive(Debug, Clone)]
pub struct LoadOutcome {
    pub identity: PackageIdentity,
    pub decision: LoadDecision,
    pub schema_version: VersionKey,
    pub data_version: VersionKey,
    pub tables: Vec<TableLoad>,
}

/// Per-package results of a full run
#[derive(Debug, Default)]
pub struct RunReport {
    pub outcomes: Vec<LoadOutcome>,
    pub failures: Vec<PackageFailure>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn summary(&self) -> String {
        let loaded = self
            .outcomes
            .iter()
            .filter(|o| o.decision != LoadDecision::UpToDate)
            .count();
        format!(
            "{} loaded, {} up to date, {} failed",
            loaded,
            self.outcomes.len() - loaded,
            self.failures.len()
        )
    }
}

/// Table a data file loads into: the file name up to its first `.`,
/// folded to lower case like an unquoted identifier
pub fn table_name(file: &Path) -> Option<String> {
    let name = file.file_name()?.to_str()?;
    let stem = name.split('.').next().unwrap_or(name);
    (!stem.is_empty()).then(|| stem.to_ascii_lowercase())
}

fn is_sql_script(file: &Path) -> bool {
    file.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("sql"))
}

async fn unpack(archive: PathBuf, dest: PathBuf) -> Result<Vec<PathBuf>> {
    tokio::task::spawn_blocking(move || extract_archive(&archive, &dest))
        .await
        .map_err(|e| FeedError::Archive(format!("Extraction task failed: {}", e)))?
}

/// Drives packages through schema reload and data load
pub struct LoadOrchestrator {
    config: LoaderConfig,
    remote: Arc<dyn RemoteStore>,
    metadata: Arc<dyn MetadataStore>,
    sink: Arc<dyn TableSink>,
}

impl LoadOrchestrator {
    pub fn new(
        config: LoaderConfig,
        remote: Arc<dyn RemoteStore>,
        metadata: Arc<dyn MetadataStore>,
        sink: Arc<dyn TableSink>,
    ) -> Self {
        Self {
            config,
            remote,
            metadata,
            sink,
        }
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Schema documents published for the package's dataset
    pub async fn schema_catalog(&self, identity: &PackageIdentity) -> Result<Vec<CatalogEntry>> {
        let dir = self.config.schema_dir(identity);
        let listing = self.remote.list(&dir).await?;
        Ok(parse_schema_catalog(&identity.dataset, &dir, &listing))
    }

    /// Data archives of one kind published for the package's bundle
    pub async fn archive_catalog(
        &self,
        identity: &PackageIdentity,
        want_full_archive: bool,
    ) -> Result<Vec<CatalogEntry>> {
        let dir = self.config.data_dir(identity);
        let listing = self.remote.list(&dir).await?;
        Ok(parse_catalog(&identity.bundle, &dir, &listing, want_full_archive))
    }

    /// Resolve stored and observed versions without changing anything
    pub async fn plan_package(
        &self,
        identity: &PackageIdentity,
    ) -> std::result::Result<LoadPlan, PackageFailure> {
        let check = failed_at(LoadStage::CheckMetadata, identity);

        let stored = self.metadata.get(identity).await.map_err(check)?;
        if stored.is_none() {
            info!(product = %identity.product, bundle = %identity.bundle, "No metadata, first load");
        }

        let schema = self
            .schema_catalog(identity)
            .await
            .and_then(|catalog| latest_schema(&catalog).cloned())
            .map_err(check)?;
        let schema_version = schema
            .version
            .ok_or_else(|| check(FeedError::not_found("Latest schema has no version")))?;
        let state = schema_state(stored.as_ref(), schema_version);

        let load = failed_at(LoadStage::FullLoad, identity);
        let archive = self
            .archive_catalog(identity, true)
            .await
            .and_then(|catalog| latest_archive(&catalog, identity.feed_version, true).cloned())
            .map_err(load)?;
        let archive_version = archive
            .version
            .ok_or_else(|| load(FeedError::not_found("Latest archive has no version")))?;

        // a rebuild reloads from the newest full archive, which must not
        // take the recorded data version backwards
        if let (SchemaState::Stale, Some(metadata)) = (state, stored.as_ref()) {
            if metadata.data_version > archive_version {
                return Err(load(FeedError::not_found(format!(
                    "Newest full archive {} is older than loaded data {}",
                    archive_version, metadata.data_version
                ))));
            }
        }

        debug!(
            product = %identity.product,
            bundle = %identity.bundle,
            schema = %schema_version,
            archive = %archive_version,
            state = ?state,
            "Package planned"
        );

        Ok(LoadPlan {
            identity: identity.clone(),
            stored,
            schema,
            schema_version,
            schema_state: state,
            archive,
            archive_version,
        })
    }

    /// Bring one package up to date
    pub async fn load_package(
        &self,
        identity: &PackageIdentity,
    ) -> std::result::Result<LoadOutcome, PackageFailure> {
        let plan = self.plan_package(identity).await?;
        let decision = plan.decision();

        if decision == LoadDecision::UpToDate {
            let (schema_version, data_version) = plan
                .stored
                .as_ref()
                .map_or((plan.schema_version, plan.archive_version), |m| {
                    (m.schema_version, m.data_version)
                });
            info!(
                product = %identity.product,
                bundle = %identity.bundle,
                version = %data_version,
                "Package up to date"
            );
            return Ok(LoadOutcome {
                identity: identity.clone(),
                decision,
                schema_version,
                data_version,
                tables: Vec::new(),
            });
        }

        let now = Utc::now();
        let (tables, schema_version, schema_loaded_at) = if decision == LoadDecision::RebuildAndLoad {
            let workdir = self.staging_dir(identity, LoadStage::ReloadSchema).await?;
            self.reload_schema(&plan, &workdir)
                .await
                .map_err(failed_at(LoadStage::ReloadSchema, identity))?;
            let tables = self
                .full_load(&plan, LoadMode::Clear, &workdir)
                .await
                .map_err(failed_at(LoadStage::FullLoad, identity))?;
            (tables, plan.schema_version, now)
        } else {
            let workdir = self.staging_dir(identity, LoadStage::FullLoad).await?;
            let tables = self
                .incremental_load(&plan, &workdir)
                .await
                .map_err(failed_at(LoadStage::FullLoad, identity))?;
            // schema unchanged, keep what is stored so it never moves back
            let (version, loaded_at) = plan
                .stored
                .as_ref()
                .map_or((plan.schema_version, now), |m| (m.schema_version, m.schema_loaded_at));
            (tables, version, loaded_at)
        };

        let record = PackageMetadata {
            identity: identity.clone(),
            schema_version,
            schema_loaded_at,
            data_version: plan.archive_version,
            data_loaded_at: now,
        };
        self.metadata
            .upsert(&record)
            .await
            .map_err(failed_at(LoadStage::PersistMetadata, identity))?;

        info!(
            product = %identity.product,
            bundle = %identity.bundle,
            schema = %schema_version,
            version = %plan.archive_version,
            tables = tables.len(),
            "Package loaded"
        );

        Ok(LoadOutcome {
            identity: identity.clone(),
            decision,
            schema_version,
            data_version: plan.archive_version,
            tables,
        })
    }

    async fn staging_dir(
        &self,
        identity: &PackageIdentity,
        stage: LoadStage,
    ) -> std::result::Result<PathBuf, PackageFailure> {
        package_dir(&self.config.workspace, identity)
            .await
            .map_err(failed_at(stage, identity))
    }

    /// Drop the package's tables and apply the newest schema document.
    ///
    /// Returns the tables created. Tables that already exist (owned by a
    /// sibling package sharing the schema) are skipped and not registered.
    pub async fn reload_schema(&self, plan: &LoadPlan, workdir: &Path) -> Result<Vec<String>> {
        let identity = &plan.identity;

        let dropped = self.metadata.drop_tables(identity).await?;
        info!(
            product = %identity.product,
            bundle = %identity.bundle,
            dropped = dropped.len(),
            schema = %plan.schema_version,
            "Reloading schema"
        );

        let local = self.remote.fetch(&plan.schema.path, workdir).await?;
        let files = unpack(local, workdir.join("schema")).await?;
        let scripts: Vec<_> = files.into_iter().filter(|f| is_sql_script(f)).collect();
        if scripts.is_empty() {
            return Err(FeedError::not_found(format!(
                "Schema archive {} contains no SQL scripts",
                plan.schema.raw_name
            )));
        }

        let mut created = Vec::new();
        for script in scripts {
            let sql = tokio::fs::read_to_string(&script).await?;
            let outcome = self.sink.execute_ddl(&sql).await?;

            for table in &outcome.existing {
                warn!(table = %table, "Table already exists, not registering");
            }
            for table in outcome.created {
                self.metadata
                    .upsert_table_version(&table, plan.schema_version, identity)
                    .await?;
                created.push(table);
            }
        }

        Ok(created)
    }

    /// Fetch the newest full archive and load every file in it
    pub async fn full_load(
        &self,
        plan: &LoadPlan,
        mode: LoadMode,
        workdir: &Path,
    ) -> Result<Vec<TableLoad>> {
        let identity = &plan.identity;
        info!(
            product = %identity.product,
            bundle = %identity.bundle,
            archive = %plan.archive.raw_name,
            version = %plan.archive_version,
            mode = %mode,
            "Loading full archive"
        );

        let local = self.remote.fetch(&plan.archive.path, workdir).await?;
        let files = unpack(local, workdir.join("data")).await?;

        let mut loaded = Vec::with_capacity(files.len());
        for file in files {
            let Some(table) = table_name(&file) else {
                warn!(file = %file.display(), "Cannot derive table name, skipping");
                continue;
            };

            let rows = self.sink.load_table(&table, &file, mode).await?;
            self.metadata
                .upsert_table_version(&table, plan.archive_version, identity)
                .await?;

            debug!(table = %table, rows, version = %plan.archive_version, "Table recorded");
            loaded.push(TableLoad { table, rows });
        }

        Ok(loaded)
    }

    /// Delta archives are not merged; the newest full snapshot is reloaded.
    pub async fn incremental_load(&self, plan: &LoadPlan, workdir: &Path) -> Result<Vec<TableLoad>> {
        debug!(product = %plan.identity.product, "Incremental load delegates to full load");
        self.full_load(plan, LoadMode::Overwrite, workdir).await
    }

    /// Load every configured package in order.
    ///
    /// Errors only when the run cannot start (metadata tables or the working
    /// directory). Package failures are collected in the report, and a
    /// failure to empty the working directory afterwards is only logged.
    pub async fn load_packages(&self) -> Result<RunReport> {
        info!(packages = self.config.packages.len(), "Starting load run");

        self.metadata.ensure_schema().await?;
        refresh_workspace(&self.config.workspace).await?;

        let mut report = RunReport::default();
        for identity in &self.config.packages {
            info!(product = %identity.product, bundle = %identity.bundle, "Processing package");

            match self.load_package(identity).await {
                Ok(outcome) => report.outcomes.push(outcome),
                Err(failure) => {
                    error!(
                        product = %identity.product,
                        bundle = %identity.bundle,
                        stage = %failure.stage,
                        "Package failed: {}",
                        failure.error
                    );
                    report.failures.push(failure);
                },
            }
        }

        if let Err(e) = refresh_workspace(&self.config.workspace).await {
            error!(workspace = %self.config.workspace.display(), "Failed to empty working directory: {}", e);
        }

        info!("Load run completed: {}", report.summary());
        Ok(report)
    }
}
