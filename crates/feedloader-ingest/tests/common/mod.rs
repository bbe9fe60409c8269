//! Shared fixtures for integration tests
//!
//! `FakeDb` plays both the metadata store and the table sink so that
//! dropping recorded tables is visible to later loads. `FeedFixture` lays out
//! a vendor feed tree on disk for `LocalRemoteStore`.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use feedloader_common::{FeedError, PackageIdentity, PackageMetadata, Result, VersionKey};
use feedloader_ingest::config::LoaderConfig;
use feedloader_ingest::db::sink::{created_table, split_statements};
use feedloader_ingest::remote::LocalRemoteStore;
use feedloader_ingest::store::{DdlOutcome, LoadMode, MetadataStore, TableSink};
use feedloader_ingest::LoadOrchestrator;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

type PackageKey = (String, String);

fn key(identity: &PackageIdentity) -> PackageKey {
    (identity.product.clone(), identity.bundle.clone())
}

/// A recorded bulk load
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadCall {
    pub table: String,
    pub mode: LoadMode,
    pub rows: u64,
}

#[derive(Debug, Clone)]
pub struct TableRecord {
    pub version: VersionKey,
    pub product: String,
    pub bundle: String,
}

#[derive(Default)]
struct FakeState {
    packages: HashMap<PackageKey, PackageMetadata>,
    table_versions: BTreeMap<String, TableRecord>,
    tables: BTreeSet<String>,
    loads: Vec<LoadCall>,
    dropped: Vec<String>,
    table_version_writes: usize,
    upserts: usize,
}

/// In-memory database behind both persistence traits
#[derive(Default)]
pub struct FakeDb {
    state: Mutex<FakeState>,
}

impl FakeDb {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn seed_package(&self, metadata: PackageMetadata) {
        let mut state = self.state.lock().unwrap();
        state.packages.insert(key(&metadata.identity), metadata);
    }

    pub fn seed_table(&self, table: &str, version: VersionKey, identity: &PackageIdentity) {
        let mut state = self.state.lock().unwrap();
        state.tables.insert(table.to_string());
        state.table_versions.insert(
            table.to_string(),
            TableRecord {
                version,
                product: identity.product.clone(),
                bundle: identity.bundle.clone(),
            },
        );
    }

    pub fn package(&self, identity: &PackageIdentity) -> Option<PackageMetadata> {
        self.state.lock().unwrap().packages.get(&key(identity)).cloned()
    }

    pub fn table_version(&self, table: &str) -> Option<TableRecord> {
        self.state.lock().unwrap().table_versions.get(table).cloned()
    }

    pub fn tables(&self) -> Vec<String> {
        self.state.lock().unwrap().tables.iter().cloned().collect()
    }

    pub fn loads(&self) -> Vec<LoadCall> {
        self.state.lock().unwrap().loads.clone()
    }

    pub fn dropped(&self) -> Vec<String> {
        self.state.lock().unwrap().dropped.clone()
    }

    /// Every table-level write: bulk loads plus table version records
    pub fn table_writes(&self) -> usize {
        let state = self.state.lock().unwrap();
        state.loads.len() + state.table_version_writes
    }

    pub fn upserts(&self) -> usize {
        self.state.lock().unwrap().upserts
    }
}

#[async_trait]
impl MetadataStore for FakeDb {
    async fn ensure_schema(&self) -> Result<()> {
        Ok(())
    }

    async fn get(&self, identity: &PackageIdentity) -> Result<Option<PackageMetadata>> {
        Ok(self.package(identity))
    }

    async fn upsert(&self, metadata: &PackageMetadata) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.upserts += 1;
        state.packages.insert(key(&metadata.identity), metadata.clone());
        Ok(())
    }

    async fn upsert_table_version(
        &self,
        table: &str,
        version: VersionKey,
        identity: &PackageIdentity,
    ) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.table_version_writes += 1;
        if let Some(record) = state.table_versions.get(table) {
            if record.product != identity.product || record.bundle != identity.bundle {
                return Ok(());
            }
        }
        state.table_versions.insert(
            table.to_string(),
            TableRecord {
                version,
                product: identity.product.clone(),
                bundle: identity.bundle.clone(),
            },
        );
        Ok(())
    }

    async fn drop_tables(&self, identity: &PackageIdentity) -> Result<Vec<String>> {
        let mut state = self.state.lock().unwrap();
        let names: Vec<String> = state
            .table_versions
            .iter()
            .filter(|(_, r)| r.product == identity.product && r.bundle == identity.bundle)
            .map(|(name, _)| name.clone())
            .collect();

        for name in &names {
            state.table_versions.remove(name);
            state.tables.remove(name);
            state.dropped.push(name.clone());
        }
        Ok(names)
    }
}

#[async_trait]
impl TableSink for FakeDb {
    async fn execute_ddl(&self, sql: &str) -> Result<DdlOutcome> {
        let mut state = self.state.lock().unwrap();
        let mut outcome = DdlOutcome::default();

        for statement in split_statements(sql) {
            if let Some(table) = created_table(&statement) {
                if state.tables.insert(table.clone()) {
                    outcome.created.push(table);
                } else {
                    outcome.existing.push(table);
                }
            }
        }
        Ok(outcome)
    }

    async fn load_table(&self, table: &str, file: &Path, mode: LoadMode) -> Result<u64> {
        let body = std::fs::read_to_string(file)?;
        let mut state = self.state.lock().unwrap();

        if !state.tables.contains(table) {
            return Err(FeedError::persistence(format!(
                "relation \"{}\" does not exist",
                table
            )));
        }

        let rows = body.lines().skip(1).filter(|l| !l.trim().is_empty()).count() as u64;
        state.loads.push(LoadCall {
            table: table.to_string(),
            mode,
            rows,
        });
        Ok(rows)
    }
}

/// Vendor feed tree in a temp directory
pub struct FeedFixture {
    root: TempDir,
}

impl FeedFixture {
    pub fn new() -> Self {
        Self {
            root: tempfile::tempdir().unwrap(),
        }
    }

    pub fn root(&self) -> &Path {
        self.root.path()
    }

    /// Working directory inside the fixture, named to pass the guard
    pub fn workspace(&self) -> PathBuf {
        self.root.path().join("work").join("feedloader")
    }

    fn write_zip(path: &Path, files: &[(String, String)]) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        let mut writer = zip::ZipWriter::new(std::fs::File::create(path).unwrap());
        let options = zip::write::SimpleFileOptions::default();
        for (name, body) in files {
            writer.start_file(name.as_str(), options).unwrap();
            writer.write_all(body.as_bytes()).unwrap();
        }
        writer.finish().unwrap();
    }

    /// Publish `<dataset>_v<feed>_schema_<seq>.zip` creating `tables`
    pub fn add_schema(&self, dataset: &str, feed: u32, seq: u64, tables: &[&str]) {
        let sql: String = tables
            .iter()
            .map(|t| format!("-- {}\nCREATE TABLE `{}` (\n  id TEXT,\n  value TEXT\n);\n", t, t))
            .collect();
        let path = self
            .root
            .path()
            .join(format!("datafeeds/documents/docs_{}", dataset))
            .join(format!("{}_v{}_schema_{}.zip", dataset, feed, seq));
        Self::write_zip(
            &path,
            &[(format!("{}_v{}_table_generation_statements.sql", dataset, feed), sql)],
        );
    }

    /// Publish a data archive; `tables` maps table name to row count
    pub fn add_archive(
        &self,
        identity: &PackageIdentity,
        feed: u32,
        seq: u64,
        full: bool,
        tables: &[(&str, usize)],
    ) {
        let files: Vec<(String, String)> = tables
            .iter()
            .map(|(table, rows)| {
                let mut body = String::from("id|value\n");
                for i in 0..*rows {
                    body.push_str(&format!("{}|\"row {}\"\n", i, i));
                }
                (format!("{}.txt", table), body)
            })
            .collect();

        let name = if full {
            format!("{}_v{}_full_{}.zip", identity.bundle, feed, seq)
        } else {
            format!("{}_v{}_{}.zip", identity.bundle, feed, seq)
        };
        let path = self
            .root
            .path()
            .join("datafeeds")
            .join(&identity.fs_package)
            .join(&identity.product)
            .join(name);
        Self::write_zip(&path, &files);
    }

    pub fn config(&self, packages: Vec<PackageIdentity>) -> LoaderConfig {
        LoaderConfig {
            workspace: self.workspace(),
            base_dir: "/datafeeds".to_string(),
            packages,
        }
    }

    pub fn orchestrator(&self, db: &Arc<FakeDb>, packages: Vec<PackageIdentity>) -> LoadOrchestrator {
        LoadOrchestrator::new(
            self.config(packages),
            Arc::new(LocalRemoteStore::new(self.root.path())),
            db.clone(),
            db.clone(),
        )
    }
}

pub fn people() -> PackageIdentity {
    PackageIdentity::new("ppl", "people", "ppl_premium", "ppl_premium", 1)
}

pub fn entity() -> PackageIdentity {
    PackageIdentity::new("ent", "entity", "ent_entity_advanced", "ent_entity_advanced", 1)
}

pub fn metadata(identity: &PackageIdentity, schema: VersionKey, data: VersionKey) -> PackageMetadata {
    let at = chrono::Utc::now();
    PackageMetadata {
        identity: identity.clone(),
        schema_version: schema,
        schema_loaded_at: at,
        data_version: data,
        data_loaded_at: at,
    }
}
