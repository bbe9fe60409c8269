//! Bulk loading and DDL execution against Postgres
//!
//! Vendor flat files are pipe-delimited, optionally double-quoted, with one
//! header line. `COPY ... FROM STDIN` in CSV mode reads them as they are.

use async_trait::async_trait;
use feedloader_common::Result;
use regex::Regex;
use sqlx::PgPool;
use std::path::Path;
use std::sync::OnceLock;
use tokio::io::AsyncReadExt;
use tracing::{debug, info, warn};

use super::{quote_ident, DbResult};
use crate::store::{DdlOutcome, LoadMode, TableSink};

/// SQLSTATE for `duplicate_table`
const DUPLICATE_TABLE: &str = "42P07";

const COPY_CHUNK_SIZE: usize = 64 * 1024;

#[allow(clippy::expect_used)]
fn create_table_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"(?i)^\s*CREATE\s+TABLE\s+(IF\s+NOT\s+EXISTS\s+)?(["`])?([A-Za-z_][A-Za-z0-9_]*)["`]?"#)
            .expect("create table regex is valid")
    })
}

#[allow(clippy::expect_used)]
fn backtick_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"`([^`]*)`").expect("backtick regex is valid"))
}

/// Split a DDL script into statements.
///
/// Drops `--` comment lines and blank statements. Vendor scripts do not put
/// semicolons inside string literals, so a plain split is enough. Backtick
/// identifiers become lower-case double-quoted ones, matching how Postgres
/// folds the unquoted names used everywhere else.
pub fn split_statements(sql: &str) -> Vec<String> {
    let without_comments: String = sql
        .lines()
        .filter(|line| !line.trim_start().starts_with("--"))
        .collect::<Vec<_>>()
        .join("\n");

    without_comments
        .split(';')
        .map(str::trim)
        .filter(|statement| !statement.is_empty())
        .map(|statement| {
            backtick_pattern()
                .replace_all(statement, |caps: &regex::Captures| {
                    format!("\"{}\"", caps[1].to_ascii_lowercase())
                })
                .into_owned()
        })
        .collect()
}

/// Name of the table a `CREATE TABLE` statement creates.
///
/// Unquoted names are folded to lower case; double-quoted names keep theirs.
pub fn created_table(statement: &str) -> Option<String> {
    let caps = create_table_pattern().captures(statement)?;
    let name = caps.get(3)?.as_str();
    match caps.get(2).map(|q| q.as_str()) {
        Some("\"") => Some(name.to_string()),
        _ => Some(name.to_ascii_lowercase()),
    }
}

/// `CREATE TABLE IF NOT EXISTS` succeeds on an existing table, so its
/// success does not prove the table was created.
pub fn is_conditional_create(statement: &str) -> bool {
    create_table_pattern()
        .captures(statement)
        .is_some_and(|caps| caps.get(1).is_some())
}

fn copy_statement(table: &str) -> DbResult<String> {
    Ok(format!(
        "COPY {} FROM STDIN WITH (FORMAT csv, DELIMITER '|', QUOTE '\"', HEADER true)",
        quote_ident(table)?
    ))
}

fn is_duplicate_table(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some(DUPLICATE_TABLE))
}

/// [`TableSink`] backed by a Postgres pool
#[derive(Debug, Clone)]
pub struct PgTableSink {
    pool: PgPool,
}

impl PgTableSink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn run_ddl(&self, sql: &str) -> DbResult<DdlOutcome> {
        let mut outcome = DdlOutcome::default();

        for statement in split_statements(sql) {
            let table = created_table(&statement);

            if let Some(name) = table.as_deref().filter(|_| is_conditional_create(&statement)) {
                if self.table_exists(name).await? {
                    debug!(table = %name, "Table already exists, skipping");
                    outcome.existing.push(name.to_string());
                    continue;
                }
            }

            match sqlx::raw_sql(&statement).execute(&self.pool).await {
                Ok(_) => {
                    if let Some(table) = table {
                        debug!(table = %table, "Created table");
                        outcome.created.push(table);
                    }
                },
                Err(e) if is_duplicate_table(&e) => {
                    warn!(table = ?table, "Table already exists, skipping");
                    if let Some(table) = table {
                        outcome.existing.push(table);
                    }
                },
                Err(e) => return Err(e.into()),
            }
        }

        Ok(outcome)
    }

    async fn table_exists(&self, table: &str) -> DbResult<bool> {
        let exists: bool = sqlx::query_scalar("SELECT to_regclass($1) IS NOT NULL")
            .bind(quote_ident(table)?)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }

    async fn copy_file(&self, table: &str, file: &Path, mode: LoadMode) -> DbResult<u64> {
        let quoted = quote_ident(table)?;
        let copy = copy_statement(table)?;

        let mut source = tokio::fs::File::open(file).await?;

        let mut tx = self.pool.begin().await?;

        let clear = match mode {
            LoadMode::Clear => format!("TRUNCATE TABLE {}", quoted),
            LoadMode::Overwrite => format!("DELETE FROM {}", quoted),
        };
        sqlx::query(&clear).execute(&mut *tx).await?;

        let mut sink = tx.copy_in_raw(&copy).await?;
        let mut buffer = vec![0u8; COPY_CHUNK_SIZE];
        loop {
            let read = source.read(&mut buffer).await?;
            if read == 0 {
                break;
            }
            sink.send(&buffer[..read]).await?;
        }
        let rows = sink.finish().await?;

        tx.commit().await?;
        Ok(rows)
    }
}

#[async_trait]
impl TableSink for PgTableSink {
    async fn execute_ddl(&self, sql: &str) -> Result<DdlOutcome> {
        let outcome = self.run_ddl(sql).await?;
        info!(
            created = outcome.created.len(),
            existing = outcome.existing.len(),
            "Executed DDL script"
        );
        Ok(outcome)
    }

    async fn load_table(&self, table: &str, file: &Path, mode: LoadMode) -> Result<u64> {
        let rows = self.copy_file(table, file, mode).await?;
        info!(table = %table, rows, mode = %mode, "Loaded table");
        Ok(rows)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_split_statements() {
        let script = "-- People tables\nCREATE TABLE `ppl_names` (id TEXT);\n\n-- jobs\nCREATE TABLE ppl_jobs (id TEXT);\n;";
        let statements = split_statements(script);
        assert_eq!(
            statements,
            vec!["CREATE TABLE \"ppl_names\" (id TEXT)", "CREATE TABLE ppl_jobs (id TEXT)"]
        );
    }

    #[test]
    fn test_created_table() {
        assert_eq!(created_table("CREATE TABLE ppl_names (id TEXT)").as_deref(), Some("ppl_names"));
        assert_eq!(
            created_table("create table if not exists \"ppl_jobs\" (id TEXT)").as_deref(),
            Some("ppl_jobs")
        );
        assert_eq!(created_table("CREATE INDEX ppl_idx ON ppl_names (id)"), None);
    }

    #[test]
    fn test_table_names_fold_like_postgres() {
        assert_eq!(created_table("CREATE TABLE PPL_Names (id TEXT)").as_deref(), Some("ppl_names"));
        assert_eq!(created_table("CREATE TABLE \"PPL_Names\" (id TEXT)").as_deref(), Some("PPL_Names"));

        let statements = split_statements("CREATE TABLE `PPL_Names` (`Id` TEXT);");
        assert_eq!(statements, vec!["CREATE TABLE \"ppl_names\" (\"id\" TEXT)"]);
        assert_eq!(created_table(&statements[0]).as_deref(), Some("ppl_names"));
    }

    #[test]
    fn test_conditional_create() {
        assert!(is_conditional_create("CREATE TABLE IF NOT EXISTS ppl_names (id TEXT)"));
        assert!(is_conditional_create("create table if not exists \"ppl_jobs\" (id TEXT)"));
        assert!(!is_conditional_create("CREATE TABLE ppl_names (id TEXT)"));
        assert!(!is_conditional_create("DROP TABLE IF EXISTS ppl_names"));
    }

    #[test]
    fn test_copy_statement() {
        assert_eq!(
            copy_statement("ppl_names").unwrap(),
            "COPY \"ppl_names\" FROM STDIN WITH (FORMAT csv, DELIMITER '|', QUOTE '\"', HEADER true)"
        );
        assert!(copy_statement("ppl names; drop").is_err());
    }
}
