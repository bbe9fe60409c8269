//! Package and table bookkeeping in Postgres
//!
//! ```text
//! metadata_package_version   PK (product, bundle)
//! metadata_table_version     PK tablename
//! ```
//!
//! Versions are stored as `BIGINT`; sequences above `i64::MAX` are rejected
//! rather than wrapped.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use feedloader_common::{PackageIdentity, PackageMetadata, Result, VersionKey};
use sqlx::PgPool;
use tracing::{debug, info};

use super::{quote_ident, DbError, DbResult};
use crate::store::MetadataStore;

const CREATE_PACKAGE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS metadata_package_version (
    product TEXT NOT NULL,
    bundle TEXT NOT NULL,
    schema_feed_version BIGINT NOT NULL,
    schema_sequence BIGINT NOT NULL,
    schema_date_loaded TIMESTAMPTZ NOT NULL,
    package_feed_version BIGINT NOT NULL,
    package_sequence BIGINT NOT NULL,
    package_date_loaded TIMESTAMPTZ NOT NULL,
    PRIMARY KEY (product, bundle)
)"#;

const CREATE_TABLE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS metadata_table_version (
    tablename TEXT PRIMARY KEY,
    feed_version BIGINT NOT NULL,
    sequence BIGINT NOT NULL,
    date_loaded TIMESTAMPTZ NOT NULL,
    product TEXT NOT NULL,
    bundle TEXT NOT NULL
)"#;

#[derive(Debug, sqlx::FromRow)]
struct PackageVersionRow {
    schema_feed_version: i64,
    schema_sequence: i64,
    schema_date_loaded: DateTime<Utc>,
    package_feed_version: i64,
    package_sequence: i64,
    package_date_loaded: DateTime<Utc>,
}

impl PackageVersionRow {
    fn into_metadata(self, identity: &PackageIdentity) -> DbResult<PackageMetadata> {
        Ok(PackageMetadata {
            identity: identity.clone(),
            schema_version: from_columns(self.schema_feed_version, self.schema_sequence)?,
            schema_loaded_at: self.schema_date_loaded,
            data_version: from_columns(self.package_feed_version, self.package_sequence)?,
            data_loaded_at: self.package_date_loaded,
        })
    }
}

fn from_columns(feed_version: i64, sequence: i64) -> DbResult<VersionKey> {
    let feed_version = u32::try_from(feed_version)
        .map_err(|_| DbError::OutOfRange(format!("feed version {}", feed_version)))?;
    let sequence = u64::try_from(sequence)
        .map_err(|_| DbError::OutOfRange(format!("sequence {}", sequence)))?;
    Ok(VersionKey::new(feed_version, sequence))
}

fn to_columns(version: VersionKey) -> DbResult<(i64, i64)> {
    let sequence = i64::try_from(version.sequence)
        .map_err(|_| DbError::OutOfRange(format!("sequence {}", version.sequence)))?;
    Ok((i64::from(version.feed_version), sequence))
}

/// [`MetadataStore`] backed by a Postgres pool
#[derive(Debug, Clone)]
pub struct PgMetadataStore {
    pool: PgPool,
}

impl PgMetadataStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_row(&self, identity: &PackageIdentity) -> DbResult<Option<PackageMetadata>> {
        let row = sqlx::query_as::<_, PackageVersionRow>(
            r#"
            SELECT schema_feed_version, schema_sequence, schema_date_loaded,
                   package_feed_version, package_sequence, package_date_loaded
            FROM metadata_package_version
            WHERE product = $1 AND bundle = $2
            "#,
        )
        .bind(&identity.product)
        .bind(&identity.bundle)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| r.into_metadata(identity)).transpose()
    }

    async fn write_row(&self, metadata: &PackageMetadata) -> DbResult<()> {
        let (schema_feed, schema_seq) = to_columns(metadata.schema_version)?;
        let (data_feed, data_seq) = to_columns(metadata.data_version)?;

        sqlx::query(
            r#"
            INSERT INTO metadata_package_version (
                product, bundle,
                schema_feed_version, schema_sequence, schema_date_loaded,
                package_feed_version, package_sequence, package_date_loaded
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (product, bundle) DO UPDATE SET
                schema_feed_version = EXCLUDED.schema_feed_version,
                schema_sequence = EXCLUDED.schema_sequence,
                schema_date_loaded = EXCLUDED.schema_date_loaded,
                package_feed_version = EXCLUDED.package_feed_version,
                package_sequence = EXCLUDED.package_sequence,
                package_date_loaded = EXCLUDED.package_date_loaded
            "#,
        )
        .bind(&metadata.identity.product)
        .bind(&metadata.identity.bundle)
        .bind(schema_feed)
        .bind(schema_seq)
        .bind(metadata.schema_loaded_at)
        .bind(data_feed)
        .bind(data_seq)
        .bind(metadata.data_loaded_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn write_table_row(
        &self,
        table: &str,
        version: VersionKey,
        identity: &PackageIdentity,
    ) -> DbResult<()> {
        let (feed_version, sequence) = to_columns(version)?;

        let result = sqlx::query(
            r#"
            INSERT INTO metadata_table_version (tablename, feed_version, sequence, date_loaded, product, bundle)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (tablename) DO UPDATE SET
                feed_version = EXCLUDED.feed_version,
                sequence = EXCLUDED.sequence,
                date_loaded = EXCLUDED.date_loaded
            WHERE metadata_table_version.product = EXCLUDED.product
              AND metadata_table_version.bundle = EXCLUDED.bundle
            "#,
        )
        .bind(table)
        .bind(feed_version)
        .bind(sequence)
        .bind(Utc::now())
        .bind(&identity.product)
        .bind(&identity.bundle)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            debug!(table = %table, bundle = %identity.bundle, "Table owned by another package, not re-registered");
        }
        Ok(())
    }

    async fn drop_recorded(&self, identity: &PackageIdentity) -> DbResult<Vec<String>> {
        let mut tx = self.pool.begin().await?;

        let tables: Vec<String> = sqlx::query_scalar(
            "SELECT tablename FROM metadata_table_version WHERE product = $1 AND bundle = $2 ORDER BY tablename",
        )
        .bind(&identity.product)
        .bind(&identity.bundle)
        .fetch_all(&mut *tx)
        .await?;

        for table in &tables {
            let statement = format!("DROP TABLE IF EXISTS {}", quote_ident(table)?);
            sqlx::query(&statement).execute(&mut *tx).await?;
            debug!(table = %table, "Dropped table");
        }

        sqlx::query("DELETE FROM metadata_table_version WHERE product = $1 AND bundle = $2")
            .bind(&identity.product)
            .bind(&identity.bundle)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(tables)
    }
}

#[async_trait]
impl MetadataStore for PgMetadataStore {
    async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(CREATE_PACKAGE_TABLE)
            .execute(&self.pool)
            .await
            .map_err(DbError::from)?;
        sqlx::query(CREATE_TABLE_TABLE)
            .execute(&self.pool)
            .await
            .map_err(DbError::from)?;

        info!("Metadata tables ready");
        Ok(())
    }

    async fn get(&self, identity: &PackageIdentity) -> Result<Option<PackageMetadata>> {
        Ok(self.fetch_row(identity).await?)
    }

    async fn upsert(&self, metadata: &PackageMetadata) -> Result<()> {
        Ok(self.write_row(metadata).await?)
    }

    async fn upsert_table_version(
        &self,
        table: &str,
        version: VersionKey,
        identity: &PackageIdentity,
    ) -> Result<()> {
        Ok(self.write_table_row(table, version, identity).await?)
    }

    async fn drop_tables(&self, identity: &PackageIdentity) -> Result<Vec<String>> {
        let dropped = self.drop_recorded(identity).await?;
        info!(
            product = %identity.product,
            bundle = %identity.bundle,
            count = dropped.len(),
            "Dropped recorded tables"
        );
        Ok(dropped)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_column_conversion() {
        let version = VersionKey::new(3, 1234);
        let (feed, seq) = to_columns(version).unwrap();
        assert_eq!(from_columns(feed, seq).unwrap(), version);
    }

    #[test]
    fn test_column_conversion_rejects_out_of_range() {
        assert!(to_columns(VersionKey::new(1, u64::MAX)).is_err());
        assert!(from_columns(-1, 0).is_err());
        assert!(from_columns(i64::from(u32::MAX) + 1, 0).is_err());
        assert!(from_columns(1, -5).is_err());
    }
}
