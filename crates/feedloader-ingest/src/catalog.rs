//! Vendor file-name catalog
//!
//! Turns a remote directory listing into [`CatalogEntry`] records. The vendor
//! encodes everything in the file name:
//!
//! ```text
//! /datafeeds/people/ppl_premium/ppl_premium_v1_full_1234.zip   full archive
//! /datafeeds/people/ppl_premium/ppl_premium_v1_1235.zip        incremental
//! /datafeeds/documents/docs_ppl/ppl_v1_schema_12.zip           schema document
//! ```
//!
//! Names are only meaningful relative to the prefix they are decoded against,
//! so every function here takes the bundle (or dataset) explicitly. Names that
//! do not fit the grammar are dropped without error: vendor directories mix
//! archives with documentation and nested folders.

use feedloader_common::{CatalogEntry, VersionKey};
use tracing::debug;

use crate::remote::{join_remote, RemoteEntry};

/// Token marking a full (snapshot) archive
pub const FULL_MARKER: &str = "full";

/// Token in third position of a schema document name
pub const SCHEMA_MARKER: &str = "schema";

/// Decoded tokens of a residual name (prefix and extension removed)
#[derive(Debug, Default, PartialEq, Eq)]
struct NameTokens {
    feed_version: Option<u32>,
    sequence: Option<u64>,
    full: bool,
}

impl NameTokens {
    fn decode(residual: &str) -> Self {
        let mut tokens = Self::default();

        for token in residual.split('_') {
            if token == FULL_MARKER {
                tokens.full = true;
            } else if let Some(digits) = token.strip_prefix('v').filter(|d| is_numeric(d)) {
                if let Ok(feed_version) = digits.parse() {
                    tokens.feed_version = Some(feed_version);
                }
            } else if is_numeric(token) {
                if let Ok(sequence) = token.parse() {
                    tokens.sequence = Some(sequence);
                }
            }
        }

        tokens
    }

    /// A version needs both halves; anything less is unversioned
    fn version(&self) -> Option<VersionKey> {
        match (self.feed_version, self.sequence) {
            (Some(feed_version), Some(sequence)) => Some(VersionKey::new(feed_version, sequence)),
            _ => None,
        }
    }
}

fn is_numeric(token: &str) -> bool {
    !token.is_empty() && token.bytes().all(|b| b.is_ascii_digit())
}

/// Strip `<prefix>_` and the extension, requiring the residual to start at a
/// `v` token. Everything from the first `.` is extension so `.tar.gz` works.
fn residual_name<'a>(name: &'a str, prefix: &str) -> Option<&'a str> {
    let rest = name.strip_prefix(prefix)?.strip_prefix('_')?;
    if !rest.starts_with('v') {
        return None;
    }
    Some(rest.split_once('.').map_or(rest, |(stem, _)| stem))
}

/// Decode data archive names belonging to `bundle`.
///
/// Only archives of the requested kind are returned: a full-load request
/// admits only full archives, an incremental request only non-full ones.
pub fn parse_catalog(
    bundle: &str,
    dir: &str,
    entries: &[RemoteEntry],
    want_full_archive: bool,
) -> Vec<CatalogEntry> {
    entries
        .iter()
        .filter_map(|entry| parse_data_entry(bundle, dir, entry))
        .filter(|entry| entry.is_full_archive == want_full_archive)
        .collect()
}

fn parse_data_entry(bundle: &str, dir: &str, entry: &RemoteEntry) -> Option<CatalogEntry> {
    if entry.is_directory {
        debug!(name = %entry.name, "Skipping directory");
        return None;
    }

    let Some(residual) = residual_name(&entry.name, bundle) else {
        debug!(name = %entry.name, bundle = %bundle, "Skipping file outside bundle");
        return None;
    };

    let tokens = NameTokens::decode(residual);
    Some(CatalogEntry {
        raw_name: entry.name.clone(),
        path: join_remote(dir, &entry.name),
        version: tokens.version(),
        is_full_archive: tokens.full,
    })
}

/// Decode schema document names for `dataset`.
///
/// Grammar: `<dataset>_v<feed>_schema_<sequence>.<ext>`. Entries whose third
/// underscore-delimited token is not the schema marker (the `docs` index,
/// release notes) are skipped.
pub fn parse_schema_catalog(dataset: &str, dir: &str, entries: &[RemoteEntry]) -> Vec<CatalogEntry> {
    entries
        .iter()
        .filter(|entry| !entry.is_directory)
        .filter_map(|entry| {
            let residual = residual_name(&entry.name, dataset)?;
            if residual.split('_').nth(1) != Some(SCHEMA_MARKER) {
                debug!(name = %entry.name, "Skipping non-schema document");
                return None;
            }

            Some(CatalogEntry {
                raw_name: entry.name.clone(),
                path: join_remote(dir, &entry.name),
                version: NameTokens::decode(residual).version(),
                is_full_archive: false,
            })
        })
        .collect()
}
