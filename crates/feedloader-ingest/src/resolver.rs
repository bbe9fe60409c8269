//! Version resolution over a parsed catalog
//!
//! Two independent queries: the newest published schema document, and the
//! newest data archive of a given kind for a target feed version. Both use the
//! [`VersionKey`] total order and keep the first maximum seen in listing order
//! when two entries tie, so a single call is reproducible.

use feedloader_common::{CatalogEntry, FeedError, Result, VersionKey};

/// Newest schema document in a schema catalog.
///
/// Unversioned entries never qualify. An empty catalog, or one with no
/// versioned entry, is `NotFound`.
pub fn latest_schema(catalog: &[CatalogEntry]) -> Result<&CatalogEntry> {
    first_max_by_key(catalog.iter(), |entry| entry.version)
        .ok_or_else(|| FeedError::not_found("There was no schema to process"))
}

/// Version of the newest schema document
pub fn schema_version(catalog: &[CatalogEntry]) -> Result<VersionKey> {
    latest_schema(catalog).and_then(|entry| {
        entry
            .version
            .ok_or_else(|| FeedError::not_found("Latest schema has no version"))
    })
}

/// Newest archive for `target_feed_version` of the requested kind.
///
/// Filters to entries whose feed version equals the target, then picks the
/// greatest sequence.
pub fn latest_archive(
    catalog: &[CatalogEntry],
    target_feed_version: u32,
    want_full_archive: bool,
) -> Result<&CatalogEntry> {
    let candidates = catalog.iter().filter(|entry| {
        entry.is_full_archive == want_full_archive
            && entry
                .version
                .is_some_and(|v| v.feed_version == target_feed_version)
    });

    first_max_by_key(candidates, |entry| entry.version.map(|v| v.sequence)).ok_or_else(|| {
        FeedError::not_found(format!(
            "No {} archive for feed version v{}",
            if want_full_archive { "full" } else { "incremental" },
            target_feed_version
        ))
    })
}

/// Like `Iterator::max_by_key` but keeps the first maximum instead of the
/// last, and skips items whose key is `None`.
fn first_max_by_key<'a, K, F>(
    items: impl Iterator<Item = &'a CatalogEntry>,
    key: F,
) -> Option<&'a CatalogEntry>
where
    K: Ord,
    F: Fn(&CatalogEntry) -> Option<K>,
{
    let mut best: Option<(K, &'a CatalogEntry)> = None;
    for item in items {
        let Some(k) = key(item) else {
            continue;
        };
        match &best {
            Some((best_key, _)) if k <= *best_key => {},
            _ => best = Some((k, item)),
        }
    }
    best.map(|(_, item)| item)
}
