//! Domain types shared by the feed loader crates

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// A published revision of a vendor feed.
///
/// Vendor revisions are two-part: a rarely changing feed version (a change
/// implies a new table schema) and a publication sequence that increases
/// within a feed version. Ordering compares the feed version first, then the
/// sequence, which the derived `Ord` gives us through field order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VersionKey {
    pub feed_version: u32,
    pub sequence: u64,
}

impl VersionKey {
    pub const fn new(feed_version: u32, sequence: u64) -> Self {
        Self {
            feed_version,
            sequence,
        }
    }

    /// True when `self` sorts strictly after `other`
    pub fn is_newer_than(&self, other: &VersionKey) -> bool {
        self.cmp(other) == Ordering::Greater
    }
}

impl fmt::Display for VersionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}_{}", self.feed_version, self.sequence)
    }
}

/// Identifies one configured package on the vendor feed.
///
/// File naming and package breakdown, using two real products:
///
/// | field        | people          | entity                  |
/// |--------------|-----------------|-------------------------|
/// | dataset      | `ppl`           | `ent`                   |
/// | fs_package   | `people`        | `entity`                |
/// | product      | `ppl_premium`   | `ent_entity_advanced`   |
/// | bundle       | `ppl_premium`   | `ent_entity_advanced`   |
/// | feed_version | `1`             | `1`                     |
///
/// which resolve to `/datafeeds/people/ppl_premium/ppl_premium_v1_full_1234.zip`
/// and `/datafeeds/documents/docs_ppl/ppl_v1_schema_12.zip`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PackageIdentity {
    /// Selects the schema documentation directory (`docs_<dataset>`)
    pub dataset: String,

    /// First level of the data directory
    pub fs_package: String,

    /// Second level of the data directory
    pub product: String,

    /// Filename prefix, disambiguates products sharing a directory
    pub bundle: String,

    /// Feed version the loader currently targets
    pub feed_version: u32,
}

impl PackageIdentity {
    pub fn new(
        dataset: impl Into<String>,
        fs_package: impl Into<String>,
        product: impl Into<String>,
        bundle: impl Into<String>,
        feed_version: u32,
    ) -> Self {
        Self {
            dataset: dataset.into(),
            fs_package: fs_package.into(),
            product: product.into(),
            bundle: bundle.into(),
            feed_version,
        }
    }
}

impl fmt::Display for PackageIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.product == self.bundle {
            write!(f, "{}", self.product)
        } else {
            write!(f, "{}/{}", self.product, self.bundle)
        }
    }
}

/// One file from a remote listing, decoded against a bundle prefix.
///
/// `version` is `None` when the name carried no usable version tokens; such
/// entries are kept for diagnostics but never selected as latest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub raw_name: String,
    pub path: String,
    pub version: Option<VersionKey>,
    pub is_full_archive: bool,
}

/// Durable record of what has been applied for a package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageMetadata {
    pub identity: PackageIdentity,
    pub schema_version: VersionKey,
    pub schema_loaded_at: DateTime<Utc>,
    pub data_version: VersionKey,
    pub data_loaded_at: DateTime<Utc>,
}
