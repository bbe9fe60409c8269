//! Loader configuration
//!
//! Everything comes from the environment (a `.env` file is honoured by the
//! binary through `dotenvy`). The package list is a single string:
//!
//! ```text
//! PACKAGES="ppl,people,ppl_premium,ppl_premium,1;ent,entity,ent_entity_advanced,1"
//! ```
//!
//! Packages are separated by `;`, fields by `,`. The five-field form is
//! `dataset,fsPackage,product,bundle,feedVersion`; the four-field form leaves
//! out the bundle, which then equals the product.

use anyhow::Context;
use feedloader_common::{FeedError, PackageIdentity, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// ============================================================================
// Loader Configuration Constants
// ============================================================================

/// Root of the vendor feed tree
pub const DEFAULT_BASE_DIR: &str = "/datafeeds";

/// Default local working directory
pub const DEFAULT_WORKSPACE: &str = "/tmp/feedloader";

/// Required final path component of the working directory. The directory is
/// emptied at the start and end of every run.
pub const WORKSPACE_GUARD: &str = "feedloader";

/// Directory holding every dataset's schema documentation
pub const DOCUMENTS_DIR: &str = "documents";

/// Loader configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// Local staging directory for downloads and unpacked files
    pub workspace: PathBuf,

    /// Remote root, `/datafeeds` on the vendor server
    pub base_dir: String,

    /// Packages in the order they are processed
    pub packages: Vec<PackageIdentity>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            workspace: PathBuf::from(DEFAULT_WORKSPACE),
            base_dir: DEFAULT_BASE_DIR.to_string(),
            packages: Vec::new(),
        }
    }
}

impl LoaderConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let packages = match lookup("PACKAGES") {
            Some(raw) => parse_packages(&raw).context("Invalid PACKAGES")?,
            None => Vec::new(),
        };

        let config = Self {
            workspace: lookup("WORKSPACE")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_WORKSPACE)),
            base_dir: lookup("FEED_BASE_DIR").unwrap_or_else(|| DEFAULT_BASE_DIR.to_string()),
            packages,
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        check_workspace(&self.workspace)?;

        if self.base_dir.trim().is_empty() {
            anyhow::bail!("Feed base directory cannot be empty");
        }

        if self.packages.is_empty() {
            tracing::warn!("No packages configured - nothing will be loaded");
        }

        Ok(())
    }

    /// Remote directory holding a package's data archives:
    /// `<base>/<fsPackage>/<product>`
    pub fn data_dir(&self, identity: &PackageIdentity) -> String {
        format!(
            "{}/{}/{}",
            self.base_dir.trim_end_matches('/'),
            identity.fs_package,
            identity.product
        )
    }

    /// Remote directory holding a dataset's schema documents:
    /// `<base>/documents/docs_<dataset>`
    pub fn schema_dir(&self, identity: &PackageIdentity) -> String {
        format!(
            "{}/{}/docs_{}",
            self.base_dir.trim_end_matches('/'),
            DOCUMENTS_DIR,
            identity.dataset
        )
    }
}

/// Parse the `;`-separated package list.
///
/// Blank segments are ignored so a trailing `;` is harmless.
pub fn parse_packages(raw: &str) -> Result<Vec<PackageIdentity>> {
    raw.split(';')
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .map(parse_package)
        .collect()
}

fn parse_package(segment: &str) -> Result<PackageIdentity> {
    let fields: Vec<&str> = segment.split(',').map(str::trim).collect();

    let (dataset, fs_package, product, bundle, feed_version) = match fields.as_slice() {
        [dataset, fs_package, product, bundle, feed_version] => {
            (*dataset, *fs_package, *product, *bundle, *feed_version)
        },
        [dataset, fs_package, product, feed_version] => {
            (*dataset, *fs_package, *product, *product, *feed_version)
        },
        _ => {
            return Err(FeedError::Config(format!(
                "Package '{}' must have 4 or 5 comma-separated fields, found {}",
                segment,
                fields.len()
            )))
        },
    };

    if [dataset, fs_package, product, bundle].iter().any(|f| f.is_empty()) {
        return Err(FeedError::Config(format!("Package '{}' has an empty field", segment)));
    }

    let feed_version = feed_version.parse::<u32>().map_err(|_| {
        FeedError::Config(format!(
            "Package '{}' has a non-numeric feed version '{}'",
            segment, feed_version
        ))
    })?;

    Ok(PackageIdentity::new(dataset, fs_package, product, bundle, feed_version))
}

/// Refuse to work in a directory whose last component is not
/// [`WORKSPACE_GUARD`].
pub fn check_workspace(path: &Path) -> Result<()> {
    match path.file_name().and_then(|name| name.to_str()) {
        Some(WORKSPACE_GUARD) => Ok(()),
        _ => Err(FeedError::Config(format!(
            "Workspace {} must end in '{}'",
            path.display(),
            WORKSPACE_GUARD
        ))),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use feedloader_common::ErrorKind;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = LoaderConfig::default();
        assert_eq!(config.base_dir, "/datafeeds");
        assert_eq!(config.workspace, PathBuf::from("/tmp/feedloader"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_five_and_four_field_packages() {
        let packages =
            parse_packages("ppl,people,ppl_premium,ppl_premium,1; ff,fundamentals,ff_advanced_ap_v3,2;")
                .unwrap();

        assert_eq!(packages.len(), 2);
        assert_eq!(
            packages[0],
            PackageIdentity::new("ppl", "people", "ppl_premium", "ppl_premium", 1)
        );
        assert_eq!(packages[1].bundle, "ff_advanced_ap_v3");
        assert_eq!(packages[1].feed_version, 2);
    }

    #[test]
    fn test_parse_rejects_bad_packages() {
        let wrong_count = parse_packages("ppl,people,1").unwrap_err();
        assert_eq!(wrong_count.kind(), ErrorKind::Config);

        let bad_version = parse_packages("ppl,people,ppl_premium,one").unwrap_err();
        assert!(bad_version.to_string().contains("non-numeric"));

        assert!(parse_packages("ppl,,ppl_premium,1").is_err());
    }

    #[test]
    fn test_from_lookup() {
        let config = LoaderConfig::from_lookup(lookup(&[
            ("PACKAGES", "ppl,people,ppl_premium,1"),
            ("WORKSPACE", "/var/tmp/feedloader"),
            ("FEED_BASE_DIR", "/mirror/"),
        ]))
        .unwrap();

        assert_eq!(config.packages.len(), 1);
        assert_eq!(config.workspace, PathBuf::from("/var/tmp/feedloader"));
        assert_eq!(config.data_dir(&config.packages[0]), "/mirror/people/ppl_premium");
        assert_eq!(config.schema_dir(&config.packages[0]), "/mirror/documents/docs_ppl");
    }

    #[test]
    fn test_from_lookup_rejects_unguarded_workspace() {
        let result = LoaderConfig::from_lookup(lookup(&[("WORKSPACE", "/home/me")]));
        assert!(result.is_err());
    }

    #[test]
    fn test_check_workspace() {
        assert!(check_workspace(Path::new("/tmp/feedloader")).is_ok());
        assert!(check_workspace(Path::new("/tmp/feedloader/")).is_ok());
        assert!(check_workspace(Path::new("/tmp")).is_err());
        assert!(check_workspace(Path::new("/")).is_err());
    }

    #[test]
    fn test_remote_directories() {
        let config = LoaderConfig::default();
        let identity = PackageIdentity::new("ent", "entity", "ent_entity_advanced", "ent_entity_advanced", 1);
        assert_eq!(config.data_dir(&identity), "/datafeeds/entity/ent_entity_advanced");
        assert_eq!(config.schema_dir(&identity), "/datafeeds/documents/docs_ent");
    }
}
