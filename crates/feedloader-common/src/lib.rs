//! Feedloader Common Library
//!
//! Shared types, error handling and logging for the feed loader workspace.
//!
//! - **Types**: version keys, package identities, catalog entries and
//!   package metadata
//! - **Error Handling**: `FeedError` and the `Result` alias
//! - **Logging**: global `tracing` subscriber setup
//!
//! # Example
//!
//! ```
//! use feedloader_common::types::VersionKey;
//!
//! let stored = VersionKey::new(1, 1);
//! let observed = VersionKey::new(1, 2);
//! assert!(observed.is_newer_than(&stored));
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod error;
pub mod logging;
pub mod types;

pub use error::{ErrorKind, FeedError, Result};
pub use types::{CatalogEntry, PackageIdentity, PackageMetadata, VersionKey};
