//! Error types for the feed loader

use thiserror::Error;

/// Result type alias for feed loader operations
pub type Result<T> = std::result::Result<T, FeedError>;

/// Main error type for the feed loader
#[derive(Error, Debug)]
pub enum FeedError {
    /// Empty or non-matching listing, or no archive for the target feed version
    #[error("Not found: {0}")]
    NotFound(String),

    /// A name or statement could not be decoded
    #[error("Parse error: {0}")]
    Parse(String),

    /// Remote listing or fetch failed
    #[error("Transport error: {0}")]
    Transport(String),

    /// Metadata or table write failed
    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Archive error: {0}")]
    Archive(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse error category, used when reporting per-package failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Parse,
    Transport,
    Persistence,
    Archive,
    Config,
    Io,
}

impl FeedError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    pub fn persistence(message: impl Into<String>) -> Self {
        Self::Persistence(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            FeedError::NotFound(_) => ErrorKind::NotFound,
            FeedError::Parse(_) => ErrorKind::Parse,
            FeedError::Transport(_) => ErrorKind::Transport,
            FeedError::Persistence(_) => ErrorKind::Persistence,
            FeedError::Archive(_) => ErrorKind::Archive,
            FeedError::Config(_) => ErrorKind::Config,
            FeedError::Io(_) => ErrorKind::Io,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_matches_variant() {
        assert_eq!(FeedError::not_found("x").kind(), ErrorKind::NotFound);
        assert_eq!(FeedError::transport("x").kind(), ErrorKind::Transport);
        assert_eq!(FeedError::persistence("x").kind(), ErrorKind::Persistence);
        let io = FeedError::from(std::io::Error::other("disk"));
        assert_eq!(io.kind(), ErrorKind::Io);
    }

    #[test]
    fn test_display_includes_message() {
        let err = FeedError::not_found("no schema in /datafeeds/documents/docs_ppl");
        assert_eq!(
            err.to_string(),
            "Not found: no schema in /datafeeds/documents/docs_ppl"
        );
    }
}
