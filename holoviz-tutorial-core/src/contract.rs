//! Shared seams and error types for the tutorial tooling.
//!
//! The network is reached only through [`Transport`], so fetch logic can be
//! exercised against a mock (`MockTransport`, exported under the
//! `test-export-mocks` feature) or a local HTTP server.
//! Whole-run orchestration sits behind [`Fetcher`].

use async_trait::async_trait;
use futures::stream::BoxStream;
use std::path::PathBuf;

use mockall::automock;

use crate::download::FetchReport;

/// Errors raised while packaging the tutorial archive.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    /// A required top-level file is absent. Nothing has been written.
    #[error("required file not found: {}", path.display())]
    MissingFile { path: PathBuf },

    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to walk {}: {source}", root.display())]
    Walk {
        root: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("failed to write archive member {member}: {source}")]
    Zip {
        member: String,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("failed to move finished archive into {}: {source}", path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised while expanding a downloaded container.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("I/O error extracting {}: {source}", archive.display())]
    Io {
        archive: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt or unsupported archive {}: {source}", archive.display())]
    Zip {
        archive: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },
}

/// Errors raised while fetching a single download target.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} answered with HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error("worker for {filename} stopped unexpectedly: {reason}")]
    Worker { filename: String, reason: String },
}

/// Errors raised while reading the dependency manifest.
#[derive(Debug, thiserror::Error)]
pub enum VersionCheckError {
    #[error("failed to read manifest {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse manifest {} as TOML: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// A streaming response body. `content_length` is advisory.
pub struct RemoteBody {
    pub content_length: Option<u64>,
    pub chunks: BoxStream<'static, Result<Vec<u8>, FetchError>>,
}

impl std::fmt::Debug for RemoteBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteBody")
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// Network seam for the dataset fetcher.
///
/// Implementors issue one streaming GET per call and must report non-success
/// statuses as [`FetchError::Status`].
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    async fn open(&self, url: &str) -> Result<RemoteBody, FetchError>;
}

/// Fetches every configured target and reports one outcome per target.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch_all(&self) -> FetchReport;
}
