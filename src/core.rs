use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Error, Debug)]
pub enum StreamError {
    #[error("Malformed range: {0}")]
    MalformedRange(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unknown backend index: {0}")]
    UnknownBackend(usize),

    #[error("Fetch failed: {0}")]
    FetchFailed(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl StreamError {
    /// Status code the HTTP layer answers with when this error happens
    /// before any body byte was sent.
    pub fn http_status(&self) -> u16 {
        match self {
            StreamError::MalformedRange(_) => 416,
            StreamError::NotFound(_) | StreamError::UnknownBackend(_) => 404,
            StreamError::FetchFailed(_)
            | StreamError::Network(_)
            | StreamError::Protocol(_) => 502,
            StreamError::Io(_) | StreamError::Config(_) => 500,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            StreamError::MalformedRange(_) => "range_not_satisfiable",
            StreamError::NotFound(_) => "not_found",
            StreamError::UnknownBackend(_) => "unknown_backend",
            StreamError::FetchFailed(_) => "fetch_failed",
            StreamError::Network(_) => "network_error",
            StreamError::Protocol(_) => "protocol_error",
            StreamError::Io(_) => "io_error",
            StreamError::Config(_) => "config_error",
        }
    }
}

pub type Result<T> = std::result::Result<T, StreamError>;

/// Remote file storage addressed by path, read in coarse windows.
///
/// Both operations may be slow. Implementations own their retry and
/// deadline policy; callers treat an `Err` as final.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Total size of the file at `path`.
    /// Fails with [`StreamError::NotFound`] when the path does not exist.
    async fn size(&self, path: &str) -> Result<u64>;

    /// Read `length` bytes starting at `offset`.
    /// Returns fewer bytes only when the window runs past end of file.
    async fn fetch_chunk(&self, path: &str, offset: u64, length: u64) -> Result<Bytes>;

    /// Short label used in logs.
    fn name(&self) -> &str {
        "backend"
    }
}

/// Backends available to the server, addressed by their position in the
/// configuration.
#[derive(Clone, Default)]
pub struct BackendRegistry {
    backends: Vec<Arc<dyn Backend>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_backend(mut self, backend: Arc<dyn Backend>) -> Self {
        self.backends.push(backend);
        self
    }

    pub fn push(&mut self, backend: Arc<dyn Backend>) -> usize {
        self.backends.push(backend);
        self.backends.len() - 1
    }

    pub fn resolve(&self, index: usize) -> Result<Arc<dyn Backend>> {
        self.backends
            .get(index)
            .cloned()
            .ok_or(StreamError::UnknownBackend(index))
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}
