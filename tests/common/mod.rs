//! Shared fixtures for the HTTP integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response};
use bytes::Bytes;
use chunkstream::server::{AppState, router};
use chunkstream::{Backend, BackendRegistry, ChunkPolicy, Result, StreamError};
use http_body_util::BodyExt;
use tower::ServiceExt;

/// In-memory files with optional failure injection on a window offset.
#[derive(Default)]
pub struct MemoryBackend {
    files: HashMap<String, Vec<u8>>,
    fail_at: Mutex<Option<u64>>,
    pub fetches: Mutex<Vec<(String, u64, u64)>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, path: &str, data: Vec<u8>) -> Self {
        self.files.insert(path.to_string(), data);
        self
    }

    pub fn fail_at(&self, offset: u64) {
        *self.fail_at.lock().unwrap() = Some(offset);
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.lock().unwrap().len()
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn size(&self, path: &str) -> Result<u64> {
        self.files
            .get(path)
            .map(|data| data.len() as u64)
            .ok_or_else(|| StreamError::NotFound(path.to_string()))
    }

    async fn fetch_chunk(&self, path: &str, offset: u64, length: u64) -> Result<Bytes> {
        self.fetches
            .lock()
            .unwrap()
            .push((path.to_string(), offset, length));
        if *self.fail_at.lock().unwrap() == Some(offset) {
            return Err(StreamError::FetchFailed("injected failure".into()));
        }
        let data = self
            .files
            .get(path)
            .ok_or_else(|| StreamError::NotFound(path.to_string()))?;
        let start = (offset as usize).min(data.len());
        let end = (start + length as usize).min(data.len());
        Ok(Bytes::copy_from_slice(&data[start..end]))
    }
}

/// Deterministic, non-repeating-per-chunk test content.
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 253) as u8).collect()
}

pub fn app(backend: Arc<MemoryBackend>, chunk_size: u64) -> Router {
    let registry = BackendRegistry::new().with_backend(backend);
    router(AppState::new(
        registry,
        ChunkPolicy::Fixed(chunk_size),
        "video/mp4",
    )
    .unwrap())
}

pub async fn get(app: Router, uri: &str, range: Option<&str>) -> Response<Body> {
    let mut request = Request::builder().uri(uri);
    if let Some(range) = range {
        request = request.header("range", range);
    }
    app.oneshot(request.body(Body::empty()).unwrap())
        .await
        .unwrap()
}

pub async fn body_bytes(response: Response<Body>) -> std::result::Result<Bytes, axum::Error> {
    response.into_body().collect().await.map(|c| c.to_bytes())
}

pub fn header<'a>(response: &'a Response<Body>, name: &str) -> &'a str {
    response.headers().get(name).unwrap().to_str().unwrap()
}
