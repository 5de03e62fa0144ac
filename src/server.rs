//! HTTP surface: `GET /stream/{index}/{*path}` with byte-range support.

use std::time::Instant;

use anyhow::Context;
use axum::Router;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use crate::assembler::StreamAssembler;
use crate::config::Config;
use crate::core::{BackendRegistry, Result, StreamError};
use crate::plan::{ChunkPlan, ChunkPolicy};
use crate::range::parse_range;
use crate::response::ResponseHead;

/// Shared, read-only state handed to every request.
#[derive(Clone)]
pub struct AppState {
    pub registry: BackendRegistry,
    pub policy: ChunkPolicy,
    pub content_type: HeaderValue,
}

impl AppState {
    /// Fails when `content_type` cannot be sent as a header value.
    pub fn new(registry: BackendRegistry, policy: ChunkPolicy, content_type: &str) -> Result<Self> {
        let content_type = HeaderValue::from_str(content_type)
            .map_err(|_| StreamError::Config(format!("invalid content type {content_type:?}")))?;
        Ok(Self {
            registry,
            policy,
            content_type,
        })
    }

    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let registry = config.build_registry()?;
        let state = Self::new(
            registry,
            config.stream.policy(),
            &config.stream.content_type,
        )?;
        Ok(state)
    }
}

impl IntoResponse for StreamError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status.is_server_error() {
            error!(status = %status, error = %self, "Stream request failed");
        }

        let body = json!({
            "error": self.to_string(),
            "code": self.code(),
        });

        (status, axum::Json(body)).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/stream/{index}/{*path}", get(stream_file))
        .route("/health", get(|| async { "ok" }))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /stream/{index}/{*path}
///
/// Plans aligned backend reads for the requested range and streams them as
/// the body. The first window is fetched before the head is sent, so a
/// backend that fails straight away answers 502. The rest of the body is
/// pulled window by window as the client reads, so a disconnect stops
/// further backend fetches.
pub async fn stream_file(
    State(state): State<AppState>,
    Path((index, path)): Path<(usize, String)>,
    headers: HeaderMap,
) -> Result<Response> {
    let started = Instant::now();
    let backend = state.registry.resolve(index)?;

    let range_header = headers.get(header::RANGE);

    let total_size = backend.size(&path).await?;
    debug!(
        backend = backend.name(),
        %path,
        total_size,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Resolved file size"
    );

    if total_size == 0 && range_header.is_none() {
        return Ok(ResponseHead::empty(&state.content_type).into_response(Body::empty()));
    }

    let range_header = match range_header.map(HeaderValue::to_str).transpose() {
        Ok(value) => value,
        Err(_) => {
            warn!(%path, "Non-ASCII Range header");
            return Ok(ResponseHead::unsatisfiable(total_size).into_response(Body::empty()));
        }
    };

    let (range, kind) = match parse_range(range_header, total_size) {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!(%path, error = %e, "Unsatisfiable range");
            return Ok(ResponseHead::unsatisfiable(total_size).into_response(Body::empty()));
        }
    };

    let plan = ChunkPlan::new(range, total_size, state.policy)?;
    debug!(
        %path,
        from = range.from,
        until = range.until,
        chunk_size = plan.chunk_size,
        offset = plan.offset,
        part_count = plan.part_count,
        first_part_cut = plan.first_part_cut,
        last_part_cut = plan.last_part_cut,
        "Planned stream"
    );

    let body = StreamAssembler::new(backend, path, plan).start().await?;
    let head = ResponseHead::new(range, total_size, kind, &state.content_type);
    Ok(head.into_response(Body::from_stream(body)))
}

/// Bind the configured address and serve until `shutdown` is cancelled.
pub async fn run(config: &Config, shutdown: CancellationToken) -> anyhow::Result<()> {
    let state = AppState::from_config(config)?;
    if state.registry.is_empty() {
        warn!("No backends configured, every stream request will fail");
    }

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("Listening on {}", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .context("Server error")?;

    Ok(())
}
