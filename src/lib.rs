//! # Chunkstream
//!
//! Chunkstream serves files that live on slow, chunk-addressed remote storage (a cloud
//! drive behind `rclone serve http`, a mounted remote, ...) to HTTP clients that want
//! arbitrary byte ranges. Video players seek a lot; every seek turns into a `Range`
//! request, and every `Range` request turns into a handful of aligned backend reads.
//!
//! ## How a request is served
//!
//! For `GET /stream/{index}/{path}` with `Range: bytes=<from>-<until>`:
//!
//! 1. the backend at `index` is asked for the file size,
//! 2. [`parse_range`] turns the header into an inclusive [`ByteRange`],
//! 3. [`ChunkPlan::new`] aligns the range to the fetch granularity (1 MiB by default)
//!    and works out how much to cut from the first and last window,
//! 4. [`StreamAssembler`] fetches the windows one by one, trims them, and hands them
//!    to the response body as the client reads,
//! 5. [`ResponseHead`] supplies `206` (or `200` without a `Range` header) plus
//!    `Content-Range`, `Accept-Ranges` and `Content-Type`.
//!
//! Backend reads always start on a multiple of the chunk size. Nothing is cached between
//! requests and at most one window per response is held in memory.
//!
//! ## Using the pieces directly
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use chunkstream::{ChunkPlan, ChunkPolicy, LocalBackend, StreamAssembler, parse_range};
//!
//! # async fn demo() -> chunkstream::Result<()> {
//! let backend = Arc::new(LocalBackend::new("/srv/media"));
//! let size = 3_000_000;
//! let (range, _kind) = parse_range(Some("bytes=500000-2500000"), size)?;
//! let plan = ChunkPlan::new(range, size, ChunkPolicy::default())?;
//!
//! let mut assembler = StreamAssembler::new(backend, "movies/big.mp4", plan);
//! while let Some(chunk) = assembler.next().await {
//!     let bytes = chunk?;
//!     println!("{} bytes", bytes.len());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Backends
//!
//! Anything implementing [`Backend`] can be served. Two come with the crate:
//! - [`HttpBackend`]: ranged `GET`s against an HTTP file server, with retries and
//!   exponential backoff on network failures
//! - [`LocalBackend`]: a directory on disk
//!
//! ## Errors
//!
//! - malformed or unsatisfiable ranges answer `416`
//! - missing files and unknown backend indexes answer `404`
//! - the first window is fetched before the head is sent, so a failed fetch there
//!   answers `502`; a later failure cuts the body short, which the client notices
//!   through `Content-Length`
//!
//! ## Feature flags
//!
//! - `curl` (default): use libcurl for the HTTP backend
//! - `reqwest`: use reqwest instead of curl (don't enable both)

pub mod assembler;
pub mod config;
pub mod core;
pub mod http;
pub mod local;
pub mod plan;
pub mod plug;
pub mod range;
pub mod response;
pub mod server;

pub use assembler::*;
pub use self::core::*;
pub use http::*;
pub use local::*;
pub use plan::*;
pub use plug::*;
pub use range::*;
pub use response::*;
