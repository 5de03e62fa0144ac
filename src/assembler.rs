use std::sync::Arc;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use tracing::{debug, error};

use crate::core::{Backend, Result, StreamError};
use crate::plan::ChunkPlan;

/// Pulls the windows of a [`ChunkPlan`] from a backend, one at a time and
/// in order, and trims them down to the requested bytes.
///
/// Nothing is fetched until [`next`](Self::next) is awaited, and a window
/// is only requested once the previous one has been handed out. After an
/// error or the last window the assembler yields `None` forever.
pub struct StreamAssembler {
    backend: Arc<dyn Backend>,
    path: String,
    plan: ChunkPlan,
    index: u32,
    done: bool,
    delivered: u64,
}

impl StreamAssembler {
    pub fn new(backend: Arc<dyn Backend>, path: impl Into<String>, plan: ChunkPlan) -> Self {
        Self {
            backend,
            path: path.into(),
            plan,
            index: 0,
            done: plan.part_count == 0,
            delivered: 0,
        }
    }

    pub fn plan(&self) -> &ChunkPlan {
        &self.plan
    }

    /// Bytes handed out so far.
    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    pub async fn next(&mut self) -> Option<Result<Bytes>> {
        if self.done {
            return None;
        }

        let index = self.index;
        let result = self.fetch_window(index).await;
        match &result {
            Ok(chunk) => {
                self.delivered += chunk.len() as u64;
                self.index += 1;
                if self.index >= self.plan.part_count {
                    self.done = true;
                    debug!(path = %self.path, bytes = self.delivered, "Stream complete");
                }
            }
            Err(e) => {
                self.done = true;
                error!(
                    path = %self.path,
                    window = index,
                    delivered = self.delivered,
                    error = %e,
                    "Stream aborted"
                );
            }
        }
        Some(result)
    }

    async fn fetch_window(&self, index: u32) -> Result<Bytes> {
        let (offset, length) = self.plan.window(index);
        let mut chunk = self
            .backend
            .fetch_chunk(&self.path, offset, length)
            .await
            .map_err(|e| match e {
                StreamError::FetchFailed(_) => e,
                other => StreamError::FetchFailed(other.to_string()),
            })?;

        let got = chunk.len() as u64;
        if self.plan.is_last(index) {
            // a short last window is fine as long as it still holds the tail
            if got < self.plan.last_part_cut {
                return Err(StreamError::FetchFailed(format!(
                    "window {index} at {offset}: got {got} of {} required bytes",
                    self.plan.last_part_cut
                )));
            }
            chunk.truncate(self.plan.last_part_cut as usize);
        } else if got < length {
            return Err(StreamError::FetchFailed(format!(
                "window {index} at {offset}: got {got} of {length} bytes"
            )));
        }

        if index == 0 {
            let cut = (self.plan.first_part_cut as usize).min(chunk.len());
            chunk = chunk.slice(cut..);
        }
        Ok(chunk)
    }

    /// Adapt into a [`Stream`] suitable for a response body.
    pub fn into_stream(self) -> impl Stream<Item = Result<Bytes>> + Send + 'static {
        futures::stream::unfold(self, |mut assembler| async move {
            assembler.next().await.map(|item| (item, assembler))
        })
    }

    /// Fetch the first window now and return a stream that starts with it.
    ///
    /// Lets a caller report a failing first fetch as an error response
    /// instead of a truncated body. The remaining windows are still pulled
    /// one at a time.
    pub async fn start(mut self) -> Result<impl Stream<Item = Result<Bytes>> + Send + 'static> {
        let first = match self.next().await {
            Some(Ok(chunk)) => Some(Ok(chunk)),
            Some(Err(e)) => return Err(e),
            None => None,
        };
        Ok(futures::stream::iter(first).chain(self.into_stream()))
    }
}

impl Drop for StreamAssembler {
    fn drop(&mut self) {
        if !self.done {
            debug!(
                path = %self.path,
                window = self.index,
                delivered = self.delivered,
                "Stream abandoned before completion"
            );
        }
    }
}
