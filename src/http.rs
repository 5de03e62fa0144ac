use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, warn};

use crate::core::{Backend, Result, StreamError};
use crate::plug::{BlockingHttp, build_default_transport};

#[derive(Clone, Debug)]
pub struct HttpConfig {
    pub retry_max_attempts: usize,
    pub retry_base_delay: Duration,
    pub retry_max_delay: Duration,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub idle_timeout: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            retry_max_attempts: 3,
            retry_base_delay: Duration::from_millis(50),
            retry_max_delay: Duration::from_secs(2),
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(30),
        }
    }
}

fn retry_delay(base: Duration, max: Duration, attempt: usize) -> Duration {
    let shift = attempt.min(20);
    let mult = 1u32.checked_shl(shift as u32).unwrap_or(u32::MAX);
    let delay = base.checked_mul(mult).unwrap_or(max);
    if delay > max { max } else { delay }
}

const HEX: [u8; 16] = *b"0123456789ABCDEF";

/// Percent-encode each segment of a slash separated path.
fn encode_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for (i, segment) in path.split('/').filter(|s| !s.is_empty()).enumerate() {
        if i > 0 {
            out.push('/');
        }
        for b in segment.bytes() {
            match b {
                b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                    out.push(b as char);
                }
                _ => {
                    out.push('%');
                    out.push(char::from(HEX[(b >> 4) as usize]));
                    out.push(char::from(HEX[(b & 0x0f) as usize]));
                }
            }
        }
    }
    out
}

/// Errors that escape the retry loop are reported to the core as failed
/// fetches. A missing file stays a `NotFound`.
fn surface(err: StreamError) -> StreamError {
    match err {
        StreamError::Network(msg) | StreamError::Protocol(msg) => StreamError::FetchFailed(msg),
        other => other,
    }
}

/// Files behind an HTTP server that honours `Range` requests, such as
/// `rclone serve http` in front of a cloud remote.
///
/// Network failures are retried with exponential backoff up to
/// `retry_max_attempts` times. Everything else fails immediately.
pub struct HttpBackend {
    base_url: Arc<str>,
    transport: Arc<dyn BlockingHttp>,
    config: HttpConfig,
}

pub struct HttpBackendBuilder {
    base_url: String,
    config: HttpConfig,
    transport: Option<Arc<dyn BlockingHttp>>,
}

impl HttpBackendBuilder {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            config: HttpConfig::default(),
            transport: None,
        }
    }

    pub fn transport(mut self, transport: Arc<dyn BlockingHttp>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn config(mut self, config: HttpConfig) -> Self {
        self.config = config;
        self
    }

    pub fn retry_max_attempts(mut self, attempts: usize) -> Self {
        self.config.retry_max_attempts = attempts;
        self
    }

    pub fn retry_base_delay(mut self, delay: Duration) -> Self {
        self.config.retry_base_delay = delay;
        self
    }

    pub fn retry_max_delay(mut self, delay: Duration) -> Self {
        self.config.retry_max_delay = delay;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.config.read_timeout = timeout;
        self
    }

    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.idle_timeout = timeout;
        self
    }

    pub fn build(self) -> Result<HttpBackend> {
        let base_url = self.base_url.trim_end_matches('/');
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(StreamError::Config(format!(
                "backend url must be http(s): {}",
                self.base_url
            )));
        }

        let transport = match self.transport {
            Some(transport) => transport,
            None => build_default_transport(&self.config)?,
        };

        Ok(HttpBackend {
            base_url: Arc::from(base_url),
            transport,
            config: self.config,
        })
    }
}

impl HttpBackend {
    pub fn builder(base_url: impl Into<String>) -> HttpBackendBuilder {
        HttpBackendBuilder::new(base_url)
    }

    pub fn url_for(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, encode_path(path))
    }

    async fn with_retry<T, F>(&self, call: F) -> Result<T>
    where
        T: Send + 'static,
        F: Fn(&dyn BlockingHttp) -> Result<T> + Clone + Send + 'static,
    {
        let mut attempt = 0;
        loop {
            let transport = Arc::clone(&self.transport);
            let call_once = call.clone();
            let result = tokio::task::spawn_blocking(move || call_once(transport.as_ref()))
                .await
                .map_err(|e| StreamError::Protocol(format!("transport task failed: {e}")))?;

            match result {
                Ok(v) => return Ok(v),
                Err(StreamError::Network(err)) => {
                    if attempt >= self.config.retry_max_attempts {
                        return Err(StreamError::Network(err));
                    }
                    warn!(attempt = attempt + 1, error = %err, "Backend request failed, retrying");
                }
                Err(e) => return Err(e),
            }

            let delay = retry_delay(
                self.config.retry_base_delay,
                self.config.retry_max_delay,
                attempt,
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn size(&self, path: &str) -> Result<u64> {
        let url = self.url_for(path);
        self.with_retry(move |transport| transport.get_content_length(&url))
            .await
            .map_err(surface)
    }

    async fn fetch_chunk(&self, path: &str, offset: u64, length: u64) -> Result<Bytes> {
        if length == 0 {
            return Ok(Bytes::new());
        }

        let url = self.url_for(path);
        let end = offset + length - 1;
        debug!(%url, offset, length, "Fetching window");

        let response = self
            .with_retry(move |transport| transport.get_range(&url, offset, end))
            .await
            .map_err(surface)?;

        if response.data.len() as u64 > length {
            return Err(StreamError::FetchFailed(format!(
                "backend returned {} bytes for a {length} byte window",
                response.data.len()
            )));
        }

        Ok(Bytes::from(response.data))
    }

    fn name(&self) -> &str {
        &self.base_url
    }
}
