use crate::core::{Result, StreamError};
use crate::http::HttpConfig;
use std::sync::Arc;
#[cfg(all(not(feature = "reqwest"), feature = "curl"))]
use std::time::Duration;

#[cfg(all(not(feature = "reqwest"), feature = "curl"))]
use ahash::{HashMap, HashMapExt};

#[derive(Debug)]
pub struct HttpResponse {
    pub data: Vec<u8>,
    pub status: u16,
    pub content_length: Option<u64>,
    pub content_range: Option<(u64, u64)>,
}

impl HttpResponse {
    pub fn new(
        data: Vec<u8>,
        status: u16,
        content_length: Option<u64>,
        content_range: Option<(u64, u64)>,
    ) -> Self {
        Self {
            data,
            status,
            content_length,
            content_range,
        }
    }
}

/// Blocking HTTP transport used by [`crate::http::HttpBackend`].
///
/// Calls are made from the blocking thread pool, never from an async task.
pub trait BlockingHttp: Send + Sync {
    fn get_content_length(&self, url: &str) -> Result<u64>;
    fn get_range(&self, url: &str, start: u64, end: u64) -> Result<HttpResponse>;
}

#[cfg(all(not(feature = "reqwest"), not(feature = "curl")))]
compile_error!("Enable either `curl` (default) or `reqwest` feature.");

pub(crate) fn build_default_transport(config: &HttpConfig) -> Result<Arc<dyn BlockingHttp>> {
    #[cfg(feature = "reqwest")]
    {
        Ok(Arc::new(ReqwestTransport::new(config)?))
    }
    #[cfg(all(not(feature = "reqwest"), feature = "curl"))]
    {
        Ok(Arc::new(CurlBlockingTransport::new(config)))
    }
}

pub(crate) fn parse_content_range(header: &str) -> Option<(u64, u64)> {
    let parts: Vec<&str> = header.split_whitespace().collect();
    if parts.len() < 2 || parts[0] != "bytes" {
        return None;
    }

    let range_part = parts[1].split('/').next()?;
    let mut range_iter = range_part.split('-');

    let start = range_iter.next()?.parse::<u64>().ok()?;
    let end = range_iter.next()?.parse::<u64>().ok()?;

    Some((start, end))
}

/// Status handling shared by both transports for a ranged GET.
fn check_range_response(response: HttpResponse, url: &str, start: u64) -> Result<HttpResponse> {
    match response.status {
        // asked for bytes past the end of the file
        416 => Ok(HttpResponse {
            data: Vec::new(),
            ..response
        }),
        404 => Err(StreamError::NotFound(url.to_string())),
        200 => Err(StreamError::Protocol(
            "Server does not support Range requests (returned 200 instead of 206)".into(),
        )),
        206 => {
            if let Some((resp_start, _)) = response.content_range
                && resp_start != start
            {
                return Err(StreamError::Protocol(
                    "Server returned incorrect range start".into(),
                ));
            }
            Ok(response)
        }
        status if status >= 500 => Err(StreamError::Network(format!("HTTP error: {status}"))),
        status => Err(StreamError::Protocol(format!("HTTP error: {status}"))),
    }
}

fn check_head_status(status: u16, content_length: Option<u64>, url: &str) -> Result<u64> {
    match status {
        404 => Err(StreamError::NotFound(url.to_string())),
        200..=299 => content_length.ok_or_else(|| {
            StreamError::Protocol(format!("No Content-Length for {url}"))
        }),
        status if status >= 500 => Err(StreamError::Network(format!("HTTP error: {status}"))),
        status => Err(StreamError::Protocol(format!("HTTP error: {status}"))),
    }
}

/// Drives the async reqwest client from the blocking pool.
///
/// Each call blocks on the runtime that spawned the blocking task, so the
/// client never owns a runtime of its own and can be created or dropped on
/// any thread.
#[cfg(feature = "reqwest")]
struct ReqwestTransport {
    client: reqwest::Client,
}

#[cfg(feature = "reqwest")]
impl ReqwestTransport {
    fn new(config: &HttpConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.read_timeout)
            .connect_timeout(config.connect_timeout)
            .pool_idle_timeout(config.idle_timeout)
            .build()
            .map_err(|e| StreamError::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { client })
    }

    fn block_on<F: std::future::Future>(&self, fut: F) -> Result<F::Output> {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|e| StreamError::Protocol(format!("no runtime for HTTP request: {e}")))?;
        Ok(handle.block_on(fut))
    }
}

#[cfg(feature = "reqwest")]
impl BlockingHttp for ReqwestTransport {
    fn get_content_length(&self, url: &str) -> Result<u64> {
        let response = self
            .block_on(self.client.head(url).send())?
            .map_err(|e| StreamError::Network(e.to_string()))?;

        check_head_status(response.status().as_u16(), response.content_length(), url)
    }

    fn get_range(&self, url: &str, start: u64, end: u64) -> Result<HttpResponse> {
        let range_header = format!("bytes={}-{}", start, end);

        self.block_on(async {
            let response = self
                .client
                .get(url)
                .header("Range", range_header)
                .send()
                .await
                .map_err(|e| StreamError::Network(e.to_string()))?;

            let status = response.status().as_u16();
            let content_length = response.content_length();

            let content_range = response
                .headers()
                .get("content-range")
                .and_then(|v| v.to_str().ok())
                .and_then(parse_content_range);

            let data = if status == 206 {
                response
                    .bytes()
                    .await
                    .map_err(|e| StreamError::Network(e.to_string()))?
                    .to_vec()
            } else {
                Vec::new()
            };

            check_range_response(
                HttpResponse::new(data, status, content_length, content_range),
                url,
                start,
            )
        })?
    }
}

#[cfg(all(not(feature = "reqwest"), feature = "curl"))]
struct CurlBlockingTransport {
    connect_timeout: Duration,
    read_timeout: Duration,
}

#[cfg(all(not(feature = "reqwest"), feature = "curl"))]
impl CurlBlockingTransport {
    fn new(config: &HttpConfig) -> Self {
        Self {
            connect_timeout: config.connect_timeout,
            read_timeout: config.read_timeout,
        }
    }

    fn request(
        &self,
        url: &str,
        head_only: bool,
        range: Option<(u64, u64)>,
    ) -> Result<HttpResponse> {
        let net = |e: curl::Error| StreamError::Network(e.to_string());

        let mut easy = curl::easy::Easy::new();
        easy.url(url).map_err(net)?;
        easy.connect_timeout(self.connect_timeout).map_err(net)?;
        easy.timeout(self.read_timeout).map_err(net)?;
        easy.follow_location(true).map_err(net)?;

        if head_only {
            easy.nobody(true).map_err(net)?;
            easy.custom_request("HEAD").map_err(net)?;
        }

        if let Some((start, end)) = range {
            easy.range(&format!("{start}-{end}")).map_err(net)?;
        }

        let mut data = Vec::new();
        let mut headers = HashMap::<String, String>::new();

        {
            let mut transfer = easy.transfer();
            transfer
                .write_function(|chunk| {
                    data.extend_from_slice(chunk);
                    Ok(chunk.len())
                })
                .map_err(net)?;

            transfer
                .header_function(|header| {
                    if let Ok(line) = std::str::from_utf8(header) {
                        let line = line.trim();
                        if let Some((name, value)) = line.split_once(':') {
                            headers.insert(name.trim().to_ascii_lowercase(), value.trim().into());
                        }
                    }
                    true
                })
                .map_err(net)?;

            transfer.perform().map_err(net)?;
        }

        let status = easy.response_code().map_err(net)? as u16;
        let content_length = headers
            .get("content-length")
            .and_then(|v| v.parse::<u64>().ok());
        let content_range = headers
            .get("content-range")
            .and_then(|value| parse_content_range(value));

        Ok(HttpResponse::new(data, status, content_length, content_range))
    }
}

#[cfg(all(not(feature = "reqwest"), feature = "curl"))]
impl BlockingHttp for CurlBlockingTransport {
    fn get_content_length(&self, url: &str) -> Result<u64> {
        let response = self.request(url, true, None)?;
        check_head_status(response.status, response.content_length, url)
    }

    fn get_range(&self, url: &str, start: u64, end: u64) -> Result<HttpResponse> {
        let response = self.request(url, false, Some((start, end)))?;
        check_range_response(response, url, start)
    }
}
