//! Status line and headers of a streamed response.

use axum::body::Body;
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::Response;

use crate::range::{ByteRange, RangeKind};

pub const DEFAULT_CONTENT_TYPE: &str = "video/mp4";

#[derive(Debug, Clone)]
pub struct ResponseHead {
    pub status: StatusCode,
    pub headers: HeaderMap,
}

/// Header text built from byte offsets, which is always visible ASCII.
fn value(s: String) -> HeaderValue {
    HeaderValue::from_str(&s).unwrap_or_else(|_| HeaderValue::from_static(""))
}

impl ResponseHead {
    pub fn new(
        range: ByteRange,
        total_size: u64,
        kind: RangeKind,
        content_type: &HeaderValue,
    ) -> Self {
        let ByteRange { from, until } = range;
        let status = match kind {
            RangeKind::Partial => StatusCode::PARTIAL_CONTENT,
            RangeKind::Full => StatusCode::OK,
        };

        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, content_type.clone());
        headers.insert(header::RANGE, value(format!("bytes={from}-{until}")));
        headers.insert(
            header::CONTENT_RANGE,
            value(format!("bytes {from}-{until}/{total_size}")),
        );
        headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(range.byte_count()));

        Self { status, headers }
    }

    /// 200 with an empty body for a zero-length file.
    pub fn empty(content_type: &HeaderValue) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, content_type.clone());
        headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(0u64));
        Self {
            status: StatusCode::OK,
            headers,
        }
    }

    /// 416 for a range that cannot be served from `total_size` bytes.
    pub fn unsatisfiable(total_size: u64) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_RANGE,
            value(format!("bytes */{total_size}")),
        );
        headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
        Self {
            status: StatusCode::RANGE_NOT_SATISFIABLE,
            headers,
        }
    }

    pub fn into_response(self, body: Body) -> Response {
        let mut response = Response::new(body);
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mp4() -> HeaderValue {
        HeaderValue::from_static("video/mp4")
    }

    fn get<'a>(head: &'a ResponseHead, name: header::HeaderName) -> &'a str {
        head.headers.get(name).unwrap().to_str().unwrap()
    }

    #[test]
    fn full_content() {
        let head = ResponseHead::new(ByteRange::new(0, 499), 500, RangeKind::Full, &mp4());
        assert_eq!(head.status, StatusCode::OK);
        assert_eq!(get(&head, header::CONTENT_RANGE), "bytes 0-499/500");
        assert_eq!(get(&head, header::ACCEPT_RANGES), "bytes");
        assert_eq!(get(&head, header::CONTENT_TYPE), "video/mp4");
        assert_eq!(get(&head, header::CONTENT_LENGTH), "500");
    }

    #[test]
    fn partial_content() {
        let head = ResponseHead::new(
            ByteRange::new(500_000, 2_500_000),
            3_000_000,
            RangeKind::Partial,
            &HeaderValue::from_static("video/x-matroska"),
        );
        assert_eq!(head.status, StatusCode::PARTIAL_CONTENT);
        assert_eq!(
            get(&head, header::CONTENT_RANGE),
            "bytes 500000-2500000/3000000"
        );
        assert_eq!(get(&head, header::RANGE), "bytes=500000-2500000");
        assert_eq!(get(&head, header::CONTENT_LENGTH), "2000001");
        assert_eq!(get(&head, header::CONTENT_TYPE), "video/x-matroska");
    }

    #[test]
    fn unsatisfiable_names_the_size() {
        let head = ResponseHead::unsatisfiable(1000);
        assert_eq!(head.status, StatusCode::RANGE_NOT_SATISFIABLE);
        assert_eq!(get(&head, header::CONTENT_RANGE), "bytes */1000");
    }

    #[test]
    fn into_response_keeps_head() {
        let response = ResponseHead::empty(&mp4()).into_response(Body::empty());
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_LENGTH], "0");
    }
}
