//! Backend response passthrough

use bytes::Bytes;
use futures::TryStreamExt;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty, Full, StreamBody};
use hyper::body::Frame;
use hyper::header::HeaderName;
use hyper::{HeaderMap, Response, StatusCode};

/// Body type of every response the proxy produces
pub type ProxyBody = UnsyncBoxBody<Bytes, reqwest::Error>;

/// Headers that describe a single connection and must not be relayed
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Returns true for connection-scoped headers
pub fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP_HEADERS.contains(&name.as_str())
}

/// Copy `headers` without hop-by-hop entries
pub fn end_to_end_headers(headers: &HeaderMap) -> HeaderMap {
    let mut filtered = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if !is_hop_by_hop(name) {
            filtered.append(name.clone(), value.clone());
        }
    }
    filtered
}

/// A fixed body
pub fn full_body(bytes: impl Into<Bytes>) -> ProxyBody {
    Full::new(bytes.into())
        .map_err(|never| match never {})
        .boxed_unsync()
}

/// An empty body
pub fn empty_body() -> ProxyBody {
    Empty::<Bytes>::new()
        .map_err(|never| match never {})
        .boxed_unsync()
}

/// What the backend answered
pub struct BackendResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: ProxyBody,
}

impl BackendResponse {
    /// Relay status, headers and the streamed body
    pub fn streamed(response: reqwest::Response) -> Self {
        let status = response.status();
        let headers = end_to_end_headers(response.headers());
        let body = StreamBody::new(response.bytes_stream().map_ok(Frame::data)).boxed_unsync();

        Self {
            status,
            headers,
            body,
        }
    }

    /// Relay status and headers only
    pub fn headers_only(response: reqwest::Response) -> Self {
        Self {
            status: response.status(),
            headers: end_to_end_headers(response.headers()),
            body: empty_body(),
        }
    }

    /// Convert into the response handed back to the caller
    pub fn into_response(self) -> Response<ProxyBody> {
        let mut response = Response::new(self.body);
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

impl std::fmt::Debug for BackendResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}
