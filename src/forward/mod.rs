//! Request forwarding
//!
//! Turns a [`VerifiedRequest`] into a re-signed call against the backend
//! endpoint and relays what comes back.
//!
//! | Mode | When | Outbound request |
//! |------|------|------------------|
//! | `Presigned` | URL carries `X-Amz-Signature` | query re-signed, inbound method, headers and body as-is |
//! | `HeadAdapted` | `HEAD` on a listed extension | `HEAD` against a URL presigned for `GET` |
//! | `Streaming` | signed content hash is `STREAMING-*` | chunk framing removed, header-signed |
//! | `Direct` | everything else | signed headers and body, header-signed |

use crate::auth::VerifiedRequest;
use crate::chunked::{is_streaming_payload, ChunkFramingError, ChunkedPayloadDecoder};
use crate::config::{Config, ConfigError};
use crate::proxy::ProxyRequest;
use crate::signing::query::{query_param, DATE_PARAM, SIGNATURE_PARAM};
use crate::signing::{
    now_datetime, HeaderValues, QuerySigner, Signer, SigningError, SigningSecret,
    CONTENT_SHA256_HEADER, DATE_HEADER, UNSIGNED_PAYLOAD,
};
use bytes::Bytes;
use hyper::header::{AUTHORIZATION, HOST};
use hyper::{HeaderMap, Method};
use reqwest::Url;
use thiserror::Error;
use tracing::debug;

pub mod head;
pub mod response;

pub use head::{HeadPolicy, DEFAULT_HEAD_UNSUPPORTED_EXTENSIONS};
pub use response::{empty_body, full_body, is_hop_by_hop, BackendResponse, ProxyBody};

/// Original payload length announced by streaming uploads
pub const DECODED_LENGTH_HEADER: &str = "x-amz-decoded-content-length";

const CONTENT_LENGTH_HEADER: &str = "content-length";
const CONTENT_ENCODING_HEADER: &str = "content-encoding";
const AWS_CHUNKED_ENCODING: &str = "aws-chunked";
const AMZ_HEADER_PREFIX: &str = "x-amz-";

/// Forwarding errors
#[derive(Error, Debug)]
pub enum ForwardError {
    #[error("Chunked payload framing error: {0}")]
    ChunkFraming(#[from] ChunkFramingError),

    #[error("Backend request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Signing error: {0}")]
    Signing(#[from] SigningError),
}

/// How a verified request goes out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardMode {
    Direct,
    Streaming,
    Presigned,
    HeadAdapted,
}

/// Re-signs verified requests and sends them to the backend
#[derive(Debug, Clone)]
pub struct RequestForwarder {
    client: reqwest::Client,
    endpoint: Url,
    service: String,
    strict_chunk_framing: bool,
    head_policy: HeadPolicy,
}

impl RequestForwarder {
    /// Create a forwarder for `endpoint` using an existing client
    pub fn new(client: reqwest::Client, endpoint: Url, service: impl Into<String>) -> Self {
        Self {
            client,
            endpoint,
            service: service.into(),
            strict_chunk_framing: false,
            head_policy: HeadPolicy::default(),
        }
    }

    /// Build the client and forwarder from configuration
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let endpoint = config.backend.endpoint_url()?;
        let client = reqwest::Client::builder()
            .timeout(config.backend.timeout())
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| ConfigError::ValidationError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self::new(client, endpoint, config.backend.service.clone())
            .with_strict_chunk_framing(config.proxy.strict_chunk_framing)
            .with_head_policy(HeadPolicy::from_overrides(
                config.proxy.head_unsupported_extensions.as_deref(),
            )))
    }

    /// Reject malformed chunk framing instead of forwarding the decoded prefix
    pub fn with_strict_chunk_framing(mut self, strict: bool) -> Self {
        self.strict_chunk_framing = strict;
        self
    }

    /// Replace the HEAD adaptation policy
    pub fn with_head_policy(mut self, policy: HeadPolicy) -> Self {
        self.head_policy = policy;
        self
    }

    /// Backend endpoint
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Service name used for signing
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Point `url` at the backend, keeping its path and query
    pub fn backend_url(&self, url: &Url) -> Url {
        let mut target = self.endpoint.clone();
        target.set_path(url.path());
        target.set_query(url.query());
        target
    }

    /// Pick the forwarding mode for a verified request
    pub fn mode(&self, request: &ProxyRequest, signed_headers: &HeaderValues) -> ForwardMode {
        if query_param(&request.url, SIGNATURE_PARAM).is_some() {
            return ForwardMode::Presigned;
        }

        if request.method == Method::HEAD && self.head_policy.is_unsupported(request.url.path()) {
            return ForwardMode::HeadAdapted;
        }

        let carries_body = request.method != Method::GET && request.method != Method::HEAD;
        let streaming = signed_headers
            .get(CONTENT_SHA256_HEADER)
            .is_some_and(|value| is_streaming_payload(value));

        if carries_body && streaming {
            ForwardMode::Streaming
        } else {
            ForwardMode::Direct
        }
    }

    /// Re-sign `verified` with `secret` and send it to the backend.
    #[tracing::instrument(
        name = "proxy.forward",
        skip(self, verified, secret),
        fields(
            http.method = %verified.request().method,
            url.path = %verified.request().url.path(),
            forward.mode = tracing::field::Empty,
            http.status_code = tracing::field::Empty,
        ),
        err
    )]
    pub async fn forward(
        &self,
        verified: VerifiedRequest,
        secret: &SigningSecret,
    ) -> Result<BackendResponse, ForwardError> {
        let mode = self.mode(verified.request(), verified.signed_headers());
        let span = tracing::Span::current();
        span.record("forward.mode", tracing::field::debug(mode));

        let (request, info, signed_headers) = verified.into_parts();
        let region = info.credential_scope.region;
        let signer = Signer::new(secret, &region, &self.service);
        let target = self.backend_url(&request.url);
        let datetime = signed_headers
            .get(DATE_HEADER)
            .cloned()
            .or_else(|| query_param(&request.url, DATE_PARAM))
            .unwrap_or_else(now_datetime);

        debug!(?mode, backend = %target.host_str().unwrap_or_default(), "Forwarding request");

        let response = match mode {
            ForwardMode::Presigned => {
                let url = QuerySigner::new(signer).sign(&target, &request.method)?;
                let headers = presigned_headers(&request.headers, &signed_headers);
                let response = self
                    .client
                    .request(request.method, url)
                    .headers(headers)
                    .body(request.body)
                    .send()
                    .await?;
                BackendResponse::streamed(response)
            }
            ForwardMode::HeadAdapted => {
                let mut url = target;
                if query_param(&url, DATE_PARAM).is_none() {
                    url.query_pairs_mut().append_pair(DATE_PARAM, &datetime);
                }
                let url = QuerySigner::new(signer).sign(&url, &Method::GET)?;
                let response = self.client.head(url).send().await?;
                BackendResponse::headers_only(response)
            }
            ForwardMode::Streaming | ForwardMode::Direct => {
                let mut headers = signed_headers;
                headers.remove("host");

                let body = if mode == ForwardMode::Streaming {
                    self.decode_streaming(&request.body, &mut headers)?
                } else {
                    request.body
                };

                let signed =
                    signer.sign_request(&request.method, &target, &headers, &body, &datetime)?;

                let mut builder = self.client.request(signed.method, signed.url);
                for (name, value) in &signed.headers {
                    builder = builder.header(name.as_str(), value.as_str());
                }
                BackendResponse::streamed(builder.body(body).send().await?)
            }
        };

        span.record("http.status_code", response.status.as_u16());
        debug!(status = response.status.as_u16(), "Backend responded");

        Ok(response)
    }

    /// Strip chunk framing and rewrite the headers describing the body
    fn decode_streaming(
        &self,
        raw: &[u8],
        headers: &mut HeaderValues,
    ) -> Result<Bytes, ChunkFramingError> {
        let body = if self.strict_chunk_framing {
            ChunkedPayloadDecoder::decode_strict(raw)?
        } else {
            ChunkedPayloadDecoder::decode(raw).data
        };

        headers.insert(CONTENT_SHA256_HEADER.to_string(), UNSIGNED_PAYLOAD.to_string());
        headers.insert(CONTENT_LENGTH_HEADER.to_string(), body.len().to_string());
        headers.remove(DECODED_LENGTH_HEADER);

        if let Some(encoding) = headers.remove(CONTENT_ENCODING_HEADER) {
            if let Some(remaining) = strip_aws_chunked(&encoding) {
                headers.insert(CONTENT_ENCODING_HEADER.to_string(), remaining);
            }
        }

        debug!(raw = raw.len(), decoded = body.len(), "Removed chunk framing");
        Ok(body)
    }
}

/// Inbound headers that ride along with a presigned request.
///
/// The query signature covers none of them, so everything end-to-end is kept
/// except `host`, credentials, the body length and `x-amz-*` headers the caller
/// did not sign.
pub fn presigned_headers(headers: &HeaderMap, signed_headers: &HeaderValues) -> HeaderMap {
    let mut kept = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let lower = name.as_str();
        let dropped = *name == HOST
            || *name == AUTHORIZATION
            || lower == CONTENT_LENGTH_HEADER
            || is_hop_by_hop(name)
            || (lower.starts_with(AMZ_HEADER_PREFIX) && !signed_headers.contains_key(lower));
        if !dropped {
            kept.append(name.clone(), value.clone());
        }
    }
    kept
}

/// Remove the `aws-chunked` token from a `content-encoding` value.
///
/// Returns `None` when nothing else remains.
pub fn strip_aws_chunked(encoding: &str) -> Option<String> {
    let remaining: Vec<&str> = encoding
        .split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty() && !token.eq_ignore_ascii_case(AWS_CHUNKED_ENCODING))
        .collect();

    if remaining.is_empty() {
        None
    } else {
        Some(remaining.join(","))
    }
}
