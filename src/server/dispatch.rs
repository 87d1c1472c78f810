//! Request dispatch
//!
//! Buffers the inbound body, hands the request to the proxy core and maps
//! its outcome onto an HTTP response.

use super::error_response::{error_response, ErrorBody};
use crate::forward::ProxyBody;
use crate::proxy::{ProxyRequest, SigV4Proxy};
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::header::HOST;
use hyper::{Request, Response, StatusCode};
use reqwest::Url;
use std::convert::Infallible;
use std::sync::Arc;
use tracing::{info, warn};

/// Handle one HTTP request
pub async fn handle_request(
    req: Request<Incoming>,
    proxy: Arc<SigV4Proxy>,
) -> Result<Response<ProxyBody>, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    info!("Handling {} {}", method, path);

    let (parts, body) = req.into_parts();

    let url = match request_url(&parts) {
        Some(url) => url,
        None => {
            warn!(%path, "Request URL could not be reconstructed");
            return Ok(ErrorBody::new(
                StatusCode::BAD_REQUEST,
                "InvalidURI",
                "Couldn't parse the specified URI.",
            )
            .into_response());
        }
    };

    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!(error = %e, "Failed to read request body");
            return Ok(ErrorBody::new(
                StatusCode::BAD_REQUEST,
                "IncompleteBody",
                "The request body could not be read.",
            )
            .into_response());
        }
    };

    let request = ProxyRequest::new(parts.method, url, parts.headers, body);

    let response = match proxy.handle(request).await {
        Ok(backend) => backend.into_response(),
        Err(e) => {
            let kind = e.kind();
            warn!(?kind, error = %e, "Request rejected");
            error_response(kind)
        }
    };

    info!(status = response.status().as_u16(), "{} {} completed", method, path);
    Ok(response)
}

/// The absolute URL the caller addressed: `http://{host}{path}?{query}`.
///
/// The host comes from the `Host` header, or from the request target when it
/// is in absolute form.
pub fn request_url(parts: &hyper::http::request::Parts) -> Option<Url> {
    let host = parts
        .headers
        .get(HOST)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
        .or_else(|| parts.uri.authority().map(|a| a.to_string()))?;

    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");

    Url::parse(&format!("http://{}{}", host, path_and_query)).ok()
}
