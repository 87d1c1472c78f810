//! Inbound request as seen by the core

use bytes::Bytes;
use hyper::{HeaderMap, Method};
use reqwest::Url;

use crate::signing::HeaderValues;

/// A fully buffered inbound request.
///
/// The body is read once by the dispatcher; verification and forwarding both
/// work from this buffer.
#[derive(Debug, Clone)]
pub struct ProxyRequest {
    pub method: Method,
    /// Absolute URL as the caller addressed it (the proxy's host)
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ProxyRequest {
    /// Create a new request
    pub fn new(method: Method, url: Url, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        Self {
            method,
            url,
            headers,
            body: body.into(),
        }
    }

    /// Value of a header, with repeated values joined by `,`.
    ///
    /// Values that are not visible ASCII are skipped.
    pub fn header(&self, name: &str) -> Option<String> {
        let values: Vec<&str> = self
            .headers
            .get_all(name)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect();

        if values.is_empty() {
            None
        } else {
            Some(values.join(","))
        }
    }

    /// Current values of the named headers, keyed by lower-cased name.
    ///
    /// Names without a value on the request are left out.
    pub fn header_values<'a, I>(&self, names: I) -> HeaderValues
    where
        I: IntoIterator<Item = &'a String>,
    {
        names
            .into_iter()
            .filter_map(|name| {
                let name = name.to_ascii_lowercase();
                self.header(&name).map(|value| (name, value))
            })
            .collect()
    }
}
