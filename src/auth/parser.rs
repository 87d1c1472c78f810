//! Authorization info extraction
//!
//! SigV4 material arrives in one of two places:
//!
//! - the `Authorization` header:
//!   `AWS4-HMAC-SHA256 Credential=<cred>, SignedHeaders=<list>, Signature=<sig>`
//! - the query triplet `X-Amz-Credential` / `X-Amz-SignedHeaders` /
//!   `X-Amz-Signature` (presigned URLs)
//!
//! The header wins when both are present.

use super::AuthError;
use crate::proxy::ProxyRequest;
use crate::signing::query::{
    query_param, CREDENTIAL_PARAM, SIGNATURE_PARAM, SIGNED_HEADERS_PARAM,
};
use crate::signing::AUTHORIZATION_HEADER;
use regex_lite::Regex;
use reqwest::Url;
use std::sync::OnceLock;

/// `<key>/<date>/<region>/<service>/aws4_request`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialScope {
    pub access_key_id: String,
    pub date: String,
    pub region: String,
    pub service: String,
    pub termination: String,
}

impl CredentialScope {
    /// Split a credential string on `/`. Exactly five segments are required.
    pub fn parse(credential: &str) -> Result<Self, AuthError> {
        let parts: Vec<&str> = credential.split('/').collect();
        match parts.as_slice() {
            [access_key_id, date, region, service, termination] => Ok(Self {
                access_key_id: access_key_id.to_string(),
                date: date.to_string(),
                region: region.to_string(),
                service: service.to_string(),
                termination: termination.to_string(),
            }),
            _ => Err(AuthError::MalformedCredential),
        }
    }
}

/// Where the authorization material was found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizationSource {
    Header,
    Query,
}

/// Parsed SigV4 authorization material of one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationInfo {
    pub credential_scope: CredentialScope,
    /// Lower-cased, in the order the caller listed them
    pub signed_header_names: Vec<String>,
    pub signature: String,
    pub source: AuthorizationSource,
}

/// Extracts [`AuthorizationInfo`] from requests
pub struct AuthorizationParser;

impl AuthorizationParser {
    /// Parse a request's authorization material.
    ///
    /// Fails with [`AuthError::MissingAuthorization`] when neither the header
    /// nor the full query triplet is present.
    pub fn parse(request: &ProxyRequest) -> Result<AuthorizationInfo, AuthError> {
        if let Some(header) = request.header(AUTHORIZATION_HEADER) {
            return Self::parse_header(&header);
        }
        Self::parse_query(&request.url)
    }

    /// Parse an `Authorization` header value
    pub fn parse_header(value: &str) -> Result<AuthorizationInfo, AuthError> {
        let captures = header_pattern()
            .captures(value)
            .ok_or(AuthError::MalformedAuthorizationHeader)?;

        Ok(AuthorizationInfo {
            credential_scope: CredentialScope::parse(&captures[1])?,
            signed_header_names: split_signed_headers(&captures[2]),
            signature: captures[3].to_string(),
            source: AuthorizationSource::Header,
        })
    }

    /// Parse the presigned query triplet of a URL
    pub fn parse_query(url: &Url) -> Result<AuthorizationInfo, AuthError> {
        let credential = query_param(url, CREDENTIAL_PARAM);
        let signed_headers = query_param(url, SIGNED_HEADERS_PARAM);
        let signature = query_param(url, SIGNATURE_PARAM);

        let (Some(credential), Some(signed_headers), Some(signature)) =
            (credential, signed_headers, signature)
        else {
            return Err(AuthError::MissingAuthorization);
        };

        Ok(AuthorizationInfo {
            credential_scope: CredentialScope::parse(&credential)?,
            signed_header_names: split_signed_headers(&signed_headers),
            signature,
            source: AuthorizationSource::Query,
        })
    }
}

fn header_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"^AWS4-HMAC-SHA256 Credential=([^,]+),\s*SignedHeaders=([^,]+),\s*Signature=(.+)$",
        )
        .expect("authorization header pattern is valid")
    })
}

fn split_signed_headers(list: &str) -> Vec<String> {
    list.split(';').map(|name| name.to_ascii_lowercase()).collect()
}
