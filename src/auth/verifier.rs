//! SigV4 signature verification
//!
//! Verification re-signs the request as if this proxy were the original
//! signer, using the secret it holds, the caller's region, the same method,
//! URL, signed headers, body and declared date. The request is genuine if
//! and only if that produces the signature the caller presented.

use super::parser::{AuthorizationInfo, AuthorizationParser, AuthorizationSource};
use super::AuthError;
use crate::proxy::ProxyRequest;
use crate::signing::canonical::{hash_payload, is_hex_digest};
use crate::signing::{
    HeaderValues, QuerySigner, Signer, SigningSecret, CONTENT_SHA256_HEADER, DATE_HEADER,
};
use subtle::ConstantTimeEq;
use tracing::debug;

/// A request whose signature has been checked.
///
/// Only [`SignatureVerifier::verify`] builds these, so holding one means the
/// caller proved knowledge of the secret.
#[derive(Debug, Clone)]
pub struct VerifiedRequest {
    request: ProxyRequest,
    info: AuthorizationInfo,
    signed_headers: HeaderValues,
}

impl VerifiedRequest {
    /// The inbound request
    pub fn request(&self) -> &ProxyRequest {
        &self.request
    }

    /// Parsed authorization material
    pub fn info(&self) -> &AuthorizationInfo {
        &self.info
    }

    /// Values of the headers the caller signed, keyed by lower-cased name
    pub fn signed_headers(&self) -> &HeaderValues {
        &self.signed_headers
    }

    /// Region from the caller's credential scope
    pub fn region(&self) -> &str {
        &self.info.credential_scope.region
    }

    /// Split into request, authorization info and signed headers
    pub fn into_parts(self) -> (ProxyRequest, AuthorizationInfo, HeaderValues) {
        (self.request, self.info, self.signed_headers)
    }
}

/// Verifies inbound SigV4 signatures
#[derive(Debug, Clone)]
pub struct SignatureVerifier {
    service: String,
}

impl SignatureVerifier {
    /// Create a verifier signing for `service` (normally `s3`)
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    /// Verify a request against `secret`.
    #[tracing::instrument(
        name = "auth.sigv4.verify",
        skip(self, request, secret),
        fields(
            http.method = %request.method,
            url.path = %request.url.path(),
            auth.source = tracing::field::Empty,
        )
    )]
    pub fn verify(
        &self,
        request: ProxyRequest,
        secret: &SigningSecret,
    ) -> Result<VerifiedRequest, AuthError> {
        let info = AuthorizationParser::parse(&request)?;
        tracing::Span::current().record("auth.source", tracing::field::debug(info.source));
        self.verify_parsed(request, info, secret)
    }

    /// Verify a request whose authorization material was already parsed.
    pub fn verify_parsed(
        &self,
        request: ProxyRequest,
        info: AuthorizationInfo,
        secret: &SigningSecret,
    ) -> Result<VerifiedRequest, AuthError> {
        if info.credential_scope.access_key_id != secret.access_key_id() {
            debug!("Access key in credential scope is not the configured one");
            return Err(AuthError::AccessKeyMismatch);
        }

        let signed_headers = request.header_values(&info.signed_header_names);
        let signer = Signer::new(secret, &info.credential_scope.region, &self.service);

        let expected = match info.source {
            AuthorizationSource::Header => {
                let datetime = signed_headers
                    .get(DATE_HEADER)
                    .cloned()
                    .or_else(|| request.header(DATE_HEADER))
                    .ok_or(AuthError::MissingDate)?;

                check_payload_hash(&signed_headers, &request)?;

                let signed = signer.sign_request(
                    &request.method,
                    &request.url,
                    &signed_headers,
                    &request.body,
                    &datetime,
                )?;
                let authorization = signed
                    .authorization()
                    .ok_or(AuthError::SignatureMismatch)?;
                AuthorizationParser::parse_header(authorization)?.signature
            }
            AuthorizationSource::Query => {
                let url = QuerySigner::new(signer).sign_with_headers(
                    &request.url,
                    &request.method,
                    &signed_headers,
                )?;
                AuthorizationParser::parse_query(&url)?.signature
            }
        };

        if !signatures_match(&info.signature, &expected) {
            debug!(
                region = %info.credential_scope.region,
                signed_headers = info.signed_header_names.len(),
                "Signature mismatch"
            );
            return Err(AuthError::SignatureMismatch);
        }

        debug!(region = %info.credential_scope.region, "Signature verified");

        Ok(VerifiedRequest {
            request,
            info,
            signed_headers,
        })
    }
}

/// A signed literal body hash must describe the buffered body.
fn check_payload_hash(signed_headers: &HeaderValues, request: &ProxyRequest) -> Result<(), AuthError> {
    match signed_headers.get(CONTENT_SHA256_HEADER) {
        Some(declared) if is_hex_digest(declared) => {
            if declared.eq_ignore_ascii_case(&hash_payload(&request.body)) {
                Ok(())
            } else {
                debug!(body_len = request.body.len(), "Body does not match signed hash");
                Err(AuthError::PayloadHashMismatch)
            }
        }
        _ => Ok(()),
    }
}

/// Length and content comparison in constant time.
fn signatures_match(presented: &str, expected: &str) -> bool {
    presented.len() == expected.len() && bool::from(presented.as_bytes().ct_eq(expected.as_bytes()))
}
