//! Proxy core
//!
//! Drives one request through its lifecycle:
//!
//! ```text
//! Received -> Parsed -> Verified -> Forwarding(mode) -> Responded
//!                 \          \
//!                  `----------`-> Rejected
//! ```
//!
//! Every transition is logged at `debug`. Failures surface as a
//! [`ProxyError`] whose [`ErrorKind`] decides what the caller sees.

use crate::auth::{AuthError, AuthorizationParser, SignatureVerifier};
use crate::chunked::ChunkFramingError;
use crate::forward::{BackendResponse, ForwardError, ForwardMode, RequestForwarder};
use crate::signing::{SigningError, SigningSecret};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

pub mod request;

pub use request::ProxyRequest;

/// Error categories callers branch on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    MissingAuthorization,
    SignatureInvalid,
    ChunkFraming,
    ForwardingFailure,
    Signing,
}

/// Errors at the proxy boundary
#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("Missing authorization")]
    MissingAuthorization,

    #[error("Signature validation failed")]
    SignatureInvalid,

    #[error("Chunked payload framing error: {0}")]
    ChunkFraming(#[from] ChunkFramingError),

    #[error("Backend request failed: {0}")]
    ForwardingFailure(#[source] reqwest::Error),

    #[error("Signing error: {0}")]
    Signing(#[from] SigningError),
}

impl ProxyError {
    /// Category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProxyError::MissingAuthorization => ErrorKind::MissingAuthorization,
            ProxyError::SignatureInvalid => ErrorKind::SignatureInvalid,
            ProxyError::ChunkFraming(_) => ErrorKind::ChunkFraming,
            ProxyError::ForwardingFailure(_) => ErrorKind::ForwardingFailure,
            ProxyError::Signing(_) => ErrorKind::Signing,
        }
    }
}

impl From<AuthError> for ProxyError {
    fn from(err: AuthError) -> Self {
        if err.is_missing() {
            ProxyError::MissingAuthorization
        } else {
            ProxyError::SignatureInvalid
        }
    }
}

impl From<ForwardError> for ProxyError {
    fn from(err: ForwardError) -> Self {
        match err {
            ForwardError::ChunkFraming(e) => ProxyError::ChunkFraming(e),
            ForwardError::Request(e) => ProxyError::ForwardingFailure(e),
            ForwardError::Signing(e) => ProxyError::Signing(e),
        }
    }
}

/// Lifecycle states of a proxied request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyState {
    Received,
    Parsed,
    Verified,
    Forwarding(ForwardMode),
    Responded,
    Rejected,
}

impl fmt::Display for ProxyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProxyState::Received => write!(f, "received"),
            ProxyState::Parsed => write!(f, "parsed"),
            ProxyState::Verified => write!(f, "verified"),
            ProxyState::Forwarding(ForwardMode::Direct) => write!(f, "forwarding-direct"),
            ProxyState::Forwarding(ForwardMode::Streaming) => write!(f, "forwarding-streaming"),
            ProxyState::Forwarding(ForwardMode::Presigned) => write!(f, "forwarding-presigned"),
            ProxyState::Forwarding(ForwardMode::HeadAdapted) => write!(f, "forwarding-head-adapted"),
            ProxyState::Responded => write!(f, "responded"),
            ProxyState::Rejected => write!(f, "rejected"),
        }
    }
}

fn transition(state: ProxyState) {
    debug!(state = %state, "Request state");
}

/// Verifies inbound requests and forwards them re-signed.
///
/// Holds only immutable state; share it across connections with `Arc`.
pub struct SigV4Proxy {
    secret: Arc<SigningSecret>,
    verifier: SignatureVerifier,
    forwarder: RequestForwarder,
}

impl SigV4Proxy {
    /// Create a proxy; the verifier signs for the forwarder's service
    pub fn new(secret: Arc<SigningSecret>, forwarder: RequestForwarder) -> Self {
        Self {
            verifier: SignatureVerifier::new(forwarder.service()),
            secret,
            forwarder,
        }
    }

    /// The forwarder in use
    pub fn forwarder(&self) -> &RequestForwarder {
        &self.forwarder
    }

    /// Verify `request` and forward it to the backend.
    pub async fn handle(&self, request: ProxyRequest) -> Result<BackendResponse, ProxyError> {
        transition(ProxyState::Received);

        let info = match AuthorizationParser::parse(&request) {
            Ok(info) => info,
            Err(err) => return Err(reject(err)),
        };
        transition(ProxyState::Parsed);

        let verified = match self.verifier.verify_parsed(request, info, &self.secret) {
            Ok(verified) => verified,
            Err(err) => return Err(reject(err)),
        };
        transition(ProxyState::Verified);

        let mode = self
            .forwarder
            .mode(verified.request(), verified.signed_headers());
        transition(ProxyState::Forwarding(mode));

        match self.forwarder.forward(verified, &self.secret).await {
            Ok(response) => {
                transition(ProxyState::Responded);
                Ok(response)
            }
            Err(err) => {
                transition(ProxyState::Rejected);
                Err(err.into())
            }
        }
    }
}

fn reject(err: AuthError) -> ProxyError {
    debug!(reason = %err, "Authentication failed");
    transition(ProxyState::Rejected);
    err.into()
}
