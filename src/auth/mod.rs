//! Authentication module
//!
//! Parses SigV4 authorization material from inbound requests and verifies it
//! against the configured signing secret.

use crate::signing::SigningError;
use thiserror::Error;

pub mod parser;
pub mod verifier;

pub use parser::{AuthorizationInfo, AuthorizationParser, AuthorizationSource, CredentialScope};
pub use verifier::{SignatureVerifier, VerifiedRequest};

/// Authentication errors
///
/// Only [`AuthError::MissingAuthorization`] is distinguishable by callers;
/// every other variant is reported as an invalid signature.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Missing authorization")]
    MissingAuthorization,

    #[error("Malformed Authorization header")]
    MalformedAuthorizationHeader,

    #[error("Malformed credential scope")]
    MalformedCredential,

    #[error("Missing signing date")]
    MissingDate,

    #[error("Unknown access key")]
    AccessKeyMismatch,

    #[error("Payload hash does not match body")]
    PayloadHashMismatch,

    #[error("Signature does not match")]
    SignatureMismatch,

    #[error("Signing error: {0}")]
    Signing(#[from] SigningError),
}

impl AuthError {
    /// True when no credential material was found at all
    pub fn is_missing(&self) -> bool {
        matches!(self, AuthError::MissingAuthorization)
    }
}
