//! S3-style XML error responses

use crate::forward::{full_body, ProxyBody};
use crate::proxy::ErrorKind;
use hyper::header::{CACHE_CONTROL, CONTENT_TYPE};
use hyper::{Response, StatusCode};
use quick_xml::events::{BytesDecl, BytesText, Event};
use quick_xml::Writer;
use std::io;

/// Namespace of the `<ErrorResponse>` shape
pub const IAM_NAMESPACE: &str = "https://iam.amazonaws.com/doc/2010-05-08/";

/// Cache directive on every error response
pub const NO_CACHE: &str = "max-age=0, no-cache, no-store";

/// Message returned for missing credentials
pub const UNAUTHENTICATED_MESSAGE: &str = "Unauthenticated requests are not allowed for this api";

/// Message returned for failed signature validation
pub const SIGNATURE_FAILED_MESSAGE: &str = "Signature validation failed.";

/// An error as shown to the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorBody {
    pub status: StatusCode,
    pub xml: Vec<u8>,
}

impl ErrorBody {
    /// A plain `<Error>` with a fresh request id
    pub fn new(status: StatusCode, code: &str, message: &str) -> Self {
        Self {
            status,
            xml: error_xml(code, message, Some(&new_request_id())),
        }
    }

    /// Response body and status for an error kind
    pub fn for_kind(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::MissingAuthorization => Self {
                status: StatusCode::FORBIDDEN,
                xml: error_xml("AccessDenied", UNAUTHENTICATED_MESSAGE, None),
            },
            ErrorKind::SignatureInvalid => Self {
                status: StatusCode::FORBIDDEN,
                xml: error_response_xml(
                    "Sender",
                    "SignatureDoesNotMatch",
                    SIGNATURE_FAILED_MESSAGE,
                    &new_request_id(),
                ),
            },
            ErrorKind::ChunkFraming => Self::new(
                StatusCode::BAD_REQUEST,
                "IncompleteBody",
                "The request body is not valid aws-chunked framing.",
            ),
            ErrorKind::ForwardingFailure => Self::new(
                StatusCode::BAD_GATEWAY,
                "BadGateway",
                "The backend could not be reached.",
            ),
            ErrorKind::Signing => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "InternalError",
                "The request could not be signed for the backend.",
            ),
        }
    }

    /// Build the HTTP response
    pub fn into_response(self) -> Response<ProxyBody> {
        Response::builder()
            .status(self.status)
            .header(CONTENT_TYPE, "application/xml")
            .header(CACHE_CONTROL, NO_CACHE)
            .body(full_body(self.xml))
            .expect("Failed to build error response")
    }
}

/// Build the error response for a kind
pub fn error_response(kind: ErrorKind) -> Response<ProxyBody> {
    ErrorBody::for_kind(kind).into_response()
}

/// Upper-case UUID, the format AWS uses for request ids
pub fn new_request_id() -> String {
    uuid::Uuid::new_v4().to_string().to_uppercase()
}

/// `<Error><Code/><Message/>[<RequestId/>]</Error>`
pub fn error_xml(code: &str, message: &str, request_id: Option<&str>) -> Vec<u8> {
    let mut buf = Vec::with_capacity(256);
    if let Err(e) = write_error(&mut buf, code, message, request_id) {
        tracing::error!(error = %e, "failed to serialize error XML");
        buf.clear();
    }
    buf
}

/// `<ErrorResponse xmlns=...><Error><Type/><Code/><Message/></Error><RequestId/></ErrorResponse>`
pub fn error_response_xml(error_type: &str, code: &str, message: &str, request_id: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(384);
    if let Err(e) = write_error_response(&mut buf, error_type, code, message, request_id) {
        tracing::error!(error = %e, "failed to serialize error XML");
        buf.clear();
    }
    buf
}

fn declaration() -> Event<'static> {
    Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes")))
}

fn write_error(
    buf: &mut Vec<u8>,
    code: &str,
    message: &str,
    request_id: Option<&str>,
) -> io::Result<()> {
    let mut writer = Writer::new(buf);
    writer.write_event(declaration())?;

    writer.create_element("Error").write_inner_content(|w| {
        w.create_element("Code")
            .write_text_content(BytesText::new(code))?;
        w.create_element("Message")
            .write_text_content(BytesText::new(message))?;
        if let Some(id) = request_id {
            w.create_element("RequestId")
                .write_text_content(BytesText::new(id))?;
        }
        Ok(())
    })?;

    Ok(())
}

fn write_error_response(
    buf: &mut Vec<u8>,
    error_type: &str,
    code: &str,
    message: &str,
    request_id: &str,
) -> io::Result<()> {
    let mut writer = Writer::new(buf);
    writer.write_event(declaration())?;

    writer
        .create_element("ErrorResponse")
        .with_attribute(("xmlns", IAM_NAMESPACE))
        .write_inner_content(|w| {
            w.create_element("Error").write_inner_content(|e| {
                e.create_element("Type")
                    .write_text_content(BytesText::new(error_type))?;
                e.create_element("Code")
                    .write_text_content(BytesText::new(code))?;
                e.create_element("Message")
                    .write_text_content(BytesText::new(message))?;
                Ok(())
            })?;
            w.create_element("RequestId")
                .write_text_content(BytesText::new(request_id))?;
            Ok(())
        })?;

    Ok(())
}
