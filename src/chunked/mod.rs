//! `aws-chunked` payload decoding
//!
//! Streaming SigV4 uploads (`x-amz-content-sha256: STREAMING-...`) frame the
//! body as a sequence of chunks:
//!
//! ```text
//! <hex size>;chunk-signature=<sig>\r\n
//! <size bytes of data>\r\n
//! ...
//! 0;chunk-signature=<sig>\r\n
//! [trailers]\r\n
//! ```
//!
//! The backend receives the plain payload, so the framing and the per-chunk
//! signatures are stripped. Chunk signatures are not re-verified.
//!
//! # Example
//!
//! ```
//! use sigv4_relay::chunked::ChunkedPayloadDecoder;
//!
//! let raw = b"5;chunk-signature=aa\r\nHELLO\r\n6;chunk-signature=bb\r\n WORLD\r\n0;chunk-signature=cc\r\n\r\n";
//! let decoded = ChunkedPayloadDecoder::decode(raw);
//! assert_eq!(&decoded.data[..], b"HELLO WORLD");
//! assert!(decoded.framing_error.is_none());
//! ```

use bytes::{Bytes, BytesMut};
use std::ops::Range;
use thiserror::Error;
use tracing::{debug, warn};

/// Separator between the hex size and the chunk signature
pub const CHUNK_SIGNATURE_MARKER: &str = ";chunk-signature=";

/// Prefix shared by every streaming content-hash sentinel
const STREAMING_PREFIX: &str = "STREAMING-";

const CRLF: &[u8] = b"\r\n";

/// Chunk framing errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChunkFramingError {
    #[error("Invalid chunk size {size:?} at offset {offset}")]
    InvalidChunkSize { size: String, offset: usize },

    #[error("Chunk data at offset {offset} declares {declared} bytes but only {available} remain")]
    TruncatedChunk {
        offset: usize,
        declared: usize,
        available: usize,
    },

    #[error("Payload ended without a terminating zero-size chunk")]
    MissingTerminator,
}

/// One decoded chunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkRecord {
    pub declared_size: usize,
    pub signature: Option<String>,
    /// Location of the chunk data within the raw payload
    pub data: Range<usize>,
}

impl ChunkRecord {
    /// True for the zero-size chunk that ends the stream
    pub fn is_terminal(&self) -> bool {
        self.declared_size == 0
    }
}

/// Result of lenient decoding
#[derive(Debug, Clone)]
pub struct DecodedPayload {
    /// Concatenated chunk data
    pub data: Bytes,
    /// Number of data chunks (terminator excluded)
    pub chunks: usize,
    /// True if the zero-size terminator was reached
    pub terminated: bool,
    /// Framing problem that stopped decoding early, if any
    pub framing_error: Option<ChunkFramingError>,
}

/// Returns true if a content-hash value announces chunk framing
pub fn is_streaming_payload(content_sha256: &str) -> bool {
    content_sha256.starts_with(STREAMING_PREFIX)
}

/// Strips `aws-chunked` framing
pub struct ChunkedPayloadDecoder;

impl ChunkedPayloadDecoder {
    /// Iterate over the chunks of a raw payload
    pub fn chunks(raw: &[u8]) -> ChunkIter<'_> {
        ChunkIter {
            input: raw,
            pos: 0,
            done: false,
        }
    }

    /// Decode leniently.
    ///
    /// Decoding stops quietly when no further chunk header can be found. A
    /// malformed size or a short chunk also stops decoding; whatever was
    /// accumulated is kept (including the partial chunk) and the problem is
    /// reported in [`DecodedPayload::framing_error`].
    pub fn decode(raw: &[u8]) -> DecodedPayload {
        let mut data = BytesMut::with_capacity(raw.len());
        let mut chunks = 0;
        let mut terminated = false;
        let mut framing_error = None;

        for chunk in Self::chunks(raw) {
            match chunk {
                Ok(record) if record.is_terminal() => {
                    terminated = true;
                }
                Ok(record) => {
                    data.extend_from_slice(&raw[record.data]);
                    chunks += 1;
                }
                Err(err) => {
                    if let ChunkFramingError::TruncatedChunk { offset, .. } = err {
                        data.extend_from_slice(&raw[offset..]);
                    }
                    warn!(error = %err, decoded = data.len(), "Chunked payload framing error");
                    framing_error = Some(err);
                }
            }
        }

        debug!(chunks, bytes = data.len(), terminated, "Decoded chunked payload");

        DecodedPayload {
            data: data.freeze(),
            chunks,
            terminated,
            framing_error,
        }
    }

    /// Decode, failing on any framing problem including a missing terminator.
    pub fn decode_strict(raw: &[u8]) -> Result<Bytes, ChunkFramingError> {
        let decoded = Self::decode(raw);
        if let Some(err) = decoded.framing_error {
            return Err(err);
        }
        if !decoded.terminated {
            return Err(ChunkFramingError::MissingTerminator);
        }
        Ok(decoded.data)
    }
}

/// Iterator over [`ChunkRecord`]s.
///
/// Ends after the terminal chunk, after the first error, or when no further
/// `\r\n` delimited header exists.
pub struct ChunkIter<'a> {
    input: &'a [u8],
    pos: usize,
    done: bool,
}

impl<'a> Iterator for ChunkIter<'a> {
    type Item = Result<ChunkRecord, ChunkFramingError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.pos >= self.input.len() {
            return None;
        }

        let Some(header_end) = find_crlf(self.input, self.pos) else {
            self.done = true;
            return None;
        };

        let header = String::from_utf8_lossy(&self.input[self.pos..header_end]);
        let (size_text, signature) = match header.split_once(CHUNK_SIGNATURE_MARKER) {
            Some((size, signature)) => (size, Some(signature.trim().to_string())),
            None => (header.as_ref(), None),
        };
        // Other chunk extensions carry nothing we need
        let size_text = size_text.split(';').next().unwrap_or_default().trim();

        let declared_size = match usize::from_str_radix(size_text, 16) {
            Ok(size) => size,
            Err(_) => {
                self.done = true;
                return Some(Err(ChunkFramingError::InvalidChunkSize {
                    size: size_text.to_string(),
                    offset: self.pos,
                }));
            }
        };

        let data_start = header_end + CRLF.len();

        if declared_size == 0 {
            // Trailers after the terminator are discarded
            self.done = true;
            return Some(Ok(ChunkRecord {
                declared_size,
                signature,
                data: data_start..data_start,
            }));
        }

        let available = self.input.len() - data_start;
        if declared_size > available {
            self.done = true;
            return Some(Err(ChunkFramingError::TruncatedChunk {
                offset: data_start,
                declared: declared_size,
                available,
            }));
        }

        let data_end = data_start + declared_size;
        self.pos = data_end + CRLF.len();

        Some(Ok(ChunkRecord {
            declared_size,
            signature,
            data: data_start..data_end,
        }))
    }
}

fn find_crlf(input: &[u8], from: usize) -> Option<usize> {
    input[from..]
        .windows(CRLF.len())
        .position(|window| window == CRLF)
        .map(|offset| from + offset)
}
