//! Decoding of byte ranges cut out of an hourly log object.
//!
//! The source writes one `{"records": [ ... ]}` document per hour and keeps
//! appending to it, so a range that starts past offset 0 begins somewhere in
//! the middle of the array. Decoding is done in two explicit steps:
//!
//! 1. [`locate_boundary`] finds the first `"time"` field, which every record
//!    carries near its start.
//! 2. [`reconstruct`] backs up from there to the `{` opening that record, drops
//!    everything before it and re-opens the envelope so the remainder
//!    (complete records plus the source's own `]}` closer) parses as a
//!    standalone document.
//!
//! NSG records lead with `"time"`. Gateway records put `"resourceId"` and
//! `"operationName"` first, which is why the cut happens at the brace and not
//! at the sentinel. When the fragment starts between that brace and the
//! sentinel, the record is re-opened at the sentinel and the leading fields
//! are lost.
//!
//! Full reads from offset 0 go through the same path.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;

/// Field name every record starts with.
pub const RECORD_SENTINEL: &[u8] = b"\"time\"";

const ENVELOPE_OPEN: &[u8] = b"{\"records\": [";
const RECORD_OPEN: &[u8] = b"{ ";

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("no record boundary found in {len} bytes")]
    NoRecordBoundary { len: usize },

    #[error("failed to decode records: {0}")]
    DecodeFailure(#[from] serde_json::Error),
}

#[derive(Deserialize)]
struct Envelope<R> {
    records: Vec<R>,
}

/// Offset of the first record sentinel in `bytes`.
pub fn locate_boundary(bytes: &[u8]) -> Result<usize, DecodeError> {
    bytes
        .windows(RECORD_SENTINEL.len())
        .position(|window| window == RECORD_SENTINEL)
        .ok_or(DecodeError::NoRecordBoundary { len: bytes.len() })
}

/// Offset of the `{` opening the record that holds the sentinel at
/// `boundary`, if that brace is inside the fragment.
pub fn record_start(bytes: &[u8], boundary: usize) -> Option<usize> {
    bytes[..boundary]
        .iter()
        .rposition(|&b| b == b'{' || b == b'}')
        .filter(|&pos| bytes[pos] == b'{')
}

/// Rebuild a parseable document from a fragment.
pub fn reconstruct(bytes: &[u8]) -> Result<Vec<u8>, DecodeError> {
    let boundary = locate_boundary(bytes)?;
    let mut document = Vec::with_capacity(ENVELOPE_OPEN.len() + RECORD_OPEN.len() + bytes.len());
    document.extend_from_slice(ENVELOPE_OPEN);
    match record_start(bytes, boundary) {
        Some(start) => document.extend_from_slice(&bytes[start..]),
        None => {
            document.extend_from_slice(RECORD_OPEN);
            document.extend_from_slice(&bytes[boundary..]);
        }
    }
    Ok(document)
}

/// Decode every record contained in a fragment.
pub fn decode_records<R: DeserializeOwned>(bytes: &[u8]) -> Result<Vec<R>, DecodeError> {
    let document = reconstruct(bytes)?;
    let envelope: Envelope<R> = serde_json::from_slice(&document)?;
    Ok(envelope.records)
}
