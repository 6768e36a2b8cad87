//! Payload checksums.

use crate::error::ProtocolResult;
use crate::Payload;
use sha2::{Digest, Sha256};

/// Computes the checksum of an operation payload.
///
/// SHA-256 over the compact JSON encoding, lowercase hex. Object keys are
/// serialized in sorted order, so equal payloads always produce equal
/// checksums.
pub fn payload_checksum(data: &Payload) -> ProtocolResult<String> {
    let bytes = serde_json::to_vec(data)?;
    let digest = Sha256::digest(&bytes);
    Ok(digest.iter().map(|b| format!("{b:02x}")).collect())
}
