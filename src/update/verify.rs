//! Detached-signature verification for update binaries.
//!
//! The signature artifact is a small text file of two whitespace-separated
//! hex fields, `s` then `r`, read from the start of the buffer with any
//! trailing content ignored. Together they form the two 32-byte halves of
//! an Ed25519 signature over the binary (`r` ‖ `s` on the wire).

use ed25519_dalek::{Signature, Verifier, VerifyingKey};

use crate::error::{NotifierError, Result};

/// Outcome of a signature check.
///
/// Only an explicit [`Verification::Valid`] authorizes installing the
/// binary; a verification that could not be carried out is reported
/// separately from one that ran and failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    /// Signature checked out.
    Valid,
    /// Signature check ran and the binary does not match.
    Invalid,
    /// The check could not be performed (bad key/fields, missing key).
    Error(String),
}

/// Parse a hex-encoded Ed25519 public key.
pub fn parse_public_key(hex_key: &str) -> Result<VerifyingKey> {
    let bytes = hex::decode(hex_key)
        .map_err(|e| NotifierError::Verification(format!("bad public key hex: {e}")))?;
    let bytes: [u8; 32] = bytes
        .try_into()
        .map_err(|_| NotifierError::Verification("public key must be 32 bytes".to_string()))?;
    VerifyingKey::from_bytes(&bytes)
        .map_err(|e| NotifierError::Verification(format!("bad public key: {e}")))
}

/// Extract the `(s, r)` fields from a signature artifact.
///
/// Returns `None` when fewer than two fields are present.
pub fn parse_signature_fields(body: &[u8]) -> Option<(String, String)> {
    let text = String::from_utf8_lossy(body);
    let mut fields = text.split_ascii_whitespace();
    let s = fields.next()?.to_string();
    let r = fields.next()?.to_string();
    Some((s, r))
}

/// Verify `binary` against the `(s, r)` signature fields.
pub fn verify_detached(
    binary: &[u8],
    sig_s: &str,
    sig_r: &str,
    key: Option<&VerifyingKey>,
) -> Verification {
    let Some(key) = key else {
        return Verification::Error("no update public key configured".to_string());
    };

    let r = match decode_half(sig_r) {
        Ok(half) => half,
        Err(e) => return Verification::Error(format!("bad r field: {e}")),
    };
    let s = match decode_half(sig_s) {
        Ok(half) => half,
        Err(e) => return Verification::Error(format!("bad s field: {e}")),
    };

    let mut sig_bytes = [0u8; 64];
    sig_bytes[..32].copy_from_slice(&r);
    sig_bytes[32..].copy_from_slice(&s);
    let signature = Signature::from_bytes(&sig_bytes);

    match key.verify(binary, &signature) {
        Ok(()) => Verification::Valid,
        Err(_) => Verification::Invalid,
    }
}

fn decode_half(field: &str) -> std::result::Result<[u8; 32], String> {
    let bytes = hex::decode(field).map_err(|e| e.to_string())?;
    bytes
        .try_into()
        .map_err(|_| "field must be 32 bytes".to_string())
}
