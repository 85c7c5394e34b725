//! Order webhook signature verification.
//!
//! The platform signs each delivery with HMAC-SHA256 over the exact request
//! body and sends the hex digest in a header. Verification must run on the
//! bytes as received: parsing and re-serialising the JSON changes key order
//! and whitespace, and the digest no longer matches.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::warn;

type HmacSha256 = Hmac<Sha256>;

/// Compute the hex HMAC-SHA256 of `body` under `secret`.
///
/// Returns `None` only if the MAC cannot be keyed, which HMAC never refuses
/// in practice.
pub fn sign_payload(secret: &str, body: &[u8]) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(body);
    Some(hex::encode(mac.finalize().into_bytes()))
}

/// Verify an order webhook signature.
///
/// # Arguments
///
/// * `secret` - The shared webhook secret, `None` when unconfigured
/// * `body` - The raw request body exactly as received
/// * `signature` - The header value, `None` when the header is absent
///
/// # Returns
///
/// `true` only when the signature is the hex HMAC of `body`. Every failure
/// mode (missing secret, missing or malformed header, length mismatch)
/// resolves to `false`.
pub fn verify_order_signature(secret: Option<&str>, body: &[u8], signature: Option<&str>) -> bool {
    let secret = match secret.filter(|s| !s.trim().is_empty()) {
        Some(s) => s,
        None => {
            warn!("order_signature_secret_unconfigured");
            return false;
        }
    };

    let signature = match signature.map(str::trim).filter(|s| !s.is_empty()) {
        Some(s) => s,
        None => {
            warn!(body_length = body.len(), "order_signature_missing");
            return false;
        }
    };

    let provided = match hex::decode(signature) {
        Ok(bytes) => bytes,
        Err(_) => {
            warn!(signature_length = signature.len(), "order_signature_not_hex");
            return false;
        }
    };

    let expected = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mut mac) => {
            mac.update(body);
            mac.finalize().into_bytes()
        }
        Err(_) => {
            warn!("order_signature_invalid_key");
            return false;
        }
    };

    if expected.len() != provided.len() {
        warn!(
            expected_length = expected.len(),
            actual_length = provided.len(),
            "order_signature_length_mismatch"
        );
        return false;
    }

    let valid: bool = expected.as_slice().ct_eq(provided.as_slice()).into();

    if !valid {
        warn!(body_length = body.len(), "order_signature_mismatch");
    }

    valid
}
