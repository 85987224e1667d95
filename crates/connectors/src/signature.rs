//! HMAC and replay-window primitives shared by the provider connectors.
//!
//! All comparisons go through `Mac::verify_slice`, which is constant-time;
//! connectors never compare signature strings directly.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::ConnectorError;

type HmacSha256 = Hmac<Sha256>;

/// Compute an HMAC-SHA256 digest.
pub fn hmac_sha256(secret: &[u8], message: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts any key length");
    mac.update(message);
    mac.finalize().into_bytes().to_vec()
}

/// Hex-encoded HMAC-SHA256 (GitHub, Slack).
pub fn hmac_sha256_hex(secret: &[u8], message: &[u8]) -> String {
    hex::encode(hmac_sha256(secret, message))
}

/// Base64-encoded HMAC-SHA256 (Shopify, HubSpot v3).
pub fn hmac_sha256_base64(secret: &[u8], message: &[u8]) -> String {
    STANDARD.encode(hmac_sha256(secret, message))
}

/// Constant-time check of a hex-encoded signature.
pub fn verify_hmac_hex(secret: &[u8], message: &[u8], expected_hex: &str) -> bool {
    let Ok(expected) = hex::decode(expected_hex) else {
        return false;
    };
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts any key length");
    mac.update(message);
    mac.verify_slice(&expected).is_ok()
}

/// Constant-time check of a base64-encoded signature.
pub fn verify_hmac_base64(secret: &[u8], message: &[u8], expected_b64: &str) -> bool {
    let Ok(expected) = STANDARD.decode(expected_b64) else {
        return false;
    };
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts any key length");
    mac.update(message);
    mac.verify_slice(&expected).is_ok()
}

/// Reject provider timestamps outside the replay window.
///
/// The window is symmetric: clocks skew in both directions, and a timestamp
/// from the future is as suspect as a stale one.
pub fn check_timestamp_skew(
    provider_ts_secs: i64,
    max_skew_secs: i64,
) -> Result<(), ConnectorError> {
    let age_secs = (Utc::now().timestamp() - provider_ts_secs).abs();
    if age_secs > max_skew_secs {
        return Err(ConnectorError::StaleTimestamp {
            age_secs,
            max_secs: max_skew_secs,
        });
    }
    Ok(())
}
