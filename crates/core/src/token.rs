//! Verification-token generation.
//!
//! Every trigger gets an opaque verification token shared with the provider
//! (as the GitHub hook secret, the Pub/Sub channel token, ...). Tokens carry
//! 256 bits of entropy, comfortably above the 128-bit floor the providers
//! require.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use rand::RngCore;

/// Number of random bytes in a verification token (256 bits).
pub const TOKEN_BYTES: usize = 32;

/// Generate a new URL-safe verification token.
pub fn generate_verification_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
