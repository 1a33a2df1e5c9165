use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng;
use rand::distr::Alphanumeric;
use sha2::{Digest, Sha256};

pub const STATE_LEN: usize = 32;
pub const CODE_VERIFIER_LEN: usize = 128;

/// RFC 7636 unreserved characters.
const VERIFIER_CHARSET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-._~";

/// Generates a cryptographically random code verifier for PKCE.
///
/// Returns a 128-character string drawn from the RFC 7636 unreserved set
/// (the maximum length the RFC allows).
#[must_use]
pub fn generate_code_verifier() -> String {
    let mut rng = rand::rng();
    (0..CODE_VERIFIER_LEN)
        .map(|_| char::from(VERIFIER_CHARSET[rng.random_range(0..VERIFIER_CHARSET.len())]))
        .collect()
}

/// Computes the S256 code challenge from a code verifier.
///
/// `challenge = BASE64URL(SHA256(verifier))`
#[must_use]
pub fn generate_code_challenge(verifier: &str) -> String {
    let hash = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hash)
}

/// Generates a random 32-character alphanumeric `state` for `OAuth2`.
#[must_use]
pub fn generate_state() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(STATE_LEN)
        .map(char::from)
        .collect()
}
