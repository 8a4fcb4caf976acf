//! Opaque identifier generation
//!
//! Every identifier the broker hands out is drawn from the thread-local
//! CSPRNG (`rand::rng()`, OS-seeded ChaCha) and rendered as lowercase hex,
//! so lengths are fixed: 32 chars for client IDs, 64 for everything else.

use rand::RngExt;

use crate::constants::{CLIENT_ID_BYTES, SECRET_BYTES};

/// Number of leading characters of an identifier that are safe to log.
const LOG_PREFIX_LEN: usize = 8;

/// Generate a fresh `client_id` (16 random bytes, 32 hex chars).
pub fn generate_client_id() -> String {
    random_hex::<CLIENT_ID_BYTES>()
}

/// Generate a fresh `client_secret` (32 random bytes, 64 hex chars).
pub fn generate_client_secret() -> String {
    random_hex::<SECRET_BYTES>()
}

/// Generate a fresh authorization code (32 random bytes, 64 hex chars).
pub fn generate_code() -> String {
    random_hex::<SECRET_BYTES>()
}

/// Generate a fresh access token (32 random bytes, 64 hex chars).
pub fn generate_access_token() -> String {
    random_hex::<SECRET_BYTES>()
}

/// Shorten a bearer credential for log output.
///
/// Codes and tokens grant access on presentation, so only a prefix ever
/// reaches the logs.
pub fn log_prefix(id: &str) -> &str {
    id.get(..LOG_PREFIX_LEN).unwrap_or(id)
}

fn random_hex<const N: usize>() -> String {
    let mut bytes = [0u8; N];
    rand::rng().fill(&mut bytes);
    hex::encode(bytes)
}
