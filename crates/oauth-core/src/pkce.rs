//! PKCE (Proof Key for Code Exchange) verification per RFC 7636
//!
//! The client sends a `code_challenge` when the authorization code is issued
//! and the matching `code_verifier` when it redeems the code. Verification is
//! a pure function of those two strings and the stored method.

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngExt;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Challenge transformation declared by the client at issuance.
///
/// Unknown methods are kept rather than rejected: the code can still be
/// issued, but it can never be redeemed because verification always fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodeChallengeMethod {
    /// `BASE64URL(SHA256(verifier)) == challenge`
    S256,
    /// `verifier == challenge`
    Plain,
    /// Anything else the client sent
    Unsupported(String),
}

impl CodeChallengeMethod {
    /// Wire name of the method.
    pub fn as_str(&self) -> &str {
        match self {
            CodeChallengeMethod::S256 => "S256",
            CodeChallengeMethod::Plain => "plain",
            CodeChallengeMethod::Unsupported(other) => other,
        }
    }
}

impl From<&str> for CodeChallengeMethod {
    fn from(value: &str) -> Self {
        match value {
            "S256" => CodeChallengeMethod::S256,
            "plain" => CodeChallengeMethod::Plain,
            other => CodeChallengeMethod::Unsupported(other.to_string()),
        }
    }
}

impl fmt::Display for CodeChallengeMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Check a presented verifier against the stored challenge.
///
/// Comparison is constant-time over the encoded strings. Any method other
/// than `S256` or `plain` fails.
pub fn verify(code_verifier: &str, code_challenge: &str, method: &CodeChallengeMethod) -> bool {
    match method {
        CodeChallengeMethod::S256 => {
            let computed = compute_challenge(code_verifier);
            computed.as_bytes().ct_eq(code_challenge.as_bytes()).into()
        }
        CodeChallengeMethod::Plain => code_verifier
            .as_bytes()
            .ct_eq(code_challenge.as_bytes())
            .into(),
        CodeChallengeMethod::Unsupported(_) => false,
    }
}

/// Compute the S256 code challenge from a verifier.
///
/// `challenge = BASE64URL(SHA256(verifier))`
pub fn compute_challenge(verifier: &str) -> String {
    let hash = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hash)
}

/// Generate a random code verifier (32 bytes, 43 base64url chars).
///
/// The server never needs one; clients and tests do.
pub fn generate_verifier() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
