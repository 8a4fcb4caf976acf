//! Protocol constants and default lifetimes
//!
//! The TTLs below are defaults; the server binary can override them from
//! configuration. The sweep interval must stay shorter than the shortest TTL
//! it protects so stale entries never linger for more than one TTL.

use std::time::Duration;

/// Authorization codes are redeemable for 10 minutes after issuance
pub const DEFAULT_CODE_TTL: Duration = Duration::from_secs(10 * 60);

/// Access tokens are valid for one hour after issuance
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(60 * 60);

/// Background sweep cadence for both stores
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// The only token type this server issues
pub const TOKEN_TYPE_BEARER: &str = "Bearer";

/// Random bytes behind a `client_id` (32 hex chars)
pub const CLIENT_ID_BYTES: usize = 16;

/// Random bytes behind a `client_secret`, authorization code, or access token (64 hex chars)
pub const SECRET_BYTES: usize = 32;
