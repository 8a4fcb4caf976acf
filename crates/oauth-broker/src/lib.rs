//! Authorization-code broker built on `oauth-core`
//!
//! Wires the registry and stores into one `AuthorizationServer` that exposes
//! the operation set a transport layer needs, collapses grant failures into
//! RFC 6749 error codes, and runs the background expiry sweep.
//!
//! Request lifecycle:
//! 1. `register_client` creates a client with fresh credentials
//! 2. `issue_authorization_code` binds an upstream code to a PKCE challenge
//! 3. `exchange_code` consumes the code, verifies it, and mints a bearer token
//! 4. `validate_access_token` resolves the bearer token to the upstream credential
//! 5. `revoke_access_token` or expiry ends the token's life
//! 6. `spawn_sweep_task` purges expired entries in the background

pub mod error;
pub mod server;
pub mod sweeper;

pub use error::{AuthorizationError, Result};
pub use server::{AuthorizationServer, ClientAuthPolicy, ExchangeRequest};
pub use sweeper::{SweepReport, spawn_sweep_task, sweep};
