//! Credential-issuance core for the OAuth 2.1 broker
//!
//! Provides the building blocks of the authorization-code grant with PKCE:
//! a client registry, a one-time authorization code store, an access token
//! store that maps local bearer tokens to upstream credentials, and the PKCE
//! verifier. Every store owns its state behind a single tokio Mutex, so each
//! operation is atomic with respect to the others.
//!
//! Credential flow:
//! 1. Transport calls `ClientRegistry::register()` for a new client
//! 2. After the upstream login completes, `AuthorizationCodeStore::issue()`
//!    binds the upstream code to the client's PKCE challenge
//! 3. The client redeems the code: `AuthorizationCodeStore::consume()` takes
//!    it atomically and `pkce::verify()` checks the verifier
//! 4. `AccessTokenStore::issue()` mints a bearer token for the upstream credential
//! 5. Resource requests resolve it via `AccessTokenStore::validate()`

pub mod clients;
pub mod codes;
pub mod constants;
pub mod error;
pub mod ids;
pub mod pkce;
pub mod tokens;

pub use clients::{ClientRegistry, RegisteredClient};
pub use codes::{AuthorizationCode, AuthorizationCodeStore, CodeRequest};
pub use constants::*;
pub use error::{Error, Result};
pub use pkce::{CodeChallengeMethod, compute_challenge, generate_verifier};
pub use tokens::{AccessToken, AccessTokenStore, TokenResponse};
