//! Common types shared by the OAuth broker crates

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
