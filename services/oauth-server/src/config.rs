//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! Only `[server]` is required; every `[oauth]` key has a default matching
//! the broker's built-in lifetimes.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use oauth_broker::ClientAuthPolicy;
use serde::Deserialize;

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub oauth: OAuthConfig,
}

/// Listener settings
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Public OAuth endpoints (register, token, revoke)
    pub listen_addr: SocketAddr,
    /// Internal endpoints for the upstream login flow and resource proxy.
    /// Keep this off any public interface.
    pub admin_addr: SocketAddr,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

/// Credential lifetimes and client policy
#[derive(Debug, Deserialize)]
pub struct OAuthConfig {
    #[serde(default = "default_code_ttl")]
    pub code_ttl_secs: u64,
    #[serde(default = "default_token_ttl")]
    pub token_ttl_secs: u64,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
    /// Enforce `client_secret` at the token endpoint (confidential clients)
    #[serde(default)]
    pub require_client_secret: bool,
    /// JSON snapshot of registered clients; in-memory only when unset
    #[serde(default)]
    pub clients_path: Option<PathBuf>,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            code_ttl_secs: default_code_ttl(),
            token_ttl_secs: default_token_ttl(),
            sweep_interval_secs: default_sweep_interval(),
            require_client_secret: false,
            clients_path: None,
        }
    }
}

impl OAuthConfig {
    pub fn code_ttl(&self) -> Duration {
        Duration::from_secs(self.code_ttl_secs)
    }

    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.token_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn client_auth(&self) -> ClientAuthPolicy {
        if self.require_client_secret {
            ClientAuthPolicy::RequireSecret
        } else {
            ClientAuthPolicy::Public
        }
    }
}

fn default_max_connections() -> usize {
    1000
}

fn default_code_ttl() -> u64 {
    oauth_core::DEFAULT_CODE_TTL.as_secs()
}

fn default_token_ttl() -> u64 {
    oauth_core::DEFAULT_TOKEN_TTL.as_secs()
}

fn default_sweep_interval() -> u64 {
    oauth_core::DEFAULT_SWEEP_INTERVAL.as_secs()
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    ///
    /// `OAUTH_CLIENTS_PATH` overrides `oauth.clients_path`.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        if let Ok(p) = std::env::var("OAUTH_CLIENTS_PATH") {
            if !p.trim().is_empty() {
                config.oauth.clients_path = Some(PathBuf::from(p.trim()));
            }
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> common::Result<()> {
        if self.server.max_connections == 0 {
            return Err(common::Error::Config(
                "max_connections must be greater than 0".into(),
            ));
        }

        if self.server.listen_addr == self.server.admin_addr {
            return Err(common::Error::Config(format!(
                "listen_addr and admin_addr must differ, both are {}",
                self.server.listen_addr
            )));
        }

        for (name, value) in [
            ("code_ttl_secs", self.oauth.code_ttl_secs),
            ("token_ttl_secs", self.oauth.token_ttl_secs),
            ("sweep_interval_secs", self.oauth.sweep_interval_secs),
        ] {
            if value == 0 {
                return Err(common::Error::Config(format!(
                    "{name} must be greater than 0"
                )));
            }
        }

        // The sweep must run more often than the shortest TTL it protects
        let shortest_ttl = self.oauth.code_ttl_secs.min(self.oauth.token_ttl_secs);
        if self.oauth.sweep_interval_secs >= shortest_ttl {
            return Err(common::Error::Config(format!(
                "sweep_interval_secs ({}) must be shorter than the shortest TTL ({shortest_ttl})",
                self.oauth.sweep_interval_secs
            )));
        }

        Ok(())
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("oauth-broker.toml")
    }
}
