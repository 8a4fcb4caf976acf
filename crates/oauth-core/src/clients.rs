//! Client registry
//!
//! Holds every registered OAuth client behind a tokio Mutex. Clients are
//! immutable once registered and are never removed.
//!
//! The registry can optionally mirror its state to a JSON snapshot file so
//! registrations survive a restart. Snapshot writes use atomic temp-file +
//! rename and happen under the registry lock, so concurrent registrations
//! can't interleave partial files.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use common::Secret;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::ids;

/// A registered OAuth client.
///
/// `created_at` is a unix timestamp in milliseconds. It is informational
/// only; clients don't expire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisteredClient {
    pub client_id: String,
    pub client_secret: Secret<String>,
    /// Allowed callback URIs, in registration order
    pub redirect_uris: Vec<String>,
    pub created_at: u64,
}

impl RegisteredClient {
    /// Whether `uri` exactly matches one of the registered redirect URIs.
    pub fn allows_redirect(&self, uri: &str) -> bool {
        self.redirect_uris.iter().any(|allowed| allowed == uri)
    }
}

/// Thread-safe client registry with optional file persistence.
pub struct ClientRegistry {
    path: Option<PathBuf>,
    state: Mutex<HashMap<String, RegisteredClient>>,
}

impl ClientRegistry {
    /// Create a registry that lives only in memory.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: Mutex::new(HashMap::new()),
        }
    }

    /// Load clients from the given snapshot file.
    ///
    /// If the file doesn't exist, creates it as `{}` and starts empty.
    pub async fn load(path: PathBuf) -> Result<Self> {
        let state = if path.exists() {
            let contents = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| Error::Io(format!("reading client snapshot: {e}")))?;
            let clients: HashMap<String, RegisteredClient> = serde_json::from_str(&contents)
                .map_err(|e| Error::Persistence(format!("parsing client snapshot: {e}")))?;
            info!(path = %path.display(), clients = clients.len(), "loaded registered clients");
            clients
        } else {
            info!(path = %path.display(), "client snapshot not found, starting with empty registry");
            let clients = HashMap::new();
            write_atomic(&path, &clients).await?;
            clients
        };

        Ok(Self {
            path: Some(path),
            state: Mutex::new(state),
        })
    }

    /// Register a new client with fresh credentials.
    ///
    /// Duplicate `redirect_uris` across clients are allowed. If the snapshot
    /// write fails the registration is rolled back and the error returned.
    pub async fn register(&self, redirect_uris: Vec<String>) -> Result<RegisteredClient> {
        let mut state = self.state.lock().await;

        let client_id = loop {
            let candidate = ids::generate_client_id();
            if !state.contains_key(&candidate) {
                break candidate;
            }
        };

        let client = RegisteredClient {
            client_id: client_id.clone(),
            client_secret: Secret::new(ids::generate_client_secret()),
            redirect_uris,
            created_at: now_millis(),
        };
        state.insert(client_id.clone(), client.clone());

        if let Some(path) = &self.path {
            if let Err(e) = write_atomic(path, &state).await {
                state.remove(&client_id);
                return Err(e);
            }
        }

        info!(
            client_id,
            redirect_uris = client.redirect_uris.len(),
            "client registered"
        );
        Ok(client)
    }

    /// Look up a client by ID.
    pub async fn get(&self, client_id: &str) -> Option<RegisteredClient> {
        let state = self.state.lock().await;
        state.get(client_id).cloned()
    }

    /// Number of registered clients.
    pub async fn len(&self) -> usize {
        self.state.lock().await.len()
    }

    /// Whether no clients are registered.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Write the client snapshot atomically.
///
/// Writes to a temporary file in the same directory, then renames it over
/// the target. On unix the temp file is created 0600, since it holds client
/// secrets. If any step fails the temp file is removed.
async fn write_atomic(path: &Path, data: &HashMap<String, RegisteredClient>) -> Result<()> {
    let json = serde_json::to_string_pretty(data)
        .map_err(|e| Error::Persistence(format!("serializing clients: {e}")))?;

    let dir = path
        .parent()
        .ok_or_else(|| Error::Io("client snapshot path has no parent directory".into()))?;

    let tmp_path = dir.join(format!(".clients.tmp.{}", std::process::id()));

    // Creation mode only applies to new files, so clear any leftover first
    let _ = tokio::fs::remove_file(&tmp_path).await;

    if let Err(e) = write_and_rename(&tmp_path, path, json.as_bytes()).await {
        if let Err(cleanup) = tokio::fs::remove_file(&tmp_path).await {
            if cleanup.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %tmp_path.display(), error = %cleanup, "failed to remove temp client snapshot");
            }
        }
        return Err(e);
    }

    debug!(path = %path.display(), clients = data.len(), "persisted client snapshot");
    Ok(())
}

async fn write_and_rename(tmp_path: &Path, path: &Path, contents: &[u8]) -> Result<()> {
    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    options.mode(0o600);

    let mut file = options
        .open(tmp_path)
        .await
        .map_err(|e| Error::Io(format!("creating temp client snapshot: {e}")))?;
    file.write_all(contents)
        .await
        .map_err(|e| Error::Io(format!("writing temp client snapshot: {e}")))?;
    file.sync_all()
        .await
        .map_err(|e| Error::Io(format!("syncing temp client snapshot: {e}")))?;
    drop(file);

    tokio::fs::rename(tmp_path, path)
        .await
        .map_err(|e| Error::Io(format!("renaming temp client snapshot: {e}")))
}
