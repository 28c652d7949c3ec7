//! Session Identity
//!
//! The session identifier addresses the backend stream and must survive
//! reconnects and restarts, so it is persisted through a [`SessionStorage`]
//! and only replaced by an explicit rotation.
//!
//! Who the user is (and whether they can sign privileged commands) comes from
//! an [`IdentityProvider`]; this crate ships only [`LocalIdentity`], which
//! cannot sign.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Storage key of the session identifier
pub const SESSION_KEY: &str = "tether.session_id";

/// Errors from session persistence
#[derive(Debug, Error)]
pub enum StorageError {
    /// Reading or writing the backing file failed
    #[error("Session storage I/O error at {path}: {source}")]
    Io {
        /// File involved
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// The backing file is not a JSON object of strings
    #[error("Session storage at {path} is corrupt: {reason}")]
    Corrupt {
        /// File involved
        path: PathBuf,
        /// Parser message
        reason: String,
    },
}

/// Opaque session identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Generate a fresh identifier
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Borrow as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Key/value persistence for the session identifier
#[async_trait]
pub trait SessionStorage: Send + Sync {
    /// Read a value
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Write a value
    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
}

/// Load the persisted session identifier, creating one on first use
///
/// # Errors
///
/// Returns a [`StorageError`] if the storage cannot be read or written.
pub async fn load_or_create_session(storage: &dyn SessionStorage) -> Result<SessionId, StorageError> {
    if let Some(existing) = storage.get(SESSION_KEY).await? {
        if !existing.trim().is_empty() {
            tracing::debug!(session_id = %existing, "Loaded session");
            return Ok(SessionId(existing));
        }
    }
    rotate_session(storage).await
}

/// Replace the persisted session identifier with a fresh one
///
/// # Errors
///
/// Returns a [`StorageError`] if the storage cannot be written.
pub async fn rotate_session(storage: &dyn SessionStorage) -> Result<SessionId, StorageError> {
    let session = SessionId::generate();
    storage.set(SESSION_KEY, session.as_str()).await?;
    tracing::info!(session_id = %session, "Created session");
    Ok(session)
}

/// Default location of the session file
///
/// Returns `$XDG_DATA_HOME/tether/session.json` or the platform equivalent.
#[must_use]
pub fn default_session_path() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("tether").join("session.json"))
}

/// In-memory storage (tests, ephemeral sessions)
#[derive(Debug, Default)]
pub struct MemorySessionStorage {
    values: Mutex<HashMap<String, String>>,
}

impl MemorySessionStorage {
    /// Create an empty storage
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStorage for MemorySessionStorage {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.values.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.values.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// JSON-object file storage
///
/// Writes go to a sibling temp file that is renamed into place.
#[derive(Clone, Debug)]
pub struct FileSessionStorage {
    path: PathBuf,
}

impl FileSessionStorage {
    /// Store values in `path`
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Backing file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> StorageError {
        StorageError::Io {
            path: self.path.clone(),
            source,
        }
    }

    async fn read_all(&self) -> Result<HashMap<String, String>, StorageError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashMap::new()),
            Err(e) => return Err(self.io_error(e)),
        };
        if content.trim().is_empty() {
            return Ok(HashMap::new());
        }
        serde_json::from_str(&content).map_err(|e| StorageError::Corrupt {
            path: self.path.clone(),
            reason: e.to_string(),
        })
    }
}

#[async_trait]
impl SessionStorage for FileSessionStorage {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.read_all().await?.remove(key))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut values = self.read_all().await?;
        values.insert(key.to_string(), value.to_string());

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.io_error(e))?;
        }

        let content = serde_json::to_string_pretty(&values).map_err(|e| StorageError::Corrupt {
            path: self.path.clone(),
            reason: e.to_string(),
        })?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, content)
            .await
            .map_err(|e| self.io_error(e))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| self.io_error(e))?;
        Ok(())
    }
}

/// Source of the user's identifier and command signatures
pub trait IdentityProvider: Send + Sync {
    /// Identifier sent with commands
    fn current_identifier(&self) -> String;

    /// Sign a privileged command; `None` when signing is unavailable
    fn sign(&self, _command: &str) -> Option<String> {
        None
    }
}

/// Identity with a fixed identifier and no signing capability
#[derive(Clone, Debug)]
pub struct LocalIdentity {
    identifier: String,
}

impl LocalIdentity {
    /// Create with an identifier
    #[must_use]
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
        }
    }
}

impl IdentityProvider for LocalIdentity {
    fn current_identifier(&self) -> String {
        self.identifier.clone()
    }
}
