use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use slotwatch_core::AuthError;

/// Bearer credential for the courier account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// Access token for API requests
    pub access_token: String,

    /// Refresh token for token renewal
    pub refresh_token: String,

    /// Token expiration timestamp (Unix timestamp, seconds)
    pub expires_at: i64,
}

impl Credential {
    /// Check if the token is expired at `now` (Unix seconds)
    pub fn is_expired_at(&self, now: i64) -> bool {
        now >= self.expires_at
    }

    /// Check if the token is expired
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(chrono::Utc::now().timestamp())
    }
}

/// Single-slot store for the cached credential.
///
/// Implementations decide where the credential lives (file, memory, secret store).
pub trait CredentialCache: Send {
    /// Read the cached credential, `None` when nothing is stored.
    fn load(&self) -> Result<Option<Credential>, AuthError>;

    /// Replace the cached credential.
    fn store(&self, credential: &Credential) -> Result<(), AuthError>;

    /// Remove the cached credential. Removing nothing is not an error.
    fn clear(&self) -> Result<(), AuthError>;
}

/// Credential persisted as a JSON file so it survives restarts
pub struct FileCredentialCache {
    path: PathBuf,
}

impl FileCredentialCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialCache for FileCredentialCache {
    fn load(&self) -> Result<Option<Credential>, AuthError> {
        if !self.path.exists() {
            return Ok(None);
        }

        let json = fs::read_to_string(&self.path)
            .map_err(|e| AuthError::StorageError(format!("Failed to read token file: {}", e)))?;

        match serde_json::from_str::<Credential>(&json) {
            Ok(credential) => Ok(Some(credential)),
            Err(e) => {
                // Unreadable state is discarded; a fresh token gets issued instead.
                tracing::warn!("Discarding corrupt token file {:?}: {}", self.path, e);
                self.clear()?;
                Ok(None)
            }
        }
    }

    fn store(&self, credential: &Credential) -> Result<(), AuthError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                AuthError::StorageError(format!("Failed to create token directory: {}", e))
            })?;
        }

        let json = serde_json::to_string_pretty(credential)
            .map_err(|e| AuthError::StorageError(format!("Failed to serialize token: {}", e)))?;

        fs::write(&self.path, json)
            .map_err(|e| AuthError::StorageError(format!("Failed to write token file: {}", e)))?;

        tracing::debug!("Stored credential at {:?}", self.path);
        Ok(())
    }

    fn clear(&self) -> Result<(), AuthError> {
        if self.path.exists() {
            fs::remove_file(&self.path).map_err(|e| {
                AuthError::StorageError(format!("Failed to delete token file: {}", e))
            })?;
            tracing::info!("Deleted credential at {:?}", self.path);
        }
        Ok(())
    }
}

/// Process-local cache, used in tests and when persistence is not wanted
#[derive(Default)]
pub struct MemoryCredentialCache {
    slot: Mutex<Option<Credential>>,
}

impl MemoryCredentialCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credential(credential: Credential) -> Self {
        Self {
            slot: Mutex::new(Some(credential)),
        }
    }
}

impl CredentialCache for MemoryCredentialCache {
    fn load(&self) -> Result<Option<Credential>, AuthError> {
        Ok(self.slot.lock().clone())
    }

    fn store(&self, credential: &Credential) -> Result<(), AuthError> {
        *self.slot.lock() = Some(credential.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), AuthError> {
        *self.slot.lock() = None;
        Ok(())
    }
}
