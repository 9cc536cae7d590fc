//! Change token persistence
//!
//! The change token is the only durable state a sync attempt owns. Stores are
//! written only after an attempt completes without error.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use crate::error::Result;
use crate::schema::ChangeToken;

/// Durable storage for the last consumed change token
pub trait ChangeTokenStore: Send + Sync {
    /// The persisted token, if any
    fn load(&self) -> Result<Option<ChangeToken>>;

    fn save(&self, token: &ChangeToken) -> Result<()>;
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredToken {
    token: ChangeToken,
    saved_at: chrono::DateTime<chrono::Utc>,
}

/// Token store backed by a JSON file
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ChangeTokenStore for FileTokenStore {
    fn load(&self) -> Result<Option<ChangeToken>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&self.path)?;
        let stored: StoredToken = serde_json::from_str(&content)?;
        Ok(Some(stored.token))
    }

    fn save(&self, token: &ChangeToken) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let stored = StoredToken {
            token: token.clone(),
            saved_at: chrono::Utc::now(),
        };
        // Readers only ever see a complete file.
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_string_pretty(&stored)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// Token store held in memory
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    token: Mutex<Option<ChangeToken>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: ChangeToken) -> Self {
        Self {
            token: Mutex::new(Some(token)),
        }
    }
}

impl ChangeTokenStore for MemoryTokenStore {
    fn load(&self) -> Result<Option<ChangeToken>> {
        Ok(self
            .token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn save(&self, token: &ChangeToken) -> Result<()> {
        *self.token.lock().unwrap_or_else(PoisonError::into_inner) = Some(token.clone());
        Ok(())
    }
}
