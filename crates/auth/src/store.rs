//! File-backed token persistence.

use crate::{AuthError, Token};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use tracing::{debug, info};

/// On-disk token record.
#[derive(Debug, Serialize, Deserialize)]
struct StoredToken {
    access_token: String,
    refresh_token: Option<String>,
    acquired_at_ms: i64,
    expires_at_ms: i64,
    app_id: String,
    user_id: Option<String>,
    /// Timestamp of the last successful profile probe.
    last_probe_ms: Option<i64>,
}

/// JSON-file token store with atomic, fsynced writes.
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    /// Store at the given path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Persist the token and the probe timestamp.
    pub fn save(&self, token: &Token, last_probe_ms: Option<i64>) -> Result<(), AuthError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let record = StoredToken {
            access_token: token.expose_access().to_string(),
            refresh_token: token.expose_refresh().map(str::to_string),
            acquired_at_ms: token.acquired_at_ms,
            expires_at_ms: token.expires_at_ms,
            app_id: token.app_id.clone(),
            user_id: token.user_id.clone(),
            last_probe_ms,
        };

        let tmp = self.path.with_extension("tmp");
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&serde_json::to_vec_pretty(&record)?)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        info!(path = %self.path.display(), "token saved");
        Ok(())
    }

    /// Load the saved token and its last probe timestamp.
    pub fn load(&self) -> Result<(Token, Option<i64>), AuthError> {
        let bytes = match fs::read(&self.path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(AuthError::NoToken)
            }
            Err(e) => return Err(e.into()),
        };
        let record: StoredToken = serde_json::from_slice(&bytes)?;
        debug!(path = %self.path.display(), "token loaded");
        Ok((
            Token::new(
                record.access_token,
                record.refresh_token,
                record.acquired_at_ms,
                record.expires_at_ms,
                record.app_id,
                record.user_id,
            ),
            record.last_probe_ms,
        ))
    }

    /// Remove saved token material.
    pub fn delete(&self) -> Result<(), AuthError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
