use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, anyhow};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tasklane_shared::{TokenResponse, UserDto};
use tempfile::NamedTempFile;
use tracing::{debug, error, info, warn};

const SESSION_FILE: &str = "session.json";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionRecord {
    pub access_token: String,
    #[serde(default)]
    pub user: Option<UserDto>,
}

impl From<TokenResponse> for SessionRecord {
    fn from(token: TokenResponse) -> Self {
        Self {
            access_token: token.access_token,
            user: Some(token.user),
        }
    }
}

/// The authenticated identity every gateway call reads its credential from.
///
/// Shared by reference between the gateway and the dashboard. `teardown` is
/// the single place a session ends, whether by logout or by the server
/// rejecting the credential.
#[derive(Debug)]
pub struct Session {
    record: RwLock<Option<SessionRecord>>,
    path: Option<PathBuf>,
}

impl Session {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Arc<Self>> {
        fs::create_dir_all(data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        let path = data_dir.join(SESSION_FILE);
        let record = if path.exists() {
            let raw = fs::read_to_string(&path)
                .with_context(|| format!("failed reading {}", path.display()))?;
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                None
            } else {
                let record: SessionRecord = serde_json::from_str(trimmed)
                    .with_context(|| format!("failed parsing {}", path.display()))?;
                Some(record)
            }
        } else {
            None
        };

        info!(
            file = %path.display(),
            authorized = record.is_some(),
            "opened session"
        );

        Ok(Arc::new(Self {
            record: RwLock::new(record),
            path: Some(path),
        }))
    }

    pub fn in_memory(record: Option<SessionRecord>) -> Arc<Self> {
        Arc::new(Self {
            record: RwLock::new(record),
            path: None,
        })
    }

    pub fn token(&self) -> Option<String> {
        self.record
            .read()
            .as_ref()
            .map(|record| record.access_token.clone())
    }

    pub fn user(&self) -> Option<UserDto> {
        self.record
            .read()
            .as_ref()
            .and_then(|record| record.user.clone())
    }

    pub fn is_authorized(&self) -> bool {
        self.record.read().is_some()
    }

    #[tracing::instrument(skip(self, record), fields(user = ?record.user.as_ref().map(|u| &u.email)))]
    pub fn establish(&self, record: SessionRecord) -> anyhow::Result<()> {
        if let Some(path) = self.path.as_deref() {
            save_record_atomic(path, &record)?;
        }
        *self.record.write() = Some(record);
        info!("session established");
        Ok(())
    }

    /// Clears the credential in memory and on disk. Never fails: a stale
    /// session file that cannot be removed is logged and left behind.
    #[tracing::instrument(skip(self))]
    pub fn teardown(&self) {
        let had_session = self.record.write().take().is_some();

        if let Some(path) = self.path.as_deref()
            && path.exists()
            && let Err(err) = fs::remove_file(path)
        {
            error!(file = %path.display(), error = %err, "failed removing session file");
        }

        if had_session {
            warn!("session torn down; re-authentication required");
        } else {
            debug!("teardown requested without an active session");
        }
    }
}

#[tracing::instrument(skip(path, record))]
fn save_record_atomic(path: &Path, record: &SessionRecord) -> anyhow::Result<()> {
    debug!(file = %path.display(), "saving session atomically");

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)?;
    let serialized = serde_json::to_string_pretty(record)?;
    writeln!(temp, "{serialized}")?;
    temp.flush()?;

    temp.persist(path)
        .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;
    use uuid::Uuid;

    use super::*;

    fn record() -> SessionRecord {
        SessionRecord {
            access_token: "token-abc".to_string(),
            user: Some(UserDto {
                id: Uuid::new_v4(),
                email: "ada@example.com".to_string(),
                name: "Ada".to_string(),
                created_at: "2025-01-01T00:00:00".to_string(),
            }),
        }
    }

    #[test]
    fn establish_persists_and_reopens() {
        let temp = tempdir().expect("tempdir");
        let session = Session::open(temp.path()).expect("open session");
        assert!(!session.is_authorized());

        session.establish(record()).expect("establish");

        let reopened = Session::open(temp.path()).expect("reopen session");
        assert_eq!(reopened.token().as_deref(), Some("token-abc"));
        assert_eq!(
            reopened.user().map(|user| user.email),
            Some("ada@example.com".to_string())
        );
    }

    #[test]
    fn teardown_clears_memory_and_file() {
        let temp = tempdir().expect("tempdir");
        let session = Session::open(temp.path()).expect("open session");
        session.establish(record()).expect("establish");

        session.teardown();

        assert!(!session.is_authorized());
        assert!(!temp.path().join(SESSION_FILE).exists());
        let reopened = Session::open(temp.path()).expect("reopen session");
        assert!(reopened.token().is_none());
    }
}
