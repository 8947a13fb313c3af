use crate::errors::{AppError, ResultExt};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Persisted client state: the bearer token and the recruiter id.
///
/// This is the only durable state the client keeps. It survives restarts
/// so a recruiter does not have to log in for every command.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PersistedSession {
    pub auth_token: Option<String>,
    pub recruiter_id: Option<String>,
}

impl PersistedSession {
    pub fn is_empty(&self) -> bool {
        self.auth_token.is_none() && self.recruiter_id.is_none()
    }
}

/// Wrapper for persisted data with integrity validation
///
/// Protects against a half-written or hand-edited session file:
/// 1. A SHA-256 checksum is computed when the data is written
/// 2. The checksum is re-checked when the data is read back
/// 3. A mismatch makes the file load as an empty session
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ValidatedEntry {
    /// The persisted data (JSON string)
    pub data: String,
    /// SHA-256 checksum of the data (hex encoded)
    pub checksum: String,
}

impl ValidatedEntry {
    /// Creates a new validated entry with computed checksum
    pub fn new(data: String) -> Self {
        let checksum = Self::compute_checksum(&data);
        Self { data, checksum }
    }

    fn compute_checksum(data: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(data.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Returns true if the checksum matches, false if tampered
    pub fn is_valid(&self) -> bool {
        Self::compute_checksum(&self.data) == self.checksum
    }

    pub fn serialize(&self) -> Result<String, AppError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Deserializes and validates an entry
    ///
    /// Returns Some(data) if valid, None if corrupted or invalid JSON
    pub fn deserialize_and_validate(serialized: &str) -> Option<String> {
        let entry: ValidatedEntry = serde_json::from_str(serialized).ok()?;

        if entry.is_valid() {
            Some(entry.data)
        } else {
            tracing::warn!(
                "Session validation failed: checksum mismatch. Expected: {}, Data length: {}",
                entry.checksum,
                entry.data.len()
            );
            None
        }
    }
}

/// Durable key/value home for the session, the analogue of browser
/// local storage.
pub trait SessionStore: Send + Sync {
    /// Reads the persisted session. Missing or corrupt storage reads as empty.
    fn load(&self) -> Result<PersistedSession, AppError>;

    fn save(&self, session: &PersistedSession) -> Result<(), AppError>;

    /// Removes both keys. Clearing already-empty storage succeeds.
    fn clear(&self) -> Result<(), AppError>;
}

/// Session persisted as a checksummed JSON file.
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SessionStore for FileSessionStore {
    fn load(&self) -> Result<PersistedSession, AppError> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(PersistedSession::default());
            }
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("reading session file {}", self.path.display())
                })
            }
        };

        let Some(data) = ValidatedEntry::deserialize_and_validate(&raw) else {
            tracing::warn!(
                "Ignoring unreadable session file {}",
                self.path.display()
            );
            return Ok(PersistedSession::default());
        };

        match serde_json::from_str(&data) {
            Ok(session) => Ok(session),
            Err(e) => {
                tracing::warn!("Ignoring malformed session payload: {}", e);
                Ok(PersistedSession::default())
            }
        }
    }

    fn save(&self, session: &PersistedSession) -> Result<(), AppError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("creating session directory {}", parent.display())
                })?;
            }
        }

        let entry = ValidatedEntry::new(serde_json::to_string(session)?);
        // Write-then-rename so a crash never leaves a truncated file behind.
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, entry.serialize()?)
            .with_context(|| format!("writing session file {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("replacing session file {}", self.path.display()))?;

        tracing::debug!("Session persisted to {}", self.path.display());
        Ok(())
    }

    fn clear(&self) -> Result<(), AppError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                tracing::debug!("Session file {} removed", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e)
                .with_context(|| format!("removing session file {}", self.path.display())),
        }
    }
}

/// In-process store, used by tests and by callers that opt out of
/// persistence.
#[derive(Default)]
pub struct MemorySessionStore {
    inner: Mutex<PersistedSession>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(session: PersistedSession) -> Self {
        Self {
            inner: Mutex::new(session),
        }
    }

    /// Current contents, for inspection.
    pub fn snapshot(&self) -> PersistedSession {
        self.inner
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    fn with_lock<R>(&self, f: impl FnOnce(&mut PersistedSession) -> R) -> Result<R, AppError> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| AppError::Storage("memory session store poisoned".to_string()))?;
        Ok(f(&mut guard))
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self) -> Result<PersistedSession, AppError> {
        self.with_lock(|session| session.clone())
    }

    fn save(&self, session: &PersistedSession) -> Result<(), AppError> {
        self.with_lock(|stored| *stored = session.clone())
    }

    fn clear(&self) -> Result<(), AppError> {
        self.with_lock(|stored| *stored = PersistedSession::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> PersistedSession {
        PersistedSession {
            auth_token: Some("eyJhbGciOiJIUzI1NiJ9.payload.sig".to_string()),
            recruiter_id: Some("42".to_string()),
        }
    }

    #[test]
    fn test_entry_validation() {
        let data = r#"{"auth_token":"t","recruiter_id":"1"}"#.to_string();
        let entry = ValidatedEntry::new(data.clone());

        assert!(entry.is_valid());
        assert_eq!(entry.data, data);
    }

    #[test]
    fn test_tampered_entry_returns_none() {
        let entry = ValidatedEntry::new(r#"{"recruiter_id":"1"}"#.to_string());
        let serialized = entry.serialize().unwrap();

        let tampered = serialized.replace("\\\"1\\\"", "\\\"2\\\"");
        assert_ne!(tampered, serialized);
        assert_eq!(ValidatedEntry::deserialize_and_validate(&tampered), None);
    }

    #[test]
    fn test_file_store_round_trip_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::new(dir.path().join("nested").join("session.json"));

        assert!(store.load().unwrap().is_empty());

        store.save(&sample()).unwrap();
        assert_eq!(store.load().unwrap(), sample());

        store.clear().unwrap();
        assert!(store.load().unwrap().is_empty());
        assert!(!store.path().exists());

        // Clearing twice is fine
        store.clear().unwrap();
    }

    #[test]
    fn test_corrupt_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, "{not json").unwrap();

        let store = FileSessionStore::new(&path);
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_memory_store() {
        let store = MemorySessionStore::with_session(sample());
        assert_eq!(store.load().unwrap(), sample());
        store.clear().unwrap();
        assert!(store.snapshot().is_empty());
    }
}
