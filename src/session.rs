//! Persisted login session.
//!
//! Two keys survive restarts: `session_token` holds the opaque token and
//! `user_info` a JSON object `{user_id, nickname, points}`. Both live in a
//! [`KeyValueStore`]; [`MemoryStore`] backs tests and [`FileStore`] keeps a
//! small JSON map on disk.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::config::ClientConfig;

pub const TOKEN_KEY: &str = "session_token";
pub const USER_INFO_KEY: &str = "user_info";

/// Profile cached alongside the token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: i64,
    pub nickname: String,
    pub points: i64,
}

/// A logged-in user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub token: String,
    pub profile: UserProfile,
}

/// String key-value persistence.
///
/// Writes are best effort: failures are logged, never returned.
pub trait KeyValueStore: Clone + Send + Sync + 'static {
    fn save(&self, key: &str, value: &str);
    fn load(&self, key: &str) -> Option<String>;
    fn remove(&self, key: &str);
}

// ── In-memory store ─────────────────────────────────────────────────

/// Process-local store. Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    values: Arc<RwLock<HashMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn save(&self, key: &str, value: &str) {
        match self.values.write() {
            Ok(mut guard) => {
                guard.insert(key.to_string(), value.to_string());
            }
            Err(e) => tracing::error!("memory store lock poisoned: {e}"),
        }
    }

    fn load(&self, key: &str) -> Option<String> {
        match self.values.read() {
            Ok(guard) => guard.get(key).cloned(),
            Err(e) => {
                tracing::error!("memory store lock poisoned: {e}");
                None
            }
        }
    }

    fn remove(&self, key: &str) {
        match self.values.write() {
            Ok(mut guard) => {
                guard.remove(key);
            }
            Err(e) => tracing::error!("memory store lock poisoned: {e}"),
        }
    }
}

// ── File store ──────────────────────────────────────────────────────

/// JSON map on disk, cached in memory and rewritten on every change.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
    cache: Arc<RwLock<HashMap<String, String>>>,
}

impl FileStore {
    /// Open (or lazily create) the store at `path`.
    ///
    /// An unreadable or corrupt file starts the store empty.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let cache = if path.exists() {
            match fs::read_to_string(&path) {
                Ok(data) => match serde_json::from_str::<HashMap<String, String>>(&data) {
                    Ok(map) => map,
                    Err(e) => {
                        tracing::warn!("failed to parse session file: {e}");
                        HashMap::new()
                    }
                },
                Err(e) => {
                    tracing::warn!("failed to read session file: {e}");
                    HashMap::new()
                }
            }
        } else {
            HashMap::new()
        };

        tracing::debug!(path = %path.display(), "session storage initialized");
        Self {
            path,
            cache: Arc::new(RwLock::new(cache)),
        }
    }

    /// The platform config directory, or the working directory if none exists.
    pub fn default_path() -> PathBuf {
        match ProjectDirs::from("de", "wahlplakat", "wahlplakat-client") {
            Some(dirs) => dirs.config_dir().join("session.json"),
            None => PathBuf::from("wahlplakat_session.json"),
        }
    }

    /// Open the store configured in `config`, or the default location.
    pub fn from_config(config: &ClientConfig) -> Self {
        match &config.storage_path {
            Some(path) => Self::open(path.clone()),
            None => Self::open(Self::default_path()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self) {
        if let Some(parent) = self.path.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                tracing::error!("failed to create session directory: {e}");
                return;
            }
        }

        let data = match self.cache.read() {
            Ok(guard) => serde_json::to_string_pretty(&*guard),
            Err(e) => {
                tracing::error!("session cache lock poisoned: {e}");
                return;
            }
        };
        match data {
            Ok(data) => {
                if let Err(e) = fs::write(&self.path, data) {
                    tracing::error!("failed to write session file: {e}");
                }
            }
            Err(e) => tracing::error!("failed to serialize session data: {e}"),
        }
    }
}

impl KeyValueStore for FileStore {
    fn save(&self, key: &str, value: &str) {
        match self.cache.write() {
            Ok(mut guard) => {
                guard.insert(key.to_string(), value.to_string());
            }
            Err(e) => {
                tracing::error!("session cache lock poisoned: {e}");
                return;
            }
        }
        self.persist();
    }

    fn load(&self, key: &str) -> Option<String> {
        match self.cache.read() {
            Ok(guard) => guard.get(key).cloned(),
            Err(e) => {
                tracing::error!("session cache lock poisoned: {e}");
                None
            }
        }
    }

    fn remove(&self, key: &str) {
        match self.cache.write() {
            Ok(mut guard) => {
                guard.remove(key);
            }
            Err(e) => {
                tracing::error!("session cache lock poisoned: {e}");
                return;
            }
        }
        self.persist();
    }
}

// ── Session store ───────────────────────────────────────────────────

/// Reads and writes the session through a [`KeyValueStore`].
#[derive(Debug, Clone)]
pub struct SessionStore<S> {
    store: S,
}

impl<S: KeyValueStore> SessionStore<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn save(&self, token: &str, profile: &UserProfile) {
        match serde_json::to_string(profile) {
            Ok(json) => {
                self.store.save(TOKEN_KEY, token);
                self.store.save(USER_INFO_KEY, &json);
                tracing::debug!(nickname = %profile.nickname, "session saved");
            }
            Err(e) => tracing::error!("failed to serialize user info: {e}"),
        }
    }

    /// The stored session, if both keys are present and `user_info` parses.
    pub fn load(&self) -> Option<Session> {
        let token = self.store.load(TOKEN_KEY)?;
        let raw = self.store.load(USER_INFO_KEY)?;
        match serde_json::from_str::<UserProfile>(&raw) {
            Ok(profile) => Some(Session { token, profile }),
            Err(e) => {
                tracing::warn!("stored user info is corrupt, ignoring session: {e}");
                None
            }
        }
    }

    pub fn clear(&self) {
        self.store.remove(TOKEN_KEY);
        self.store.remove(USER_INFO_KEY);
        tracing::debug!("session cleared");
    }

    /// Persist a server-reported point total. No-op without a session.
    pub fn update_points(&self, points: i64) -> Option<Session> {
        let mut session = self.load()?;
        session.profile.points = points;
        self.save(&session.token, &session.profile);
        Some(session)
    }

    /// Replace the cached profile, keeping the token.
    pub fn update_profile(&self, profile: &UserProfile) -> Option<Session> {
        let token = self.store.load(TOKEN_KEY)?;
        self.save(&token, profile);
        Some(Session {
            token,
            profile: profile.clone(),
        })
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    fn ana() -> UserProfile {
        UserProfile {
            user_id: 7,
            nickname: "ana".into(),
            points: 0,
        }
    }

    #[test]
    fn save_then_load_returns_session() {
        let sessions = SessionStore::new(MemoryStore::new());
        sessions.save("T", &ana());
        let session = sessions.load().unwrap();
        assert_eq!(session.token, "T");
        assert_eq!(session.profile, ana());
    }

    #[test]
    fn user_info_is_stored_as_json_object() {
        let store = MemoryStore::new();
        SessionStore::new(store.clone()).save("T", &ana());
        let raw: serde_json::Value =
            serde_json::from_str(&store.load(USER_INFO_KEY).unwrap()).unwrap();
        assert_eq!(
            raw,
            serde_json::json!({"user_id": 7, "nickname": "ana", "points": 0})
        );
        assert_eq!(store.load(TOKEN_KEY).as_deref(), Some("T"));
    }

    #[test]
    fn corrupt_user_info_means_no_session() {
        let store = MemoryStore::new();
        store.save(TOKEN_KEY, "T");
        store.save(USER_INFO_KEY, "{not json");
        assert!(SessionStore::new(store).load().is_none());
    }

    #[test]
    fn token_without_user_info_means_no_session() {
        let store = MemoryStore::new();
        store.save(TOKEN_KEY, "T");
        assert!(SessionStore::new(store).load().is_none());
    }

    #[test]
    fn clear_removes_both_keys() {
        let store = MemoryStore::new();
        let sessions = SessionStore::new(store.clone());
        sessions.save("T", &ana());
        sessions.clear();
        assert!(store.load(TOKEN_KEY).is_none());
        assert!(store.load(USER_INFO_KEY).is_none());
    }

    #[test]
    fn update_points_persists() {
        let sessions = SessionStore::new(MemoryStore::new());
        assert!(sessions.update_points(3).is_none());
        sessions.save("T", &ana());
        sessions.update_points(3).unwrap();
        assert_eq!(sessions.load().unwrap().profile.points, 3);
    }

    #[test]
    fn file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("session.json");

        SessionStore::new(FileStore::open(&path)).save("T", &ana());
        let reopened = SessionStore::new(FileStore::open(&path));
        assert_eq!(reopened.load().unwrap().token, "T");

        reopened.clear();
        assert!(SessionStore::new(FileStore::open(&path)).load().is_none());
    }

    #[test]
    fn corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        fs::write(&path, "garbage").unwrap();
        let store = FileStore::open(&path);
        assert!(store.load(TOKEN_KEY).is_none());
    }
}
