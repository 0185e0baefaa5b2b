//! Persistence of the two session slots that survive a restart.

use crate::error::ClientError;
use log::warn;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub const ROOM_CODE_KEY: &str = "tictac.roomCode";
pub const PLAYER_ID_KEY: &str = "tictac.playerId";

/// Minimal string key-value storage.
pub trait KeyValueStore: Send {
    fn get(&self, key: &str) -> Result<Option<String>, ClientError>;
    fn set(&self, key: &str, value: &str) -> Result<(), ClientError>;
    fn remove(&self, key: &str) -> Result<(), ClientError>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(room_code: &str, player_id: &str) -> Self {
        let store = Self::new();
        if let Ok(mut values) = store.values.lock() {
            values.insert(ROOM_CODE_KEY.to_string(), room_code.to_string());
            values.insert(PLAYER_ID_KEY.to_string(), player_id.to_string());
        }
        store
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>, ClientError> {
        self.values
            .lock()
            .map_err(|_| ClientError::Storage("memory store poisoned".to_string()))
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, ClientError> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), ClientError> {
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), ClientError> {
        self.lock()?.remove(key);
        Ok(())
    }
}

/// Stores all keys in one JSON object on disk, rewritten on every change.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    values: Mutex<HashMap<String, String>>,
}

impl FileStore {
    /// Opens `path`, starting empty when the file is missing or unreadable.
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let values = match fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
                warn!("Ignoring unreadable session file {}: {}", path.display(), e);
                HashMap::new()
            }),
            Err(_) => HashMap::new(),
        };
        Self {
            path,
            values: Mutex::new(values),
        }
    }

    fn update<F>(&self, change: F) -> Result<(), ClientError>
    where
        F: FnOnce(&mut HashMap<String, String>),
    {
        let mut values = self
            .values
            .lock()
            .map_err(|_| ClientError::Storage("file store poisoned".to_string()))?;
        change(&mut values);
        let contents = serde_json::to_string_pretty(&*values)?;
        fs::write(&self.path, contents)?;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, ClientError> {
        let values = self
            .values
            .lock()
            .map_err(|_| ClientError::Storage("file store poisoned".to_string()))?;
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), ClientError> {
        self.update(|values| {
            values.insert(key.to_string(), value.to_string());
        })
    }

    fn remove(&self, key: &str) -> Result<(), ClientError> {
        self.update(|values| {
            values.remove(key);
        })
    }
}

/// Typed access to the room code and player id slots. Each slot is
/// independently clearable.
#[derive(Debug)]
pub struct SessionStorage<S: KeyValueStore> {
    store: S,
}

impl<S: KeyValueStore> SessionStorage<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn inner(&self) -> &S {
        &self.store
    }

    pub fn room_code(&self) -> Result<Option<String>, ClientError> {
        Ok(self.store.get(ROOM_CODE_KEY)?.filter(|v| !v.trim().is_empty()))
    }

    pub fn player_id(&self) -> Result<Option<String>, ClientError> {
        Ok(self.store.get(PLAYER_ID_KEY)?.filter(|v| !v.trim().is_empty()))
    }

    pub fn set_room_code(&self, code: &str) -> Result<(), ClientError> {
        self.store.set(ROOM_CODE_KEY, code)
    }

    pub fn set_player_id(&self, player_id: &str) -> Result<(), ClientError> {
        self.store.set(PLAYER_ID_KEY, player_id)
    }

    pub fn clear_room_code(&self) -> Result<(), ClientError> {
        self.store.remove(ROOM_CODE_KEY)
    }

    pub fn clear_player_id(&self) -> Result<(), ClientError> {
        self.store.remove(PLAYER_ID_KEY)
    }

    pub fn clear_all(&self) -> Result<(), ClientError> {
        self.clear_room_code()?;
        self.clear_player_id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_ok;

    #[test]
    fn test_slots_are_independent() {
        let storage = SessionStorage::new(MemoryStore::new());
        assert_ok!(storage.set_room_code("ABCD"));
        assert_ok!(storage.set_player_id("p1"));

        assert_ok!(storage.clear_player_id());
        assert_eq!(storage.room_code().unwrap().as_deref(), Some("ABCD"));
        assert_eq!(storage.player_id().unwrap(), None);

        assert_ok!(storage.clear_all());
        assert_eq!(storage.room_code().unwrap(), None);
    }

    #[test]
    fn test_blank_values_read_as_missing() {
        let storage = SessionStorage::new(MemoryStore::with_session("ABCD", " "));
        assert_eq!(storage.player_id().unwrap(), None);
    }

    #[test]
    fn test_file_store_persists_across_opens() {
        let path = std::env::temp_dir().join(format!(
            "tictac-store-{}-{}.json",
            std::process::id(),
            crate::clock::now_ms()
        ));

        {
            let storage = SessionStorage::new(FileStore::open(&path));
            assert_ok!(storage.set_room_code("WXYZ"));
            assert_ok!(storage.set_player_id("p9"));
        }

        let reopened = SessionStorage::new(FileStore::open(&path));
        assert_eq!(reopened.room_code().unwrap().as_deref(), Some("WXYZ"));
        assert_eq!(reopened.player_id().unwrap().as_deref(), Some("p9"));

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_file_store_tolerates_garbage() {
        let path = std::env::temp_dir().join(format!("tictac-garbage-{}.json", std::process::id()));
        fs::write(&path, "not json").unwrap();
        let store = FileStore::open(&path);
        assert_eq!(store.get(ROOM_CODE_KEY).unwrap(), None);
        let _ = fs::remove_file(&path);
    }
}
