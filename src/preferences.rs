use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::SpeechError;

/// Maximum number of remembered searches.
pub const HISTORY_LIMIT: usize = 10;

const FAVORITES_KEY: &str = "favorites";
const HISTORY_KEY: &str = "searchHistory";
const LANGUAGE_KEY: &str = "language";

/// Flat string key-value storage, the shape of browser local storage.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, SpeechError>;
    fn set(&self, key: &str, value: &str) -> Result<(), SpeechError>;
    fn remove(&self, key: &str) -> Result<(), SpeechError>;
}

/// Non-persistent store.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, SpeechError> {
        Ok(self.entries.lock().unwrap_or_else(|e| e.into_inner()).get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), SpeechError> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), SpeechError> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).remove(key);
        Ok(())
    }
}

/// Store persisted as a single JSON object file, rewritten on every change.
pub struct JsonFileStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl JsonFileStore {
    /// Open `path`, starting empty if the file does not exist yet.
    pub fn open(path: &Path) -> Result<Self, SpeechError> {
        let entries = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            serde_json::from_str(&content)?
        } else {
            log::debug!("{} not found, starting with empty preferences", path.display());
            BTreeMap::new()
        };
        Ok(Self {
            path: path.to_path_buf(),
            entries: Mutex::new(entries),
        })
    }

    fn flush(&self, entries: &BTreeMap<String, String>) -> Result<(), SpeechError> {
        let json = serde_json::to_string_pretty(entries)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<String>, SpeechError> {
        Ok(self.entries.lock().unwrap_or_else(|e| e.into_inner()).get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), SpeechError> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(key.to_string(), value.to_string());
        self.flush(&entries)
    }

    fn remove(&self, key: &str) -> Result<(), SpeechError> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if entries.remove(key).is_some() {
            self.flush(&entries)?;
        }
        Ok(())
    }
}

/// Favorites, search history and UI language over a [`KeyValueStore`].
///
/// Lists are stored as JSON arrays of strings. A value that fails to parse
/// is treated as empty and overwritten on the next change.
pub struct Preferences<S: KeyValueStore> {
    store: S,
}

impl<S: KeyValueStore> Preferences<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    fn list(&self, key: &str) -> Result<Vec<String>, SpeechError> {
        let Some(raw) = self.store.get(key)? else {
            return Ok(Vec::new());
        };
        match serde_json::from_str(&raw) {
            Ok(list) => Ok(list),
            Err(e) => {
                log::warn!("Ignoring malformed '{key}' entry: {e}");
                Ok(Vec::new())
            }
        }
    }

    fn save_list(&self, key: &str, list: &[String]) -> Result<(), SpeechError> {
        self.store.set(key, &serde_json::to_string(list)?)
    }

    pub fn favorites(&self) -> Result<Vec<String>, SpeechError> {
        self.list(FAVORITES_KEY)
    }

    pub fn is_favorite(&self, id: &str) -> Result<bool, SpeechError> {
        Ok(self.favorites()?.iter().any(|f| f == id))
    }

    /// Append `id` unless already present.
    pub fn add_favorite(&self, id: &str) -> Result<(), SpeechError> {
        let mut favorites = self.favorites()?;
        if !favorites.iter().any(|f| f == id) {
            favorites.push(id.to_string());
            self.save_list(FAVORITES_KEY, &favorites)?;
        }
        Ok(())
    }

    pub fn remove_favorite(&self, id: &str) -> Result<(), SpeechError> {
        let mut favorites = self.favorites()?;
        let before = favorites.len();
        favorites.retain(|f| f != id);
        if favorites.len() != before {
            self.save_list(FAVORITES_KEY, &favorites)?;
        }
        Ok(())
    }

    /// Flip `id`'s favorite state and return the new state.
    pub fn toggle_favorite(&self, id: &str) -> Result<bool, SpeechError> {
        if self.is_favorite(id)? {
            self.remove_favorite(id)?;
            Ok(false)
        } else {
            self.add_favorite(id)?;
            Ok(true)
        }
    }

    /// Most recent first.
    pub fn search_history(&self) -> Result<Vec<String>, SpeechError> {
        self.list(HISTORY_KEY)
    }

    /// Record a search: moved to the front if already present, trimmed to
    /// [`HISTORY_LIMIT`]. Blank queries are ignored.
    pub fn record_search(&self, query: &str) -> Result<(), SpeechError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(());
        }
        let mut history = self.search_history()?;
        history.retain(|q| q != query);
        history.insert(0, query.to_string());
        history.truncate(HISTORY_LIMIT);
        self.save_list(HISTORY_KEY, &history)
    }

    pub fn clear_search_history(&self) -> Result<(), SpeechError> {
        self.store.remove(HISTORY_KEY)
    }

    pub fn language(&self) -> Result<Option<String>, SpeechError> {
        self.store.get(LANGUAGE_KEY)
    }

    pub fn set_language(&self, key: &str) -> Result<(), SpeechError> {
        self.store.set(LANGUAGE_KEY, key)
    }
}
