use crate::config;
use crate::model::Track;
use anyhow::{Context, Result};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::rc::Rc;

pub const FAVORITES_KEY: &str = "favorites";
pub const HISTORY_KEY: &str = "history";
pub const HISTORY_LIMIT: usize = 50;

/// Local key-value storage for persisted JSON documents.
pub trait Storage {
    fn read(&self, key: &str) -> Result<Option<String>>;
    fn write(&mut self, key: &str, value: &str) -> Result<()>;
    fn remove(&mut self, key: &str) -> Result<()>;
}

/// One `<key>.json` file per key under a root directory.
#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.json"))
    }
}

impl Storage for FileStorage {
    fn read(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);
        match fs::read_to_string(&path) {
            Ok(raw) => Ok(Some(raw)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err).with_context(|| format!("failed to read {}", path.display())),
        }
    }

    fn write(&mut self, key: &str, value: &str) -> Result<()> {
        config::ensure_dir(&self.root)?;
        let path = self.path_for(key);
        fs::write(&path, value).with_context(|| format!("failed to write {}", path.display()))
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        let path = self.path_for(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err).with_context(|| format!("failed to remove {}", path.display())),
        }
    }
}

/// In-memory storage. Clones share the same entries, so a test can keep a
/// handle and inspect what a store persisted.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    entries: Rc<RefCell<HashMap<String, String>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.entries.borrow().get(key).cloned()
    }
}

impl Storage for MemoryStorage {
    fn read(&self, key: &str) -> Result<Option<String>> {
        Ok(self.get(key))
    }

    fn write(&mut self, key: &str, value: &str) -> Result<()> {
        self.entries
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        self.entries.borrow_mut().remove(key);
        Ok(())
    }
}

fn load_tracks(storage: &dyn Storage, key: &str) -> Vec<Track> {
    let raw = match storage.read(key) {
        Ok(Some(raw)) => raw,
        Ok(None) => return Vec::new(),
        Err(err) => {
            tracing::warn!(key, error = %format!("{err:#}"), "failed to read persisted tracks");
            return Vec::new();
        }
    };

    match serde_json::from_str::<Vec<Track>>(&raw) {
        Ok(tracks) => tracks,
        Err(err) => {
            tracing::warn!(key, error = %err, "persisted tracks are malformed, starting empty");
            Vec::new()
        }
    }
}

fn persist_tracks(storage: &mut dyn Storage, key: &str, tracks: &[Track]) {
    let result = serde_json::to_string(tracks)
        .map_err(anyhow::Error::from)
        .and_then(|json| storage.write(key, &json));
    if let Err(err) = result {
        tracing::warn!(key, error = %format!("{err:#}"), "failed to persist tracks");
    }
}

fn dedup_by_id(tracks: &mut Vec<Track>) {
    let mut seen = std::collections::HashSet::with_capacity(tracks.len());
    tracks.retain(|track| seen.insert(track.id));
}

pub struct FavoritesStore {
    tracks: Vec<Track>,
    storage: Box<dyn Storage>,
}

impl FavoritesStore {
    /// Never fails: absent or malformed storage yields an empty set.
    pub fn load(storage: Box<dyn Storage>) -> Self {
        let mut tracks = load_tracks(storage.as_ref(), FAVORITES_KEY);
        dedup_by_id(&mut tracks);
        tracing::debug!(count = tracks.len(), "loaded favorites");
        Self { tracks, storage }
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn is_favorite(&self, id: u64) -> bool {
        self.tracks.iter().any(|track| track.id == id)
    }

    /// Returns the new membership of `track`.
    pub fn toggle(&mut self, track: &Track) -> bool {
        let now_favorite = if let Some(pos) = self.tracks.iter().position(|t| t.id == track.id) {
            self.tracks.remove(pos);
            false
        } else {
            self.tracks.push(track.clone());
            true
        };
        persist_tracks(self.storage.as_mut(), FAVORITES_KEY, &self.tracks);
        tracing::debug!(id = track.id, now_favorite, "toggled favorite");
        now_favorite
    }
}

pub struct HistoryStore {
    tracks: Vec<Track>,
    storage: Box<dyn Storage>,
}

impl HistoryStore {
    pub fn load(storage: Box<dyn Storage>) -> Self {
        let mut tracks = load_tracks(storage.as_ref(), HISTORY_KEY);
        dedup_by_id(&mut tracks);
        tracks.truncate(HISTORY_LIMIT);
        tracing::debug!(count = tracks.len(), "loaded history");
        Self { tracks, storage }
    }

    /// Most recent first.
    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn record(&mut self, track: &Track) {
        self.tracks.retain(|t| t.id != track.id);
        self.tracks.insert(0, track.clone());
        self.tracks.truncate(HISTORY_LIMIT);
        persist_tracks(self.storage.as_mut(), HISTORY_KEY, &self.tracks);
    }

    pub fn clear(&mut self) {
        self.tracks.clear();
        if let Err(err) = self.storage.remove(HISTORY_KEY) {
            tracing::warn!(error = %format!("{err:#}"), "failed to remove persisted history");
        }
    }
}
