//! Key-value persistence for user preferences and the saved document list.
//!
//! [`FileStore`] keeps one small TOML file per key under the cache directory.
//! Keys that are not safe file names are hashed. Write failures are logged and
//! otherwise ignored so a read-only disk never interrupts reading.

use crate::document::{Document, DocumentKind};
use crate::voice::SavedVoice;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Key under which voice preferences are stored.
pub const PREFERENCES_KEY: &str = "screen-reader-settings";

/// Key under which the saved document list is stored.
pub const DOCUMENTS_KEY: &str = "loaded-documents-storage";

const PREVIEW_CHARS: usize = 160;

pub trait PreferenceStore {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: &str);
    fn remove(&mut self, key: &str);
    fn clear(&mut self);
}

#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    entries: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PreferenceStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) {
        self.entries.insert(key.to_string(), value.to_string());
    }

    fn remove(&mut self, key: &str) {
        self.entries.remove(key);
    }

    fn clear(&mut self) {
        self.entries.clear();
    }
}

#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        let safe = !key.is_empty()
            && key
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_');
        let stem = if safe {
            key.to_string()
        } else {
            let mut hasher = Sha256::new();
            hasher.update(key.as_bytes());
            format!("{:x}", hasher.finalize())
        };
        self.dir.join(format!("{stem}.toml"))
    }
}

#[derive(Serialize, Deserialize)]
struct StoredEntry {
    value: String,
}

impl PreferenceStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        let data = fs::read_to_string(self.entry_path(key)).ok()?;
        let entry: StoredEntry = toml::from_str(&data).ok()?;
        Some(entry.value)
    }

    fn set(&mut self, key: &str, value: &str) {
        if let Err(err) = fs::create_dir_all(&self.dir) {
            warn!(dir = %self.dir.display(), "Failed to create preference dir: {err}");
            return;
        }
        let entry = StoredEntry {
            value: value.to_string(),
        };
        let path = self.entry_path(key);
        match toml::to_string(&entry) {
            Ok(contents) => {
                if let Err(err) = fs::write(&path, contents) {
                    warn!(path = %path.display(), "Failed to save preference: {err}");
                }
            }
            Err(err) => warn!(key, "Failed to encode preference: {err}"),
        }
    }

    fn remove(&mut self, key: &str) {
        let _ = fs::remove_file(self.entry_path(key));
    }

    fn clear(&mut self) {
        let Ok(entries) = fs::read_dir(&self.dir) else {
            return;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) == Some("toml") {
                let _ = fs::remove_file(path);
            }
        }
    }
}

/// Persisted voice settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoicePreferences {
    #[serde(default)]
    pub voice: Option<SavedVoice>,
    pub rate: f32,
    pub pitch: f32,
    pub volume: f32,
}

impl VoicePreferences {
    pub fn load(store: &dyn PreferenceStore) -> Option<Self> {
        let raw = store.get(PREFERENCES_KEY)?;
        match toml::from_str(&raw) {
            Ok(prefs) => Some(prefs),
            Err(err) => {
                warn!("Ignoring unreadable voice preferences: {err}");
                None
            }
        }
    }

    pub fn save(&self, store: &mut dyn PreferenceStore) {
        match toml::to_string(self) {
            Ok(raw) => {
                debug!(rate = self.rate, pitch = self.pitch, volume = self.volume, "Saving voice preferences");
                store.set(PREFERENCES_KEY, &raw);
            }
            Err(err) => warn!("Failed to encode voice preferences: {err}"),
        }
    }
}

/// Summary of a loaded document, kept so it can be reopened without
/// extracting it again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedDocument {
    pub id: String,
    pub name: String,
    pub kind: DocumentKind,
    pub preview: String,
    pub extracted_text: String,
    pub page_count: usize,
}

impl From<&Document> for SavedDocument {
    fn from(document: &Document) -> Self {
        let mut preview: String = document.text().chars().take(PREVIEW_CHARS).collect();
        if document.text().chars().nth(PREVIEW_CHARS).is_some() {
            preview.push('…');
        }
        Self {
            id: document.id().to_string(),
            name: document.title().to_string(),
            kind: document.kind(),
            preview,
            extracted_text: document.text().to_string(),
            page_count: document.page_count(),
        }
    }
}

/// The persisted list of documents, unique by id in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SavedDocuments {
    #[serde(default)]
    documents: Vec<SavedDocument>,
}

impl SavedDocuments {
    pub fn load(store: &dyn PreferenceStore) -> Self {
        let Some(raw) = store.get(DOCUMENTS_KEY) else {
            return Self::default();
        };
        match toml::from_str(&raw) {
            Ok(saved) => saved,
            Err(err) => {
                warn!("Ignoring unreadable document list: {err}");
                Self::default()
            }
        }
    }

    pub fn save(&self, store: &mut dyn PreferenceStore) {
        match toml::to_string(self) {
            Ok(raw) => {
                debug!(count = self.documents.len(), "Saving document list");
                store.set(DOCUMENTS_KEY, &raw);
            }
            Err(err) => warn!("Failed to encode document list: {err}"),
        }
    }

    pub fn documents(&self) -> &[SavedDocument] {
        &self.documents
    }

    /// Append `document` unless one with the same id is already saved.
    pub fn add(&mut self, document: SavedDocument) -> bool {
        if self.documents.iter().any(|saved| saved.id == document.id) {
            return false;
        }
        self.documents.push(document);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn scratch_dir(name: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_nanos())
            .unwrap_or_default();
        std::env::temp_dir().join(format!("lectora-{name}-{}-{nanos}", std::process::id()))
    }

    fn sample() -> VoicePreferences {
        VoicePreferences {
            voice: Some(SavedVoice {
                name: "Monica".to_string(),
                lang: "es-ES".to_string(),
            }),
            rate: 1.25,
            pitch: 0.9,
            volume: 0.5,
        }
    }

    #[test]
    fn memory_store_round_trips_preferences() {
        let mut store = MemoryStore::new();
        assert_eq!(VoicePreferences::load(&store), None);
        sample().save(&mut store);
        assert_eq!(VoicePreferences::load(&store), Some(sample()));
        store.clear();
        assert_eq!(store.get(PREFERENCES_KEY), None);
    }

    #[test]
    fn corrupt_preferences_are_ignored() {
        let mut store = MemoryStore::new();
        store.set(PREFERENCES_KEY, "rate = \"fast\"");
        assert_eq!(VoicePreferences::load(&store), None);
    }

    #[test]
    fn document_list_round_trips_without_duplicates() {
        let mut store = MemoryStore::new();
        assert!(SavedDocuments::load(&store).documents().is_empty());

        let long = Document::manual("largo", "palabra ".repeat(40));
        let short = Document::manual("corto", "Hola \"mundo\"\nadiós");
        let mut saved = SavedDocuments::default();
        assert!(saved.add(SavedDocument::from(&long)));
        assert!(saved.add(SavedDocument::from(&short)));
        assert!(!saved.add(SavedDocument::from(&short)));
        saved.save(&mut store);

        let restored = SavedDocuments::load(&store);
        assert_eq!(restored, saved);
        let names: Vec<&str> = restored.documents().iter().map(|doc| doc.name.as_str()).collect();
        assert_eq!(names, vec!["largo", "corto"]);

        let first = &restored.documents()[0];
        assert_eq!(first.kind, DocumentKind::Manual);
        assert_eq!(first.page_count, 1);
        assert_eq!(first.preview.chars().count(), PREVIEW_CHARS + 1);
        assert!(first.preview.ends_with('…'));
        assert_eq!(restored.documents()[1].preview, short.text());
        assert_eq!(restored.documents()[1].extracted_text, short.text());
    }

    #[test]
    fn corrupt_document_list_loads_empty() {
        let mut store = MemoryStore::new();
        store.set(DOCUMENTS_KEY, "documents = 3");
        assert_eq!(SavedDocuments::load(&store), SavedDocuments::default());
    }

    #[test]
    fn file_store_persists_across_instances() {
        let dir = scratch_dir("prefs");
        let mut store = FileStore::new(&dir);
        store.set("screen-reader-settings", "hola");
        store.set("weird/key name", "mundo");

        let reopened = FileStore::new(&dir);
        assert_eq!(reopened.get("screen-reader-settings").as_deref(), Some("hola"));
        assert_eq!(reopened.get("weird/key name").as_deref(), Some("mundo"));
        assert!(dir.join("screen-reader-settings.toml").exists());

        store.remove("screen-reader-settings");
        assert_eq!(store.get("screen-reader-settings"), None);
        store.clear();
        assert_eq!(store.get("weird/key name"), None);
        let _ = fs::remove_dir_all(dir);
    }
}
