use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Number of pitches retained; older entries are pruned on insert
pub const PITCH_CAPACITY: usize = 10;

/// Prefix of every pitch entry key
const NAMESPACE: &str = "pitch_";

/// Key holding the insertion order of pitch references, oldest first
const ORDER_KEY: &str = "pitch-index";

/// Persistence failed; the pitch may not resolve for anyone opening the link
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage encoding error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("storage quota of {quota} bytes exceeded")]
    QuotaExceeded { quota: usize },
}

/// Minimal string key-value storage, local to this device
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError>;

    fn remove(&mut self, key: &str) -> Result<(), StorageError>;

    fn keys(&self) -> Vec<String>;
}

impl<S: KeyValueStore + ?Sized> KeyValueStore for Box<S> {
    fn get(&self, key: &str) -> Option<String> {
        (**self).get(key)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        (**self).set(key, value)
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        (**self).remove(key)
    }

    fn keys(&self) -> Vec<String> {
        (**self).keys()
    }
}

/// Volatile store, optionally bounded by the total size of its values
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    entries: BTreeMap<String, String>,
    quota: Option<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects writes that would push the stored bytes past `quota`
    pub fn with_quota(quota: usize) -> Self {
        Self {
            entries: BTreeMap::new(),
            quota: Some(quota),
        }
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        if let Some(quota) = self.quota {
            let others: usize = self
                .entries
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(k, v)| k.len() + v.len())
                .sum();
            if others + key.len() + value.len() > quota {
                return Err(StorageError::QuotaExceeded { quota });
            }
        }
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        self.entries.remove(key);
        Ok(())
    }

    fn keys(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }
}

/// JSON file backed store, rewritten on every change
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl FileStore {
    /// Opens the store at `path`, starting empty if the file does not exist yet
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        let entries = if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            serde_json::from_str(&raw)?
        } else {
            BTreeMap::new()
        };
        ::log::debug!("Opened pitch store at {} ({} keys)", path.display(), entries.len());
        Ok(Self { path, entries })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(&self.entries)?)?;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        let previous = self.entries.insert(key.to_string(), value.to_string());
        if let Err(e) = self.persist() {
            // Keep memory consistent with disk
            match previous {
                Some(old) => self.entries.insert(key.to_string(), old),
                None => self.entries.remove(key),
            };
            return Err(e);
        }
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        let Some(previous) = self.entries.remove(key) else {
            return Ok(());
        };
        if let Err(e) = self.persist() {
            self.entries.insert(key.to_string(), previous);
            return Err(e);
        }
        Ok(())
    }

    fn keys(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }
}

/// Bounded reference → pitch text mapping with oldest-first eviction.
///
/// Insertion order is tracked explicitly in an index entry rather than
/// inferred from key order, since references are random tokens.
#[derive(Debug)]
pub struct PitchStore<S> {
    backend: S,
    capacity: usize,
}

impl<S: KeyValueStore> PitchStore<S> {
    pub fn new(backend: S) -> Self {
        Self {
            backend,
            capacity: PITCH_CAPACITY,
        }
    }

    /// Stores `text` under `reference` and prunes everything but the newest entries.
    ///
    /// The index is written before the entry, so an entry is never stored
    /// without an index record. On `Err` the pitch is not stored.
    pub fn put(&mut self, reference: &str, text: &str) -> Result<(), StorageError> {
        let previous = self.backend.get(ORDER_KEY);
        let mut order = self.order();
        order.retain(|r| r != reference);
        order.push(reference.to_string());
        let excess = order.len().saturating_sub(self.capacity);
        let evicted: Vec<String> = order.drain(..excess).collect();

        self.backend.set(ORDER_KEY, &serde_json::to_string(&order)?)?;
        if let Err(e) = self.backend.set(&entry_key(reference), text) {
            self.restore_index(previous);
            return Err(e);
        }

        for oldest in evicted {
            ::log::debug!("Evicting pitch {}", oldest);
            if let Err(e) = self.backend.remove(&entry_key(&oldest)) {
                // Left unindexed, so the next put prunes it first
                ::log::warn!("Failed to evict pitch {}: {}", oldest, e);
            }
        }
        Ok(())
    }

    pub fn get(&self, reference: &str) -> Option<String> {
        self.backend.get(&entry_key(reference))
    }

    pub fn contains(&self, reference: &str) -> bool {
        self.get(reference).is_some()
    }

    /// References currently held, oldest first
    pub fn references(&self) -> Vec<String> {
        self.order()
    }

    pub fn into_inner(self) -> S {
        self.backend
    }

    fn restore_index(&mut self, previous: Option<String>) {
        let restored = match previous {
            Some(raw) => self.backend.set(ORDER_KEY, &raw),
            None => self.backend.remove(ORDER_KEY),
        };
        if let Err(e) = restored {
            // Dangling references are dropped when the index is read
            ::log::warn!("Failed to restore pitch index: {}", e);
        }
    }

    /// Reads the order index, dropping dangling references and adopting
    /// entries written without one (they are treated as the oldest).
    fn order(&self) -> Vec<String> {
        let mut order: Vec<String> = match self.backend.get(ORDER_KEY) {
            Some(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                ::log::warn!("Discarding unreadable pitch index: {}", e);
                Vec::new()
            }),
            None => Vec::new(),
        };
        order.retain(|r| self.backend.get(&entry_key(r)).is_some());

        let mut orphans: Vec<String> = self
            .backend
            .keys()
            .into_iter()
            .filter_map(|k| k.strip_prefix(NAMESPACE).map(str::to_string))
            .filter(|r| !order.contains(r))
            .collect();
        if !orphans.is_empty() {
            orphans.sort();
            orphans.extend(order);
            order = orphans;
        }
        order
    }
}

fn entry_key(reference: &str) -> String {
    format!("{NAMESPACE}{reference}")
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Memory store that fails the next write or removal of one key, once
    #[derive(Default)]
    struct FlakyStore {
        inner: MemoryStore,
        fail_set: Option<String>,
        fail_remove: Option<String>,
    }

    impl FlakyStore {
        fn injected() -> StorageError {
            StorageError::Io(std::io::Error::other("disk full"))
        }
    }

    impl KeyValueStore for FlakyStore {
        fn get(&self, key: &str) -> Option<String> {
            self.inner.get(key)
        }

        fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
            if self.fail_set.as_deref() == Some(key) {
                self.fail_set = None;
                return Err(Self::injected());
            }
            self.inner.set(key, value)
        }

        fn remove(&mut self, key: &str) -> Result<(), StorageError> {
            if self.fail_remove.as_deref() == Some(key) {
                self.fail_remove = None;
                return Err(Self::injected());
            }
            self.inner.remove(key)
        }

        fn keys(&self) -> Vec<String> {
            self.inner.keys()
        }
    }

    #[test]
    fn test_retains_ten_most_recent() {
        let mut store = PitchStore::new(MemoryStore::new());
        // Descending keys so key order and insertion order disagree
        let refs: Vec<String> = (0..11).map(|i| format!("z{:02}", 20 - i)).collect();
        for r in &refs {
            store.put(r, &format!("pitch for {r}")).unwrap();
        }

        assert_eq!(store.get(&refs[0]), None);
        for r in &refs[1..] {
            assert_eq!(store.get(r), Some(format!("pitch for {r}")));
        }
        assert_eq!(store.references(), refs[1..].to_vec());
    }

    #[test]
    fn test_get_does_not_evict_or_reorder() {
        let mut store = PitchStore::new(MemoryStore::new());
        store.put("a", "first pitch").unwrap();
        store.put("b", "second pitch").unwrap();
        assert_eq!(store.get("a").as_deref(), Some("first pitch"));
        assert_eq!(store.get("a").as_deref(), Some("first pitch"));
        assert_eq!(store.references(), vec!["a", "b"]);
    }

    #[test]
    fn test_reinsert_moves_to_newest() {
        let mut store = PitchStore::new(MemoryStore::new());
        for r in ["a", "b", "c"] {
            store.put(r, "text").unwrap();
        }
        store.put("a", "updated").unwrap();
        assert_eq!(store.references(), vec!["b", "c", "a"]);
        assert_eq!(store.get("a").as_deref(), Some("updated"));
    }

    #[test]
    fn test_unindexed_entries_are_pruned_first() {
        let mut backend = MemoryStore::new();
        backend.set("pitch_legacy", "old pitch").unwrap();
        backend.set("unrelated", "keep me").unwrap();

        let mut store = PitchStore::new(backend);
        for i in 0..PITCH_CAPACITY {
            store.put(&format!("r{i}"), "text").unwrap();
        }
        assert!(!store.contains("legacy"));
        assert!(store.contains("r0"));

        let backend = store.into_inner();
        assert_eq!(backend.get("unrelated").as_deref(), Some("keep me"));
    }

    #[test]
    fn test_quota_failure_leaves_store_usable() {
        let mut store = PitchStore::new(MemoryStore::with_quota(64));
        let err = store.put("big", &"x".repeat(100)).unwrap_err();
        assert!(matches!(err, StorageError::QuotaExceeded { quota: 64 }));
        assert!(!store.contains("big"));

        store.put("small", "short").unwrap();
        assert_eq!(store.get("small").as_deref(), Some("short"));
    }

    #[test]
    fn test_file_store_persists_across_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("pitches.json");

        let mut store = PitchStore::new(FileStore::open(&path).unwrap());
        store.put("abc", "Hello from disk").unwrap();
        drop(store);

        let reopened = PitchStore::new(FileStore::open(&path).unwrap());
        assert_eq!(reopened.get("abc").as_deref(), Some("Hello from disk"));
        assert_eq!(reopened.references(), vec!["abc"]);
    }

    #[test]
    fn test_file_store_rejects_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pitches.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(
            FileStore::open(&path),
            Err(StorageError::Serialize(_))
        ));
    }

    #[test]
    fn test_failed_index_write_stores_nothing() {
        let mut store = PitchStore::new(FlakyStore::default());
        let older: Vec<String> = (1..=9).map(|i| format!("a{i}")).collect();
        for r in &older {
            store.put(r, "text").unwrap();
        }

        store.backend.fail_set = Some(ORDER_KEY.to_string());
        assert!(store.put("b", "text").is_err());
        assert_eq!(store.get("b"), None);

        store.put("c", "text").unwrap();
        for r in &older {
            assert!(store.contains(r), "{r} should still resolve");
        }
        let mut expected = older.clone();
        expected.push("c".to_string());
        assert_eq!(store.references(), expected);
    }

    #[test]
    fn test_failed_entry_write_restores_index() {
        let mut store = PitchStore::new(FlakyStore::default());
        store.put("a", "text").unwrap();
        store.put("b", "text").unwrap();

        store.backend.fail_set = Some(entry_key("c"));
        assert!(store.put("c", "text").is_err());
        assert!(!store.contains("c"));
        assert_eq!(store.backend.get(ORDER_KEY).as_deref(), Some(r#"["a","b"]"#));

        store.put("d", "text").unwrap();
        assert_eq!(store.references(), vec!["a", "b", "d"]);
    }

    #[test]
    fn test_failed_eviction_still_stores_pitch() {
        let mut store = PitchStore::new(FlakyStore::default());
        for i in 0..PITCH_CAPACITY {
            store.put(&format!("r{i:02}"), "text").unwrap();
        }

        store.backend.fail_remove = Some(entry_key("r00"));
        store.put("new", "fresh pitch").unwrap();
        assert_eq!(store.get("new").as_deref(), Some("fresh pitch"));
        // The stale entry is pruned first on the next insert
        assert_eq!(store.references().first().map(String::as_str), Some("r00"));

        store.put("newer", "text").unwrap();
        assert!(!store.contains("r00"));
        assert!(!store.contains("r01"));
        assert!(store.contains("r02"));
        assert!(store.contains("new"));
        assert_eq!(store.references().len(), PITCH_CAPACITY);
    }

    #[test]
    fn test_file_store_failed_remove_keeps_entry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pitches.json");
        let mut store = FileStore::open(&path).unwrap();
        store.set("pitch_abc", "Hello").unwrap();

        // A directory in place of the file makes every write fail
        std::fs::remove_file(&path).unwrap();
        std::fs::create_dir(&path).unwrap();

        assert!(store.remove("pitch_abc").is_err());
        assert_eq!(store.get("pitch_abc").as_deref(), Some("Hello"));
        assert_eq!(store.keys(), vec!["pitch_abc"]);
    }
}
