//! Personal dictionary.
//!
//! Words the user added (or typed often enough to learn). Entries take part
//! in suggestion ranking as `source = user`. Two backends:
//! - `InMemory`: thread-safe map, used in tests and when no storage path is set.
//! - `Redb`: persistent, one write transaction per mutation.
//!
//! Keys are stored exactly as entered so the user's casing is preserved.
use redb::ReadableTable;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tracing::warn;

/// A thread-safe in-memory personal dictionary.
#[derive(Clone, Debug, Default)]
pub struct InMemoryUserDict {
    inner: Arc<RwLock<HashMap<String, u64>>>,
    generation: Arc<AtomicU64>,
}

impl InMemoryUserDict {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a word or bump its count by one.
    pub fn add(&self, word: &str) {
        self.add_with_frequency(word, 1);
    }

    pub fn add_with_frequency(&self, word: &str, delta: u64) {
        if delta == 0 || word.is_empty() {
            return;
        }
        if let Ok(mut map) = self.inner.write() {
            let entry = map.entry(word.to_string()).or_insert(0);
            *entry = entry.saturating_add(delta);
            self.generation.fetch_add(1, Ordering::Release);
        }
    }

    pub fn remove(&self, word: &str) -> bool {
        let removed = self
            .inner
            .write()
            .map(|mut map| map.remove(word).is_some())
            .unwrap_or(false);
        if removed {
            self.generation.fetch_add(1, Ordering::Release);
        }
        removed
    }

    /// Bumped on every change; shared by all clones.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn frequency(&self, word: &str) -> u64 {
        if let Ok(map) = self.inner.read() {
            map.get(word).copied().unwrap_or(0)
        } else {
            0
        }
    }

    pub fn snapshot(&self) -> HashMap<String, u64> {
        if let Ok(map) = self.inner.read() {
            map.clone()
        } else {
            HashMap::new()
        }
    }

    /// Replace the entire contents, e.g. when restoring an export.
    pub fn replace_with(&self, data: HashMap<String, u64>) {
        if let Ok(mut map) = self.inner.write() {
            *map = data;
            self.generation.fetch_add(1, Ordering::Release);
        }
    }
}

#[derive(Clone, Debug)]
pub enum UserDict {
    InMemory(InMemoryUserDict),
    Redb(Arc<RedbUserDict>),
}

impl Default for UserDict {
    fn default() -> Self {
        Self::new_in_memory()
    }
}

impl UserDict {
    pub fn new_in_memory() -> Self {
        UserDict::InMemory(InMemoryUserDict::new())
    }

    /// Open (or create) a redb-backed dictionary at `path`.
    pub fn new_redb<P: AsRef<std::path::Path>>(path: P) -> Result<Self, redb::Error> {
        Ok(UserDict::Redb(Arc::new(RedbUserDict::new(path)?)))
    }

    pub fn add(&self, word: &str) {
        self.add_with_frequency(word, 1);
    }

    pub fn add_with_frequency(&self, word: &str, delta: u64) {
        match self {
            UserDict::InMemory(m) => m.add_with_frequency(word, delta),
            UserDict::Redb(r) => {
                if let Err(e) = r.add_with_frequency(word, delta) {
                    warn!(word, error = %e, "personal dictionary write failed");
                }
            }
        }
    }

    /// Remove a word. Returns whether it was present.
    pub fn remove(&self, word: &str) -> bool {
        match self {
            UserDict::InMemory(m) => m.remove(word),
            UserDict::Redb(r) => r.remove(word).unwrap_or_else(|e| {
                warn!(word, error = %e, "personal dictionary delete failed");
                false
            }),
        }
    }

    pub fn frequency(&self, word: &str) -> u64 {
        match self {
            UserDict::InMemory(m) => m.frequency(word),
            UserDict::Redb(r) => r.frequency(word).unwrap_or(0),
        }
    }

    /// Changes whenever any handle to this dictionary adds or removes a
    /// word. Caches built from the contents compare it before reuse.
    pub fn generation(&self) -> u64 {
        match self {
            UserDict::InMemory(m) => m.generation(),
            UserDict::Redb(r) => r.generation(),
        }
    }

    pub fn contains(&self, word: &str) -> bool {
        self.frequency(word) > 0
    }

    pub fn snapshot(&self) -> HashMap<String, u64> {
        match self {
            UserDict::InMemory(m) => m.snapshot(),
            UserDict::Redb(r) => r.snapshot().unwrap_or_default(),
        }
    }

    /// Entries sorted by word, for listing and export.
    pub fn iter_all(&self) -> Vec<(String, u64)> {
        let mut all: Vec<(String, u64)> = self.snapshot().into_iter().collect();
        all.sort();
        all
    }
}

/// Redb-backed personal dictionary.
pub struct RedbUserDict {
    db: redb::Database,
    path: std::path::PathBuf,
    generation: AtomicU64,
}

impl std::fmt::Debug for RedbUserDict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbUserDict")
            .field("path", &self.path)
            .finish()
    }
}

impl RedbUserDict {
    /// Word → count.
    const TABLE_DEF: redb::TableDefinition<'static, &'static str, u64> =
        redb::TableDefinition::new("personal_dict");

    pub fn new<P: AsRef<std::path::Path>>(path: P) -> Result<Self, redb::Error> {
        if let Some(parent) = path.as_ref().parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let db = redb::Database::create(path.as_ref())?;
        // Create the table up front so read transactions never miss it.
        let write_txn = db.begin_write()?;
        {
            write_txn.open_table(Self::TABLE_DEF)?;
        }
        write_txn.commit()?;
        Ok(RedbUserDict {
            db,
            path: path.as_ref().to_path_buf(),
            generation: AtomicU64::new(0),
        })
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    pub fn add_with_frequency(&self, word: &str, delta: u64) -> Result<(), redb::Error> {
        if delta == 0 || word.is_empty() {
            return Ok(());
        }
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(Self::TABLE_DEF)?;
            let current = table.get(word)?.map(|v| v.value()).unwrap_or(0);
            table.insert(word, current.saturating_add(delta))?;
        }
        write_txn.commit()?;
        self.generation.fetch_add(1, Ordering::Release);
        Ok(())
    }

    pub fn remove(&self, word: &str) -> Result<bool, redb::Error> {
        let write_txn = self.db.begin_write()?;
        let removed = {
            let mut table = write_txn.open_table(Self::TABLE_DEF)?;
            let removed = table.remove(word)?.is_some();
            removed
        };
        write_txn.commit()?;
        if removed {
            self.generation.fetch_add(1, Ordering::Release);
        }
        Ok(removed)
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn frequency(&self, word: &str) -> Result<u64, redb::Error> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(Self::TABLE_DEF)?;
        let count = table.get(word)?.map(|v| v.value()).unwrap_or(0);
        Ok(count)
    }

    pub fn snapshot(&self) -> Result<HashMap<String, u64>, redb::Error> {
        let mut out = HashMap::new();
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(Self::TABLE_DEF)?;
        for item in table.iter()? {
            let (k, v) = item?;
            out.insert(k.value().to_string(), v.value());
        }
        Ok(out)
    }
}
