//! Two-tier configuration sources.
//!
//! Every configuration unit (layout, locale map, variation table, nav-mode
//! table, correction list, word list) is addressed by a logical path such as
//! `layouts/azerty.json`. A `ConfigSource` answers reads for those paths;
//! `LayeredSource` stacks a user-writable custom tier over the read-only
//! bundled tier. Units decide how to layer: whole-file fallback for word
//! lists, per-key replacement for maps. Nested values are never merged.

use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

pub const SETTINGS_FILE: &str = "settings.toml";
pub const LAYOUTS_DIR: &str = "layouts";
pub const LOCALE_MAP_FILE: &str = "layouts/locales.json";
pub const VARIATIONS_FILE: &str = "variations.json";
pub const CTRL_MAPPINGS_FILE: &str = "ctrl_mappings.json";
pub const CORRECTIONS_DIR: &str = "corrections";
pub const DICTIONARIES_DIR: &str = "dictionaries";

/// Read access to one tier of configuration files.
pub trait ConfigSource: Send + Sync {
    /// Short label used in log messages.
    fn label(&self) -> &str;

    /// Raw bytes for `path`, or `None` when the file does not exist.
    fn read_bytes(&self, path: &str) -> Result<Option<Vec<u8>>>;

    /// File names (not paths) directly inside `dir`, sorted.
    fn list(&self, dir: &str) -> Vec<String>;

    /// UTF-8 contents for `path`.
    fn read_string(&self, path: &str) -> Result<Option<String>> {
        match self.read_bytes(path)? {
            Some(bytes) => String::from_utf8(bytes)
                .map(Some)
                .map_err(|e| Error::parse(path, e)),
            None => Ok(None),
        }
    }

    fn exists(&self, path: &str) -> bool {
        matches!(self.read_bytes(path), Ok(Some(_)))
    }
}

/// A tier that the configuration UI can write to.
pub trait WritableSource: ConfigSource {
    fn write(&self, path: &str, contents: &[u8]) -> Result<()>;

    /// Remove `path`. Returns whether a file was removed.
    fn remove(&self, path: &str) -> Result<bool>;
}

/// In-memory tier. Used for bundled assets compiled into the binary and as
/// a scratch custom tier in tests.
#[derive(Debug, Default)]
pub struct MemorySource {
    label: String,
    files: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemorySource {
    pub fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            files: RwLock::new(BTreeMap::new()),
        }
    }

    /// Builder-style insert, convenient for static asset tables.
    pub fn with_file(self, path: &str, contents: impl AsRef<[u8]>) -> Self {
        self.insert(path, contents);
        self
    }

    pub fn insert(&self, path: &str, contents: impl AsRef<[u8]>) {
        if let Ok(mut files) = self.files.write() {
            files.insert(path.to_string(), contents.as_ref().to_vec());
        }
    }
}

impl ConfigSource for MemorySource {
    fn label(&self) -> &str {
        &self.label
    }

    fn read_bytes(&self, path: &str) -> Result<Option<Vec<u8>>> {
        Ok(self
            .files
            .read()
            .ok()
            .and_then(|files| files.get(path).cloned()))
    }

    fn list(&self, dir: &str) -> Vec<String> {
        let prefix = format!("{}/", dir.trim_end_matches('/'));
        let Ok(files) = self.files.read() else {
            return Vec::new();
        };
        files
            .keys()
            .filter_map(|k| k.strip_prefix(&prefix))
            .filter(|rest| !rest.contains('/'))
            .map(str::to_string)
            .collect()
    }
}

impl WritableSource for MemorySource {
    fn write(&self, path: &str, contents: &[u8]) -> Result<()> {
        self.insert(path, contents);
        Ok(())
    }

    fn remove(&self, path: &str) -> Result<bool> {
        Ok(self
            .files
            .write()
            .map(|mut files| files.remove(path).is_some())
            .unwrap_or(false))
    }
}

/// On-disk tier rooted at a user configuration directory.
#[derive(Debug, Clone)]
pub struct DirSource {
    root: PathBuf,
    label: String,
}

impl DirSource {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        let root = root.as_ref().to_path_buf();
        Self {
            label: root.display().to_string(),
            root,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> PathBuf {
        path.split('/')
            .filter(|part| !part.is_empty() && *part != "..")
            .fold(self.root.clone(), |acc, part| acc.join(part))
    }
}

impl ConfigSource for DirSource {
    fn label(&self) -> &str {
        &self.label
    }

    fn read_bytes(&self, path: &str) -> Result<Option<Vec<u8>>> {
        match std::fs::read(self.resolve(path)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::Io(e)),
        }
    }

    fn list(&self, dir: &str) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(self.resolve(dir)) else {
            return Vec::new();
        };
        let mut names: Vec<String> = entries
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
            .filter_map(|e| e.file_name().into_string().ok())
            .collect();
        names.sort();
        names
    }
}

impl WritableSource for DirSource {
    fn write(&self, path: &str, contents: &[u8]) -> Result<()> {
        let target = self.resolve(path);
        let parent = target.parent().unwrap_or(&self.root);
        std::fs::create_dir_all(parent)?;
        // Atomic replace: readers see the old file or the new one.
        let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
        tmp.write_all(contents)?;
        tmp.persist(&target).map_err(|e| e.error)?;
        Ok(())
    }

    fn remove(&self, path: &str) -> Result<bool> {
        match std::fs::remove_file(self.resolve(path)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Error::Io(e)),
        }
    }
}

/// Custom tier over bundled tier.
#[derive(Clone)]
pub struct LayeredSource {
    custom: Arc<dyn WritableSource>,
    bundled: Arc<dyn ConfigSource>,
}

impl LayeredSource {
    pub fn new(custom: Arc<dyn WritableSource>, bundled: Arc<dyn ConfigSource>) -> Self {
        Self { custom, bundled }
    }

    pub fn custom(&self) -> &dyn WritableSource {
        self.custom.as_ref()
    }

    pub fn bundled(&self) -> &dyn ConfigSource {
        self.bundled.as_ref()
    }

    /// Whole-file lookup: custom first, bundled otherwise.
    pub fn read_string(&self, path: &str) -> Result<Option<String>> {
        match self.custom.read_string(path)? {
            Some(s) => Ok(Some(s)),
            None => self.bundled.read_string(path),
        }
    }

    pub fn read_bytes(&self, path: &str) -> Result<Option<Vec<u8>>> {
        match self.custom.read_bytes(path)? {
            Some(b) => Ok(Some(b)),
            None => self.bundled.read_bytes(path),
        }
    }

    /// Union of both tiers' listings, sorted and deduplicated.
    pub fn list(&self, dir: &str) -> Vec<String> {
        let mut names = self.bundled.list(dir);
        names.extend(self.custom.list(dir));
        names.sort();
        names.dedup();
        names
    }
}

/// Monotonic configuration version shared between writers and the pipeline.
///
/// Writers bump it after a change lands; the pipeline compares it with the
/// version of its current snapshot at key-event boundaries.
#[derive(Debug)]
pub struct ConfigVersion(AtomicU64);

impl Default for ConfigVersion {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigVersion {
    pub fn new() -> Self {
        Self(AtomicU64::new(1))
    }

    pub fn current(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }

    /// Record a change and return the new version.
    pub fn bump(&self) -> u64 {
        self.0.fetch_add(1, Ordering::AcqRel) + 1
    }
}
