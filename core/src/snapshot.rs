//! Immutable configuration snapshots and their reload path.
//!
//! A `ConfigSnapshot` holds every table the pipeline reads: layouts,
//! variations, the nav-mode table and the per-language correction sets. It
//! is built off the event path by `ConfigLoader` and published through
//! `SnapshotHandle`, which swaps a whole `Arc` under a lock. Key events clone
//! the `Arc` once and use that snapshot for the entire event.

use crate::config_source::{ConfigVersion, LayeredSource};
use crate::corrections::{self, LanguageCorrectionSet};
use crate::layout::LayoutStore;
use crate::nav::{NavModeRemapper, NavTable};
use crate::variation::VariationTable;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::thread::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default)]
pub struct ConfigSnapshot {
    /// Config version this snapshot was built for. `0` is the empty
    /// snapshot used before the first load completes.
    pub version: u64,
    pub layouts: LayoutStore,
    pub variations: VariationTable,
    pub nav: NavModeRemapper,
    pub languages: BTreeMap<String, Arc<LanguageCorrectionSet>>,
}

impl ConfigSnapshot {
    /// Identity layout, no variations, no remaps, no corrections.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn available_languages(&self) -> Vec<String> {
        self.languages.keys().cloned().collect()
    }

    pub fn language(&self, code: &str) -> Option<&Arc<LanguageCorrectionSet>> {
        self.languages.get(code)
    }
}

/// Builds snapshots from a layered source.
#[derive(Clone)]
pub struct ConfigLoader {
    source: LayeredSource,
}

impl ConfigLoader {
    pub fn new(source: LayeredSource) -> Self {
        Self { source }
    }

    pub fn source(&self) -> &LayeredSource {
        &self.source
    }

    /// Load every unit. Failures are isolated per unit inside the loaders.
    pub fn load(&self, version: u64) -> ConfigSnapshot {
        let layouts = LayoutStore::load(&self.source);
        let variations = VariationTable::load(&self.source);
        let nav = NavModeRemapper::new(NavTable::load(&self.source));
        let languages = corrections::available_languages(&self.source)
            .into_iter()
            .map(|lang| {
                let set = LanguageCorrectionSet::load(&self.source, &lang);
                (lang, Arc::new(set))
            })
            .collect::<BTreeMap<_, _>>();
        debug!(
            version,
            layouts = layouts.names().len(),
            languages = languages.len(),
            "config snapshot built"
        );
        ConfigSnapshot {
            version,
            layouts,
            variations,
            nav,
            languages,
        }
    }
}

/// How a stale snapshot is refreshed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReloadMode {
    /// Build on a background thread; the old snapshot stays live until swap.
    #[default]
    Background,
    /// Build on the calling thread. Used by tools and tests.
    Inline,
}

/// Shared holder of the current snapshot.
#[derive(Debug)]
pub struct SnapshotHandle {
    current: RwLock<Arc<ConfigSnapshot>>,
    version: Arc<ConfigVersion>,
    /// Incremented per reload request; only the newest may publish.
    generation: AtomicU64,
    /// Highest config version a reload has been requested for.
    requested: AtomicU64,
}

impl SnapshotHandle {
    pub fn new(version: Arc<ConfigVersion>) -> Self {
        Self {
            current: RwLock::new(Arc::new(ConfigSnapshot::empty())),
            version,
            generation: AtomicU64::new(0),
            requested: AtomicU64::new(0),
        }
    }

    pub fn version(&self) -> &Arc<ConfigVersion> {
        &self.version
    }

    pub fn current(&self) -> Arc<ConfigSnapshot> {
        self.current
            .read()
            .map(|s| Arc::clone(&s))
            .unwrap_or_else(|poisoned| Arc::clone(&poisoned.into_inner()))
    }

    /// Whether the published snapshot is older than the config version.
    pub fn is_stale(&self) -> bool {
        self.current().version < self.version.current()
    }

    fn begin(&self) -> (u64, u64) {
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let version = self.version.current();
        self.requested.fetch_max(version, Ordering::AcqRel);
        (generation, version)
    }

    /// Publish `snapshot` if `generation` is still the newest request.
    fn publish(&self, generation: u64, snapshot: ConfigSnapshot) -> bool {
        let Ok(mut current) = self.current.write() else {
            warn!("snapshot lock poisoned, keeping previous snapshot");
            return false;
        };
        if self.generation.load(Ordering::Acquire) != generation {
            debug!(generation, "superseded reload abandoned");
            return false;
        }
        info!(version = snapshot.version, "configuration reloaded");
        *current = Arc::new(snapshot);
        true
    }

    /// Build and publish on the calling thread.
    pub fn reload_now(&self, loader: &ConfigLoader) -> bool {
        let (generation, version) = self.begin();
        let snapshot = loader.load(version);
        self.publish(generation, snapshot)
    }

    /// Build on a background thread. A newer request started before this one
    /// finishes wins; this one's result is then dropped.
    pub fn spawn_reload(self: &Arc<Self>, loader: Arc<ConfigLoader>) -> JoinHandle<bool> {
        let (generation, version) = self.begin();
        let handle = Arc::clone(self);
        std::thread::spawn(move || {
            let snapshot = loader.load(version);
            handle.publish(generation, snapshot)
        })
    }

    /// Safe-point check: request a reload if the config moved past both the
    /// published snapshot and any in-flight request.
    pub fn refresh_if_stale(self: &Arc<Self>, loader: &Arc<ConfigLoader>, mode: ReloadMode) {
        let target = self.version.current();
        if self.current().version >= target || self.requested.load(Ordering::Acquire) >= target {
            return;
        }
        match mode {
            ReloadMode::Inline => {
                self.reload_now(loader);
            }
            ReloadMode::Background => {
                self.spawn_reload(Arc::clone(loader));
            }
        }
    }
}
