//! Input-method service facade.
//!
//! Wires the bundled assets and a user tier into one `LayeredSource`, owns
//! the shared settings, snapshot handle and personal dictionary, and hands
//! out per-session pipelines. Every configuration write goes through here so
//! the version is bumped and pipelines reload at their next safe point.

use crate::assets;
use keypipe_core::corrections::available_languages;
use keypipe_core::{
    Clock, Config, ConfigLoader, ConfigSnapshot, ConfigVersion, CtrlMapping, DirSource,
    Keycode, LanguageCorrectionSet, LayeredSource, LayoutStore, MemorySource,
    Pipeline, ReloadMode, Result, SettingsStore, SnapshotHandle, UserDict, VariationTable,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{info, warn};

/// File name of the personal dictionary inside the user directory.
pub const PERSONAL_DICT_FILE: &str = "personal.redb";

pub struct ImeService {
    source: LayeredSource,
    version: Arc<ConfigVersion>,
    settings: Arc<SettingsStore>,
    snapshots: Arc<SnapshotHandle>,
    loader: Arc<ConfigLoader>,
    userdict: UserDict,
    reload_mode: ReloadMode,
}

impl ImeService {
    /// Service over the bundled assets and the user directory `config_dir`.
    pub fn open<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let dir = config_dir.as_ref();
        std::fs::create_dir_all(dir)?;
        let userdict = UserDict::new_redb(dir.join(PERSONAL_DICT_FILE))?;
        info!(dir = %dir.display(), "opening user configuration");
        Ok(Self::with_parts(
            LayeredSource::new(
                Arc::new(DirSource::new(dir)),
                Arc::new(assets::bundled_source()),
            ),
            userdict,
        ))
    }

    /// Service with an in-memory user tier. Nothing is persisted.
    pub fn in_memory() -> Self {
        Self::with_parts(
            LayeredSource::new(
                Arc::new(MemorySource::new("custom")),
                Arc::new(assets::bundled_source()),
            ),
            UserDict::new_in_memory(),
        )
    }

    pub fn with_parts(source: LayeredSource, userdict: UserDict) -> Self {
        let config = Config::load(source.custom());
        let version = Arc::new(ConfigVersion::new());
        Self {
            settings: Arc::new(SettingsStore::new(config, version.clone())),
            snapshots: Arc::new(SnapshotHandle::new(version.clone())),
            loader: Arc::new(ConfigLoader::new(source.clone())),
            source,
            version,
            userdict,
            reload_mode: ReloadMode::Background,
        }
    }

    /// Reload on the calling thread at safe points. Used by the CLI and tests
    /// where output must reflect an edit immediately.
    pub fn with_reload_mode(mut self, mode: ReloadMode) -> Self {
        self.reload_mode = mode;
        self
    }

    pub fn source(&self) -> &LayeredSource {
        &self.source
    }

    pub fn settings(&self) -> &Arc<SettingsStore> {
        &self.settings
    }

    pub fn version(&self) -> u64 {
        self.version.current()
    }

    pub fn userdict(&self) -> &UserDict {
        &self.userdict
    }

    pub fn snapshot(&self) -> Arc<ConfigSnapshot> {
        self.snapshots.current()
    }

    /// Build the first snapshot on the calling thread.
    pub fn load_now(&self) -> Arc<ConfigSnapshot> {
        self.snapshots.reload_now(&self.loader);
        self.snapshots.current()
    }

    /// Explicit reload signal: rebuild everything in the background.
    pub fn reload(&self) -> JoinHandle<bool> {
        self.version.bump();
        self.snapshots.spawn_reload(Arc::clone(&self.loader))
    }

    /// A pipeline for one input session.
    pub fn pipeline(&self, clock: Arc<dyn Clock>) -> Pipeline {
        Pipeline::new(
            Arc::clone(&self.snapshots),
            Arc::clone(&self.loader),
            Arc::clone(&self.settings),
            self.userdict.clone(),
            clock,
        )
        .with_reload_mode(self.reload_mode)
    }

    fn changed(&self, what: &str) {
        let version = self.version.bump();
        info!(version, what, "configuration changed");
    }

    /// Apply a settings edit and persist it to the user tier.
    pub fn update_settings<F: FnOnce(&mut Config)>(&self, f: F) -> Result<u64> {
        let version = self.settings.update(f);
        self.settings.save(self.source.custom())?;
        Ok(version)
    }

    /// Override settings for this process only.
    pub fn override_settings<F: FnOnce(&mut Config)>(&self, f: F) -> u64 {
        self.settings.update(f)
    }

    pub fn layout_names(&self) -> Vec<String> {
        LayoutStore::load(&self.source).names()
    }

    pub fn import_layout(&self, name: &str, json: &str) -> Result<()> {
        LayoutStore::import_layout(&self.source, name, json)?;
        self.changed("layout imported");
        Ok(())
    }

    /// Effective JSON for layout `name`, custom entries included.
    pub fn export_layout(&self, name: &str) -> Result<String> {
        LayoutStore::load(&self.source).require(name)?.to_json()
    }

    pub fn remove_layout(&self, name: &str) -> Result<bool> {
        let removed = LayoutStore::remove_custom_layout(&self.source, name)?;
        if removed {
            self.changed("layout removed");
        }
        Ok(removed)
    }

    pub fn set_locale_layout(&self, locale: &str, layout: &str) -> Result<()> {
        LayoutStore::set_custom_locale(&self.source, locale, layout)?;
        self.changed("locale layout");
        Ok(())
    }

    /// Edit the effective variation table and save it to the user tier.
    pub fn edit_variations<F: FnOnce(&mut VariationTable)>(&self, f: F) -> Result<()> {
        let mut table = VariationTable::load(&self.source);
        f(&mut table);
        table.save(&self.source)?;
        self.changed("variations");
        Ok(())
    }

    pub fn set_nav_mapping(&self, keycode: Keycode, mapping: CtrlMapping) -> Result<()> {
        keypipe_core::NavModeRemapper::set_custom_mapping(&self.source, keycode, mapping)?;
        self.changed("nav mapping");
        Ok(())
    }

    pub fn revert_nav_mapping(&self, keycode: Keycode) -> Result<CtrlMapping> {
        let mapping = keypipe_core::NavModeRemapper::revert_to_default(&self.source, keycode)?;
        self.changed("nav mapping reverted");
        Ok(mapping)
    }

    pub fn set_correction(&self, language: &str, original: &str, corrected: &str) -> Result<()> {
        LanguageCorrectionSet::set_custom_correction(&self.source, language, original, corrected)?;
        self.changed("correction added");
        Ok(())
    }

    pub fn remove_correction(&self, language: &str, original: &str) -> Result<bool> {
        let removed =
            LanguageCorrectionSet::remove_custom_correction(&self.source, language, original)?;
        if removed {
            self.changed("correction removed");
        }
        Ok(removed)
    }

    pub fn available_languages(&self) -> Vec<String> {
        available_languages(&self.source)
    }

    pub fn enable_language(&self, language: &str) -> Result<()> {
        let available = self.available_languages();
        self.settings.update(|c| {
            let mut enabled = c.enabled();
            enabled.enable(language, &available);
            c.enabled_languages = enabled.into_set();
        });
        self.settings.save(self.source.custom())
    }

    /// Rejected with `AtLeastOneLanguageRequired` when `language` is the last
    /// one enabled; settings are left untouched.
    pub fn disable_language(&self, language: &str) -> Result<()> {
        let available = self.available_languages();
        self.settings.try_update(|c| {
            let mut enabled = c.enabled();
            enabled.disable(language, &available)?;
            c.enabled_languages = enabled.into_set();
            Ok(())
        })?;
        self.settings.save(self.source.custom())
    }
}

/// `$HOME/.keypipe`, or `./.keypipe` when no home directory is known.
pub fn default_config_dir() -> PathBuf {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| {
            warn!("no home directory, using the current directory");
            ".".to_string()
        });
    PathBuf::from(home).join(".keypipe")
}
