//! keypipe-core
//!
//! Key-event transformation and correction pipeline for physical-keyboard
//! input methods. A raw key event flows through the nav-mode remapper, the
//! layout resolver and the multi-tap sequencer before text reaches the host
//! field; word boundaries run the correction engine.
//!
//! Public API:
//! - `Pipeline` - per-session key-event handler
//! - `ConfigSnapshot` / `SnapshotHandle` - immutable tables and their reload path
//! - `LayoutStore` / `LayoutResolver` - keycode → text mapping
//! - `MultiTapSequencer` - repeated-press cycling with a time window
//! - `VariationTable` - accented variants per letter
//! - `NavModeRemapper` - nav-modifier remapping to keys and editor actions
//! - `CorrectionEngine` - boundary auto-correction and suggestions
//! - `Config` / `SettingsStore` - process-wide settings
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::warn;

pub mod error;
pub use error::{Error, Result};

pub mod keycode;
pub use keycode::Keycode;

pub mod config_source;
pub use config_source::{
    ConfigSource, ConfigVersion, DirSource, LayeredSource, MemorySource, WritableSource,
};

pub mod layout;
pub use layout::{KeyMapping, LayoutDefinition, LayoutStore, TapMapping, DEFAULT_LAYOUT};

pub mod resolver;
pub use resolver::{LayoutResolver, ResolvedKey};

pub mod text_field;
pub use text_field::{EditorAction, InputPurpose, TextField};

pub mod memory_field;
pub use memory_field::MemoryTextField;

pub mod multitap;
pub use multitap::{Clock, ManualClock, MultiTapSequencer, SystemClock, TapState, TapStep};

pub mod settings;
pub use settings::{CorrectionSettings, EnabledLanguages, SettingsStore, TieBreak, VariationMode};

pub mod variation;
pub use variation::VariationTable;

pub mod nav;
pub use nav::{CtrlMapping, NavModeRemapper, NavTable};

pub mod distance;

pub mod dictionary;
pub use dictionary::{Dictionary, DictionaryEntry, Source};

pub mod userdict;
pub use userdict::UserDict;

pub mod corrections;
pub use corrections::{CorrectionMap, LanguageCorrectionSet};

pub mod candidate;
pub use candidate::Suggestion;

pub mod engine;
pub use engine::CorrectionEngine;

pub mod session;
pub use session::{AppliedCorrection, Session};

pub mod snapshot;
pub use snapshot::{ConfigLoader, ConfigSnapshot, ReloadMode, SnapshotHandle};

pub mod pipeline;
pub use pipeline::{KeyEvent, KeyResult, Modifiers, Pipeline};

/// Process-wide configuration.
///
/// Persisted as `settings.toml` in the user tier. Missing fields take their
/// defaults, so older files keep loading as fields are added.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Multi-tap cycling window in milliseconds.
    pub multitap_window_ms: u64,
    /// Whether the nav modifier remaps keys.
    pub nav_mode_enabled: bool,
    pub variation_mode: VariationMode,
    /// Explicit layout name. When unset the locale map decides.
    pub layout: Option<String>,
    /// Active input locale, e.g. `en` or `it_IT`.
    pub locale: String,
    /// Enabled correction languages. Empty means all available.
    pub enabled_languages: BTreeSet<String>,
    pub correction: CorrectionSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            multitap_window_ms: 400,
            nav_mode_enabled: true,
            variation_mode: VariationMode::default(),
            layout: None,
            locale: "en".to_string(),
            enabled_languages: BTreeSet::new(),
            correction: CorrectionSettings::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load_toml<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| Error::parse(path.display().to_string(), e))
    }

    /// Save configuration to a TOML file.
    pub fn save_toml<P: AsRef<std::path::Path>>(&self, path: P) -> Result<()> {
        let content = self
            .to_toml_string()
            .map_err(|e| Error::Serialization(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load configuration from TOML string.
    pub fn from_toml_str(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Serialize configuration to TOML string.
    pub fn to_toml_string(&self) -> std::result::Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Read `settings.toml` from `source`. A missing or malformed file yields
    /// the defaults.
    pub fn load<S: ConfigSource + ?Sized>(source: &S) -> Self {
        match source.read_string(config_source::SETTINGS_FILE) {
            Ok(Some(content)) => Self::from_toml_str(&content).unwrap_or_else(|e| {
                warn!(source = source.label(), error = %e, "settings unusable, using defaults");
                Self::default()
            }),
            Ok(None) => Self::default(),
            Err(e) => {
                warn!(source = source.label(), error = %e, "cannot read settings, using defaults");
                Self::default()
            }
        }
    }

    /// Language part of the locale (`it_IT` → `it`).
    pub fn language(&self) -> &str {
        locale_language(&self.locale)
    }

    pub fn enabled(&self) -> EnabledLanguages {
        EnabledLanguages::from_set(self.enabled_languages.clone())
    }
}

/// Language part of a locale identifier (`pt-BR` → `pt`).
pub fn locale_language(locale: &str) -> &str {
    locale.split(['_', '-']).next().unwrap_or(locale)
}

/// Utility helpers.
pub mod utils {
    use unicode_normalization::char::is_combining_mark;
    use unicode_normalization::UnicodeNormalization;

    /// Dictionary key for a word: lowercase, accents stripped, letters only.
    pub fn normalize_word(s: &str) -> String {
        s.to_lowercase()
            .nfd()
            .filter(|c| !is_combining_mark(*c))
            .filter(|c| c.is_alphabetic())
            .collect()
    }

    /// Strip accents but keep case and every non-mark character.
    pub fn fold_accents(s: &str) -> String {
        s.nfd()
            .filter(|c| !is_combining_mark(*c))
            .nfc()
            .collect()
    }

    /// Reapply the casing of `original` to `word`: all caps when the typed
    /// word has at least two letters all uppercase, capitalized when it starts
    /// uppercase, otherwise `word` as stored.
    pub fn apply_case(original: &str, word: &str) -> String {
        let letters: Vec<char> = original.chars().filter(|c| c.is_alphabetic()).collect();
        if letters.len() >= 2 && letters.iter().all(|c| c.is_uppercase()) {
            return word.to_uppercase();
        }
        match original.chars().next() {
            Some(first) if first.is_uppercase() => {
                let mut chars = word.chars();
                match chars.next() {
                    Some(head) => head.to_uppercase().chain(chars).collect(),
                    None => String::new(),
                }
            }
            _ => word.to_string(),
        }
    }
}
