//! Correction settings, language enablement and the shared settings store.

use crate::config_source::{ConfigVersion, WritableSource, SETTINGS_FILE};
use crate::dictionary::Source;
use crate::error::{Error, Result};
use crate::Config;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::sync::{Arc, RwLock};
use tracing::{info, warn};

/// Upper bound for `max_auto_replace_distance`.
pub const MAX_AUTO_REPLACE_DISTANCE: u8 = 3;

/// Order applied to candidates that tie on edit distance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    /// Higher frequency first, then user entries before main entries.
    #[default]
    FrequencyThenSource,
    /// User entries first, then higher frequency.
    SourceThenFrequency,
}

impl TieBreak {
    /// `Less` means `a` ranks before `b`.
    pub fn compare(self, a: (u32, Source), b: (u32, Source)) -> Ordering {
        let by_freq = b.0.cmp(&a.0);
        let by_source = b.1.rank().cmp(&a.1.rank());
        match self {
            TieBreak::FrequencyThenSource => by_freq.then(by_source),
            TieBreak::SourceThenFrequency => by_source.then(by_freq),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrectionSettings {
    pub enabled: bool,
    pub accent_matching: bool,
    pub auto_replace_on_boundary: bool,
    pub max_auto_replace_distance: u8,
    pub max_suggestions: usize,
    pub tie_break: TieBreak,
}

impl Default for CorrectionSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            accent_matching: true,
            auto_replace_on_boundary: true,
            max_auto_replace_distance: 1,
            max_suggestions: 3,
            tie_break: TieBreak::default(),
        }
    }
}

impl CorrectionSettings {
    /// Distance bound for boundary auto-replacement, clamped to 0..=3.
    pub fn auto_replace_distance(&self) -> usize {
        self.max_auto_replace_distance.min(MAX_AUTO_REPLACE_DISTANCE) as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariationMode {
    /// Variants follow the letter before the cursor.
    #[default]
    Dynamic,
    /// A fixed utility row, independent of cursor content.
    Static,
}

/// Enabled correction languages. The empty set is the sentinel for "every
/// available language", so newly added languages are enabled automatically.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnabledLanguages {
    explicit: BTreeSet<String>,
}

impl EnabledLanguages {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn from_set(explicit: BTreeSet<String>) -> Self {
        Self { explicit }
    }

    pub fn explicit(&self) -> &BTreeSet<String> {
        &self.explicit
    }

    pub fn into_set(self) -> BTreeSet<String> {
        self.explicit
    }

    pub fn is_all(&self) -> bool {
        self.explicit.is_empty()
    }

    pub fn is_enabled(&self, lang: &str) -> bool {
        self.explicit.is_empty() || self.explicit.contains(lang)
    }

    fn effective(&self, available: &[String]) -> BTreeSet<String> {
        available
            .iter()
            .filter(|lang| self.is_enabled(lang))
            .cloned()
            .collect()
    }

    /// Enable `lang`. Once every available language is enabled the set
    /// collapses back to the sentinel.
    pub fn enable(&mut self, lang: &str, available: &[String]) {
        if self.is_all() {
            return;
        }
        self.explicit.insert(lang.to_string());
        if available.iter().all(|l| self.explicit.contains(l)) {
            self.explicit.clear();
        }
    }

    /// Disable `lang`. Rejected, leaving the set unchanged, when it is the
    /// last enabled language.
    pub fn disable(&mut self, lang: &str, available: &[String]) -> Result<()> {
        let mut effective = self.effective(available);
        if !effective.contains(lang) {
            return Ok(());
        }
        if effective.len() <= 1 {
            warn!(lang, "refusing to disable the last enabled language");
            return Err(Error::AtLeastOneLanguageRequired);
        }
        effective.remove(lang);
        self.explicit = effective;
        Ok(())
    }

    /// Languages to consult, active language first. Falls back to the active
    /// language alone when nothing else is enabled and available.
    pub fn resolve(&self, active: &str, available: &[String]) -> Vec<String> {
        let mut langs: Vec<String> = available
            .iter()
            .filter(|lang| self.is_enabled(lang))
            .cloned()
            .collect();
        if let Some(pos) = langs.iter().position(|l| l == active) {
            let lang = langs.remove(pos);
            langs.insert(0, lang);
        }
        if langs.is_empty() && available.iter().any(|l| l == active) {
            langs.push(active.to_string());
        }
        langs
    }
}

/// Process-wide settings, shared between the pipeline and the configuration UI.
///
/// Readers take a fresh copy per evaluation; writers replace the whole value
/// and bump the shared version.
#[derive(Debug)]
pub struct SettingsStore {
    config: RwLock<Config>,
    version: Arc<ConfigVersion>,
}

impl SettingsStore {
    pub fn new(config: Config, version: Arc<ConfigVersion>) -> Self {
        Self {
            config: RwLock::new(config),
            version,
        }
    }

    pub fn version(&self) -> &Arc<ConfigVersion> {
        &self.version
    }

    pub fn current(&self) -> Config {
        self.config
            .read()
            .map(|c| c.clone())
            .unwrap_or_default()
    }

    pub fn correction(&self) -> CorrectionSettings {
        self.config
            .read()
            .map(|c| c.correction.clone())
            .unwrap_or_default()
    }

    /// Apply `f` to the settings and bump the version. Returns the new version.
    pub fn update<F: FnOnce(&mut Config)>(&self, f: F) -> u64 {
        if let Ok(mut config) = self.config.write() {
            f(&mut config);
        }
        let version = self.version.bump();
        info!(version, "settings updated");
        version
    }

    /// Fallible variant of `update`. The version is bumped only on success.
    pub fn try_update<F>(&self, f: F) -> Result<u64>
    where
        F: FnOnce(&mut Config) -> Result<()>,
    {
        {
            let mut config = self
                .config
                .write()
                .map_err(|_| Error::Serialization("settings lock poisoned".to_string()))?;
            let mut next = config.clone();
            f(&mut next)?;
            *config = next;
        }
        let version = self.version.bump();
        info!(version, "settings updated");
        Ok(version)
    }

    /// Persist the current settings to `settings.toml` in `tier`.
    pub fn save<S: WritableSource + ?Sized>(&self, tier: &S) -> Result<()> {
        let toml = self
            .current()
            .to_toml_string()
            .map_err(|e| Error::Serialization(e.to_string()))?;
        tier.write(SETTINGS_FILE, toml.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn langs(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn distance_is_clamped() {
        let settings = CorrectionSettings {
            max_auto_replace_distance: 9,
            ..Default::default()
        };
        assert_eq!(settings.auto_replace_distance(), 3);
    }

    #[test]
    fn tie_break_orders() {
        let user_low = (10, Source::User);
        let main_high = (50, Source::Main);
        assert_eq!(
            TieBreak::FrequencyThenSource.compare(main_high, user_low),
            Ordering::Less
        );
        assert_eq!(
            TieBreak::SourceThenFrequency.compare(user_low, main_high),
            Ordering::Less
        );
        assert_eq!(
            TieBreak::FrequencyThenSource.compare((5, Source::User), (5, Source::Main)),
            Ordering::Less
        );
    }

    #[test]
    fn last_language_cannot_be_disabled() {
        let available = langs(&["en", "it"]);
        let mut enabled = EnabledLanguages::all();
        enabled.disable("it", &available).unwrap();
        assert_eq!(enabled.explicit().len(), 1);
        let before = enabled.clone();
        assert!(matches!(
            enabled.disable("en", &available),
            Err(Error::AtLeastOneLanguageRequired)
        ));
        assert_eq!(enabled, before);
    }

    #[test]
    fn enabling_everything_collapses_to_sentinel() {
        let available = langs(&["en", "it"]);
        let mut enabled = EnabledLanguages::all();
        enabled.disable("en", &available).unwrap();
        assert!(!enabled.is_enabled("en"));
        enabled.enable("en", &available);
        assert!(enabled.is_all());
        // A language added later is enabled without being listed.
        assert!(enabled.is_enabled("de"));
    }

    #[test]
    fn resolve_puts_active_first() {
        let available = langs(&["de", "en", "it"]);
        let enabled = EnabledLanguages::all();
        assert_eq!(enabled.resolve("it", &available), langs(&["it", "de", "en"]));
        let only_de = EnabledLanguages::from_set(["de".to_string()].into_iter().collect());
        assert_eq!(only_de.resolve("it", &available), langs(&["de"]));
    }

    #[test]
    fn store_updates_bump_version() {
        let version = Arc::new(ConfigVersion::new());
        let store = SettingsStore::new(Config::default(), version.clone());
        let start = version.current();
        store.update(|c| c.correction.max_suggestions = 5);
        assert_eq!(store.correction().max_suggestions, 5);
        assert_eq!(version.current(), start + 1);
        let failed = store.try_update(|_| Err(Error::AtLeastOneLanguageRequired));
        assert!(failed.is_err());
        assert_eq!(version.current(), start + 1);
    }
}
