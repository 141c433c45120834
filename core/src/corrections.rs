//! Per-language correction sets.
//!
//! A correction file `corrections/<lang>.json` maps original words to their
//! corrections. The reserved key `__name` carries the language's display
//! name. Custom entries replace bundled entries for the same original word.

use crate::config_source::{ConfigSource, LayeredSource, CORRECTIONS_DIR, DICTIONARIES_DIR};
use crate::dictionary::{self, Dictionary};
use crate::error::{Error, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, warn};

/// Reserved key holding the display name in a correction file.
pub const DISPLAY_NAME_KEY: &str = "__name";

pub fn corrections_path(language: &str) -> String {
    format!("{}/{}.json", CORRECTIONS_DIR, language)
}

/// One tier's exact-match map. Keys are lowercase.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CorrectionMap {
    entries: BTreeMap<String, String>,
    display_name: Option<String>,
}

impl CorrectionMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(language: &str, json: &str) -> Result<Self> {
        let raw: BTreeMap<String, String> =
            serde_json::from_str(json).map_err(|e| Error::parse(corrections_path(language), e))?;
        let mut map = Self::new();
        for (original, corrected) in raw {
            if original == DISPLAY_NAME_KEY {
                map.display_name = Some(corrected);
            } else {
                map.insert(&original, &corrected);
            }
        }
        Ok(map)
    }

    pub fn to_json(&self) -> Result<String> {
        let mut raw = self.entries.clone();
        if let Some(name) = &self.display_name {
            raw.insert(DISPLAY_NAME_KEY.to_string(), name.clone());
        }
        serde_json::to_string_pretty(&raw).map_err(|e| Error::Serialization(e.to_string()))
    }

    pub fn get(&self, lowercase: &str) -> Option<&str> {
        self.entries.get(lowercase).map(String::as_str)
    }

    pub fn insert(&mut self, original: &str, corrected: &str) {
        self.entries
            .insert(original.to_lowercase(), corrected.to_string());
    }

    pub fn remove(&mut self, original: &str) -> bool {
        self.entries.remove(&original.to_lowercase()).is_some()
    }

    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    pub fn set_display_name(&mut self, name: &str) {
        self.display_name = Some(name.to_string());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

fn read_map<S: ConfigSource + ?Sized>(tier: &S, language: &str) -> CorrectionMap {
    match tier.read_string(&corrections_path(language)) {
        Ok(Some(json)) => CorrectionMap::from_json(language, &json).unwrap_or_else(|e| {
            warn!(source = tier.label(), language, error = %e, "correction file unusable, ignoring");
            CorrectionMap::new()
        }),
        Ok(None) => CorrectionMap::new(),
        Err(e) => {
            warn!(source = tier.label(), language, error = %e, "cannot read correction file");
            CorrectionMap::new()
        }
    }
}

/// Custom map for an edit. A malformed file fails the edit instead of
/// being replaced.
fn read_custom_map(source: &LayeredSource, language: &str) -> Result<CorrectionMap> {
    match source.custom().read_string(&corrections_path(language))? {
        Some(json) => CorrectionMap::from_json(language, &json),
        None => Ok(CorrectionMap::new()),
    }
}

/// Exact-match corrections and the dictionary for one language.
#[derive(Debug, Clone, Default)]
pub struct LanguageCorrectionSet {
    language: String,
    custom: CorrectionMap,
    bundled: CorrectionMap,
    dictionary: Option<Arc<Dictionary>>,
}

impl LanguageCorrectionSet {
    pub fn new(language: &str) -> Self {
        Self {
            language: language.to_string(),
            ..Self::default()
        }
    }

    pub fn with_maps(language: &str, custom: CorrectionMap, bundled: CorrectionMap) -> Self {
        Self {
            language: language.to_string(),
            custom,
            bundled,
            dictionary: None,
        }
    }

    pub fn with_dictionary(mut self, dictionary: Dictionary) -> Self {
        self.dictionary = Some(Arc::new(dictionary));
        self
    }

    /// Load both correction tiers and the dictionary. Each part degrades to
    /// empty on failure without affecting the others.
    pub fn load(source: &LayeredSource, language: &str) -> Self {
        let bundled = read_map(source.bundled(), language);
        let custom = read_map(source.custom(), language);
        let dictionary = Dictionary::load(source, language).map(Arc::new);
        if dictionary.is_none() {
            debug!(language, "no dictionary for language");
        }
        Self {
            language: language.to_string(),
            custom,
            bundled,
            dictionary,
        }
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    /// Display name from the custom file, then bundled, else the code.
    pub fn display_name(&self) -> &str {
        self.custom
            .display_name()
            .or_else(|| self.bundled.display_name())
            .unwrap_or(&self.language)
    }

    /// Exact-match correction for `word`, custom entries first.
    pub fn exact(&self, word: &str) -> Option<&str> {
        let lower = word.to_lowercase();
        self.custom.get(&lower).or_else(|| self.bundled.get(&lower))
    }

    pub fn dictionary(&self) -> Option<&Dictionary> {
        self.dictionary.as_deref()
    }

    /// Dictionary or `DictionaryUnavailable`.
    pub fn require_dictionary(&self) -> Result<&Dictionary> {
        self.dictionary()
            .ok_or_else(|| Error::DictionaryUnavailable(self.language.clone()))
    }

    pub fn custom(&self) -> &CorrectionMap {
        &self.custom
    }

    pub fn bundled(&self) -> &CorrectionMap {
        &self.bundled
    }

    /// Merged view: bundled entries with custom ones replacing them.
    pub fn effective(&self) -> BTreeMap<String, String> {
        let mut merged: BTreeMap<String, String> = self
            .bundled
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        merged.extend(self.custom.iter().map(|(k, v)| (k.to_string(), v.to_string())));
        merged
    }

    /// Add or replace a custom correction in the custom tier.
    pub fn set_custom_correction(
        source: &LayeredSource,
        language: &str,
        original: &str,
        corrected: &str,
    ) -> Result<()> {
        let mut custom = read_custom_map(source, language)?;
        custom.insert(original, corrected);
        source
            .custom()
            .write(&corrections_path(language), custom.to_json()?.as_bytes())
    }

    /// Remove a custom correction; the bundled entry, if any, applies again.
    pub fn remove_custom_correction(
        source: &LayeredSource,
        language: &str,
        original: &str,
    ) -> Result<bool> {
        let mut custom = read_custom_map(source, language)?;
        if !custom.remove(original) {
            return Ok(false);
        }
        source
            .custom()
            .write(&corrections_path(language), custom.to_json()?.as_bytes())?;
        Ok(true)
    }
}

/// Language codes with a correction file or a dictionary in either tier.
pub fn available_languages(source: &LayeredSource) -> Vec<String> {
    let mut langs = BTreeSet::new();
    for file in source.list(CORRECTIONS_DIR) {
        if let Some(lang) = file.strip_suffix(".json") {
            langs.insert(lang.to_string());
        }
    }
    for file in source.list(DICTIONARIES_DIR) {
        if let Some(lang) = dictionary::language_of_file(&file) {
            langs.insert(lang.to_string());
        }
    }
    langs.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config_source::MemorySource;

    fn source(custom: MemorySource) -> LayeredSource {
        let bundled = MemorySource::new("bundled")
            .with_file(
                "corrections/en.json",
                r#"{"__name": "English", "teh": "the", "recieve": "receive"}"#,
            )
            .with_file("dictionaries/it_base.json", r#"[{"w": "ciao", "f": 3}]"#);
        LayeredSource::new(Arc::new(custom), Arc::new(bundled))
    }

    #[test]
    fn custom_entry_replaces_bundled() {
        let custom = MemorySource::new("custom")
            .with_file("corrections/en.json", r#"{"teh": "tea"}"#);
        let set = LanguageCorrectionSet::load(&source(custom), "en");
        assert_eq!(set.exact("TEH"), Some("tea"));
        assert_eq!(set.exact("recieve"), Some("receive"));
        assert_eq!(set.display_name(), "English");
        assert_eq!(set.effective().len(), 2);
    }

    #[test]
    fn broken_custom_file_keeps_bundled() {
        let custom = MemorySource::new("custom").with_file("corrections/en.json", "nope");
        let set = LanguageCorrectionSet::load(&source(custom), "en");
        assert_eq!(set.exact("teh"), Some("the"));
    }

    #[test]
    fn missing_dictionary_is_reported() {
        let set = LanguageCorrectionSet::load(&source(MemorySource::new("custom")), "en");
        assert!(matches!(
            set.require_dictionary(),
            Err(Error::DictionaryUnavailable(lang)) if lang == "en"
        ));
    }

    #[test]
    fn languages_come_from_both_directories() {
        let src = source(MemorySource::new("custom"));
        assert_eq!(available_languages(&src), vec!["en", "it"]);
    }

    #[test]
    fn custom_corrections_are_written_and_removed() {
        let src = source(MemorySource::new("custom"));
        LanguageCorrectionSet::set_custom_correction(&src, "en", "Adn", "and").unwrap();
        assert_eq!(LanguageCorrectionSet::load(&src, "en").exact("adn"), Some("and"));
        assert!(LanguageCorrectionSet::remove_custom_correction(&src, "en", "adn").unwrap());
        assert!(!LanguageCorrectionSet::remove_custom_correction(&src, "en", "adn").unwrap());
        assert_eq!(LanguageCorrectionSet::load(&src, "en").exact("adn"), None);
    }

    #[test]
    fn malformed_custom_file_blocks_edits() {
        let custom = MemorySource::new("custom").with_file("corrections/en.json", "nope");
        let src = source(custom);
        assert!(matches!(
            LanguageCorrectionSet::set_custom_correction(&src, "en", "adn", "and"),
            Err(Error::ConfigParse { path, .. }) if path == "corrections/en.json"
        ));
        assert!(matches!(
            LanguageCorrectionSet::remove_custom_correction(&src, "en", "teh"),
            Err(Error::ConfigParse { .. })
        ));
        assert_eq!(
            src.custom().read_string("corrections/en.json").unwrap().as_deref(),
            Some("nope")
        );
    }
}
