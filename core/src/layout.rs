//! Layout definitions and the layered layout store.
//!
//! A layout maps letter keycodes to a `KeyMapping`: the plain and shifted
//! output plus an optional multi-tap sequence. Layouts are JSON documents:
//!
//! ```json
//! { "name": "it_multitap",
//!   "mappings": {
//!     "E": { "lowercase": "e", "uppercase": "E", "multiTapEnabled": true,
//!            "taps": [ {"lowercase": "e", "uppercase": "E"},
//!                      {"lowercase": "è", "uppercase": "È"} ] } } }
//! ```
//!
//! A custom file for layout `x` is layered over the bundled `x` by keycode:
//! each custom entry replaces the bundled entry for that key as a whole.

use crate::config_source::{ConfigSource, LayeredSource, LAYOUTS_DIR, LOCALE_MAP_FILE};
use crate::error::{Error, Result};
use crate::keycode::Keycode;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Name of the identity layout. Never removable, never overridden.
pub const DEFAULT_LAYOUT: &str = "qwerty";

/// One step of a multi-tap sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TapMapping {
    pub lowercase: String,
    pub uppercase: String,
}

impl TapMapping {
    pub fn new(lowercase: &str, uppercase: &str) -> Self {
        Self {
            lowercase: lowercase.to_string(),
            uppercase: uppercase.to_string(),
        }
    }

    pub fn text(&self, upper: bool) -> &str {
        if upper {
            &self.uppercase
        } else {
            &self.lowercase
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyMapping {
    pub lowercase: String,
    pub uppercase: String,
    #[serde(default)]
    pub multi_tap_enabled: bool,
    #[serde(default)]
    pub taps: Vec<TapMapping>,
}

impl KeyMapping {
    pub fn simple(lowercase: &str, uppercase: &str) -> Self {
        Self {
            lowercase: lowercase.to_string(),
            uppercase: uppercase.to_string(),
            multi_tap_enabled: false,
            taps: Vec::new(),
        }
    }

    pub fn multi_tap(lowercase: &str, uppercase: &str, taps: Vec<TapMapping>) -> Self {
        Self {
            lowercase: lowercase.to_string(),
            uppercase: uppercase.to_string(),
            multi_tap_enabled: true,
            taps,
        }
    }

    /// Identity mapping: the platform's default character for `keycode`.
    pub fn identity(keycode: Keycode) -> Option<Self> {
        let ch = keycode.default_char()?;
        Some(Self::simple(
            &ch.to_string(),
            &ch.to_uppercase().collect::<String>(),
        ))
    }

    pub fn text(&self, upper: bool) -> &str {
        if upper {
            &self.uppercase
        } else {
            &self.lowercase
        }
    }

    /// Whether repeated presses should cycle through `taps`.
    pub fn cycles(&self) -> bool {
        self.multi_tap_enabled && self.taps.len() > 1
    }

    /// Text for tap `index`, wrapping modulo the sequence length.
    pub fn tap_text(&self, index: usize, upper: bool) -> Option<&str> {
        if self.taps.is_empty() {
            return None;
        }
        Some(self.taps[index % self.taps.len()].text(upper))
    }

    /// Check the structural invariant: taps only when multi-tap is enabled.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if !self.multi_tap_enabled && !self.taps.is_empty() {
            return Err("taps present but multiTapEnabled is false".to_string());
        }
        if self.lowercase.is_empty() && self.uppercase.is_empty() {
            return Err("mapping produces no text".to_string());
        }
        Ok(())
    }
}

/// A named keycode → mapping table. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutDefinition {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub mappings: BTreeMap<Keycode, KeyMapping>,
}

impl LayoutDefinition {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            mappings: BTreeMap::new(),
        }
    }

    /// The identity layout: every letter maps to its default character.
    pub fn identity() -> Self {
        let mut layout = Self::new(DEFAULT_LAYOUT);
        for kc in Keycode::letters() {
            if let Some(mapping) = KeyMapping::identity(kc) {
                layout.mappings.insert(kc, mapping);
            }
        }
        layout
    }

    pub fn get(&self, keycode: Keycode) -> Option<&KeyMapping> {
        self.mappings.get(&keycode)
    }

    /// Parse a layout document. Entries for non-letter keys or entries that
    /// break the mapping invariant are dropped with a warning.
    pub fn from_json(name: &str, json: &str) -> Result<Self> {
        let mut layout: LayoutDefinition =
            serde_json::from_str(json).map_err(|e| Error::parse(layout_path(name), e))?;
        // The file name is authoritative.
        layout.name = name.to_string();
        layout.mappings.retain(|kc, mapping| {
            if !kc.is_letter() {
                warn!(layout = name, key = %kc, "layout maps a non-letter key, ignoring");
                return false;
            }
            if let Err(reason) = mapping.validate() {
                warn!(layout = name, key = %kc, %reason, "invalid key mapping, ignoring");
                return false;
            }
            true
        });
        Ok(layout)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Replace entries by keycode with those from `custom`.
    pub fn overlay(mut self, custom: LayoutDefinition) -> Self {
        for (kc, mapping) in custom.mappings {
            self.mappings.insert(kc, mapping);
        }
        self
    }
}

pub fn layout_path(name: &str) -> String {
    format!("{}/{}.json", LAYOUTS_DIR, name)
}

/// All layouts and the locale → layout map, resolved from both tiers.
#[derive(Debug, Clone, Default)]
pub struct LayoutStore {
    layouts: BTreeMap<String, Arc<LayoutDefinition>>,
    locales: BTreeMap<String, String>,
}

impl LayoutStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every layout found in either tier. A malformed layout is skipped
    /// (its bundled version is used if only the custom file is broken).
    pub fn load(source: &LayeredSource) -> Self {
        let mut store = Self::new();

        for file in source.list(LAYOUTS_DIR) {
            let Some(name) = file.strip_suffix(".json") else {
                continue;
            };
            if layout_path(name) == LOCALE_MAP_FILE {
                continue;
            }
            if let Some(layout) = load_layered_layout(source, name) {
                store.insert(layout);
            }
        }

        store.locales = load_locale_map(source);
        debug!(
            layouts = store.layouts.len(),
            locales = store.locales.len(),
            "layout store loaded"
        );
        store
    }

    pub fn insert(&mut self, layout: LayoutDefinition) {
        self.layouts.insert(layout.name.clone(), Arc::new(layout));
    }

    pub fn set_locale(&mut self, locale: &str, layout: &str) {
        self.locales.insert(locale.to_string(), layout.to_string());
    }

    pub fn get(&self, name: &str) -> Option<Arc<LayoutDefinition>> {
        self.layouts.get(name).cloned()
    }

    /// Layout `name`, or `ConfigMissing` naming the file it would live in.
    pub fn require(&self, name: &str) -> Result<Arc<LayoutDefinition>> {
        self.get(name)
            .ok_or_else(|| Error::ConfigMissing(layout_path(name)))
    }

    pub fn names(&self) -> Vec<String> {
        self.layouts.keys().cloned().collect()
    }

    pub fn locale_map(&self) -> &BTreeMap<String, String> {
        &self.locales
    }

    /// Layout name for `locale`: exact match, then the language part
    /// (`it_IT` → `it`), then the default layout.
    pub fn layout_for_locale(&self, locale: &str) -> &str {
        if let Some(name) = self.locales.get(locale) {
            return name;
        }
        let language = locale.split(['_', '-']).next().unwrap_or(locale);
        self.locales
            .get(language)
            .map(String::as_str)
            .unwrap_or(DEFAULT_LAYOUT)
    }

    /// Resolve the active layout from an explicit choice or the locale.
    /// `None` means identity.
    pub fn active(&self, explicit: Option<&str>, locale: &str) -> Option<Arc<LayoutDefinition>> {
        let name = explicit.unwrap_or_else(|| self.layout_for_locale(locale));
        let layout = self.get(name);
        if layout.is_none() && name != DEFAULT_LAYOUT {
            warn!(layout = name, "selected layout not available, using identity layout");
        }
        layout
    }

    /// Validate and store a user layout in the custom tier.
    pub fn import_layout(source: &LayeredSource, name: &str, json: &str) -> Result<()> {
        if name == DEFAULT_LAYOUT {
            return Err(Error::ReservedLayout(name.to_string()));
        }
        let layout = LayoutDefinition::from_json(name, json)?;
        Self::save_layout(source, &layout)
    }

    /// Write `layout` to the custom tier.
    pub fn save_layout(source: &LayeredSource, layout: &LayoutDefinition) -> Result<()> {
        if layout.name == DEFAULT_LAYOUT {
            return Err(Error::ReservedLayout(layout.name.clone()));
        }
        let json = layout.to_json()?;
        source.custom().write(&layout_path(&layout.name), json.as_bytes())
    }

    /// Delete a custom layout. The bundled version, if any, becomes visible again.
    pub fn remove_custom_layout(source: &LayeredSource, name: &str) -> Result<bool> {
        if name == DEFAULT_LAYOUT {
            return Err(Error::ReservedLayout(name.to_string()));
        }
        source.custom().remove(&layout_path(name))
    }

    /// Record a custom locale → layout association.
    pub fn set_custom_locale(source: &LayeredSource, locale: &str, layout: &str) -> Result<()> {
        let mut custom: BTreeMap<String, String> = match source.custom().read_string(LOCALE_MAP_FILE)? {
            Some(json) => serde_json::from_str(&json).map_err(|e| Error::parse(LOCALE_MAP_FILE, e))?,
            None => BTreeMap::new(),
        };
        custom.insert(locale.to_string(), layout.to_string());
        let json = serde_json::to_string_pretty(&custom)
            .map_err(|e| Error::Serialization(e.to_string()))?;
        source.custom().write(LOCALE_MAP_FILE, json.as_bytes())
    }
}

fn read_layout<S: ConfigSource + ?Sized>(tier: &S, name: &str) -> Option<LayoutDefinition> {
    let path = layout_path(name);
    match tier.read_string(&path) {
        Ok(Some(json)) => match LayoutDefinition::from_json(name, &json) {
            Ok(layout) => Some(layout),
            Err(e) => {
                warn!(source = tier.label(), layout = name, error = %e, "skipping malformed layout");
                None
            }
        },
        Ok(None) => None,
        Err(e) => {
            warn!(source = tier.label(), layout = name, error = %e, "cannot read layout");
            None
        }
    }
}

fn load_layered_layout(source: &LayeredSource, name: &str) -> Option<LayoutDefinition> {
    let bundled = read_layout(source.bundled(), name);
    // The identity layout is fixed; a custom file cannot change it.
    let custom = if name == DEFAULT_LAYOUT {
        None
    } else {
        read_layout(source.custom(), name)
    };
    match (bundled, custom) {
        (Some(base), Some(custom)) => Some(base.overlay(custom)),
        (Some(base), None) => Some(base),
        (None, Some(custom)) => Some(custom),
        (None, None) => None,
    }
}

fn read_locale_map<S: ConfigSource + ?Sized>(tier: &S, into: &mut BTreeMap<String, String>) {
    match tier.read_string(LOCALE_MAP_FILE) {
        Ok(Some(json)) => match serde_json::from_str::<BTreeMap<String, String>>(&json) {
            Ok(entries) => into.extend(entries),
            Err(e) => warn!(source = tier.label(), error = %e, "malformed locale map, ignoring"),
        },
        Ok(None) => {}
        Err(e) => warn!(source = tier.label(), error = %e, "cannot read locale map"),
    }
}

fn load_locale_map(source: &LayeredSource) -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();
    read_locale_map(source.bundled(), &mut map);
    read_locale_map(source.custom(), &mut map);
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config_source::MemorySource;

    const BASE: &str = r#"{
        "name": "demo",
        "mappings": {
            "KEYCODE_Q": {"lowercase": "a", "uppercase": "A"},
            "KEYCODE_E": {"lowercase": "e", "uppercase": "E", "multiTapEnabled": true,
                          "taps": [{"lowercase": "e", "uppercase": "E"},
                                   {"lowercase": "è", "uppercase": "È"}]}
        }
    }"#;

    fn layered(custom: MemorySource) -> LayeredSource {
        let bundled = MemorySource::new("bundled")
            .with_file("layouts/demo.json", BASE)
            .with_file("layouts/qwerty.json", r#"{"mappings": {}}"#)
            .with_file("layouts/locales.json", r#"{"it": "demo"}"#);
        LayeredSource::new(Arc::new(custom), Arc::new(bundled))
    }

    #[test]
    fn custom_entries_replace_by_keycode() {
        let custom = MemorySource::new("custom").with_file(
            "layouts/demo.json",
            r#"{"mappings": {"E": {"lowercase": "é", "uppercase": "É"}}}"#,
        );
        let store = LayoutStore::load(&layered(custom));
        let demo = store.get("demo").unwrap();
        // Whole entry replaced: no leftover taps from the bundled mapping.
        assert_eq!(demo.get(Keycode::E), Some(&KeyMapping::simple("é", "É")));
        assert_eq!(demo.get(Keycode::Q), Some(&KeyMapping::simple("a", "A")));
    }

    #[test]
    fn broken_custom_layout_falls_back_to_bundled() {
        let custom = MemorySource::new("custom").with_file("layouts/demo.json", "{ not json");
        let store = LayoutStore::load(&layered(custom));
        assert_eq!(
            store.get("demo").unwrap().get(Keycode::Q),
            Some(&KeyMapping::simple("a", "A"))
        );
    }

    #[test]
    fn locale_resolution_falls_back_to_language_then_default() {
        let store = LayoutStore::load(&layered(MemorySource::new("custom")));
        assert_eq!(store.layout_for_locale("it_IT"), "demo");
        assert_eq!(store.layout_for_locale("it"), "demo");
        assert_eq!(store.layout_for_locale("fr_FR"), DEFAULT_LAYOUT);
    }

    #[test]
    fn require_names_the_missing_file() {
        let store = LayoutStore::load(&layered(MemorySource::new("custom")));
        assert_eq!(store.require("demo").unwrap().name, "demo");
        match store.require("colemak") {
            Err(Error::ConfigMissing(path)) => assert_eq!(path, "layouts/colemak.json"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn qwerty_is_reserved() {
        let source = layered(MemorySource::new("custom"));
        assert!(matches!(
            LayoutStore::remove_custom_layout(&source, DEFAULT_LAYOUT),
            Err(Error::ReservedLayout(_))
        ));
        assert!(matches!(
            LayoutStore::import_layout(&source, DEFAULT_LAYOUT, BASE),
            Err(Error::ReservedLayout(_))
        ));
    }

    #[test]
    fn invalid_mappings_are_dropped() {
        let json = r#"{"mappings": {
            "A": {"lowercase": "a", "uppercase": "A", "taps": [{"lowercase": "x", "uppercase": "X"}]},
            "SPACE": {"lowercase": " ", "uppercase": " "},
            "B": {"lowercase": "b", "uppercase": "B"}
        }}"#;
        let layout = LayoutDefinition::from_json("bad", json).unwrap();
        assert_eq!(layout.mappings.len(), 1);
        assert!(layout.get(Keycode::B).is_some());
    }

    #[test]
    fn save_and_reload_is_lossless() {
        let source = layered(MemorySource::new("custom"));
        let original = LayoutDefinition::from_json("demo", BASE).unwrap();
        let mut copy = original.clone();
        copy.name = "mine".to_string();
        LayoutStore::save_layout(&source, &copy).unwrap();
        let reloaded = LayoutStore::load(&source).get("mine").unwrap();
        assert_eq!(reloaded.as_ref(), &copy);
        assert_eq!(reloaded.mappings, original.mappings);
    }
}
