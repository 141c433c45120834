//! Variation tables: diacritic and symbol alternates for base letters.
//!
//! File format (`variations.json`):
//!
//! ```json
//! { "variations": { "e": ["è", "é", "ê"], "E": ["È", "É"] },
//!   "staticVariations": ["€", "@", "😀"] }
//! ```
//!
//! Each list holds at most seven slots. An empty string is a hole left by a
//! deleted slot; holes keep the positions of later slots and trailing holes
//! are trimmed on save. A custom file replaces bundled entries per letter.

use crate::config_source::{LayeredSource, VARIATIONS_FILE};
use crate::error::{Error, Result};
use crate::settings::VariationMode;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

pub const MAX_VARIATIONS: usize = 7;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VariationFile {
    #[serde(default)]
    variations: BTreeMap<String, Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    static_variations: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariationTable {
    dynamic: BTreeMap<String, Vec<String>>,
    static_slots: Vec<String>,
}

fn capped(letter: &str, mut slots: Vec<String>) -> Vec<String> {
    if slots.len() > MAX_VARIATIONS {
        warn!(letter, count = slots.len(), "too many variations, keeping the first seven");
        slots.truncate(MAX_VARIATIONS);
    }
    slots
}

fn trim_trailing(slots: &mut Vec<String>) {
    while slots.last().is_some_and(|s| s.is_empty()) {
        slots.pop();
    }
}

fn set_in(slots: &mut Vec<String>, index: usize, value: &str) -> bool {
    if index >= MAX_VARIATIONS {
        return false;
    }
    if slots.len() <= index {
        slots.resize(index + 1, String::new());
    }
    slots[index] = value.to_string();
    true
}

fn move_in(slots: &mut Vec<String>, from: usize, to: usize) -> bool {
    if from >= slots.len() {
        return false;
    }
    let target = to.min(slots.len() - 1).min(MAX_VARIATIONS - 1);
    let entry = slots.remove(from);
    slots.insert(target, entry);
    true
}

impl VariationTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let file: VariationFile =
            serde_json::from_str(json).map_err(|e| Error::parse(VARIATIONS_FILE, e))?;
        let mut table = Self::new();
        for (letter, slots) in file.variations {
            let slots = capped(&letter, slots);
            table.dynamic.insert(letter, slots);
        }
        table.static_slots = capped("static", file.static_variations.unwrap_or_default());
        Ok(table)
    }

    /// Serialize with trailing holes trimmed and empty letters dropped.
    pub fn to_json(&self) -> Result<String> {
        let trimmed = self.trimmed();
        let file = VariationFile {
            variations: trimmed.dynamic,
            static_variations: Some(trimmed.static_slots),
        };
        serde_json::to_string_pretty(&file).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// The table as it will look after a save.
    pub fn trimmed(&self) -> Self {
        let mut table = self.clone();
        for slots in table.dynamic.values_mut() {
            trim_trailing(slots);
        }
        table.dynamic.retain(|_, slots| !slots.is_empty());
        trim_trailing(&mut table.static_slots);
        table
    }

    /// Ordered candidates for `letter` (case-sensitive), holes skipped.
    /// Static mode ignores `letter` and returns the utility row.
    pub fn variants_for(&self, letter: &str, mode: VariationMode) -> Vec<String> {
        let slots = match mode {
            VariationMode::Dynamic => self.dynamic.get(letter).map(Vec::as_slice).unwrap_or(&[]),
            VariationMode::Static => self.static_slots.as_slice(),
        };
        slots
            .iter()
            .filter(|s| !s.is_empty())
            .take(MAX_VARIATIONS)
            .cloned()
            .collect()
    }

    /// Raw slots for `letter`, holes included.
    pub fn slots(&self, letter: &str) -> &[String] {
        self.dynamic.get(letter).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn static_slots(&self) -> &[String] {
        &self.static_slots
    }

    pub fn letters(&self) -> impl Iterator<Item = &str> {
        self.dynamic.keys().map(String::as_str)
    }

    /// Write slot `index` for `letter`. An empty value leaves a hole.
    /// Returns `false` when `index` is outside the seven-slot bound.
    pub fn set_slot(&mut self, letter: &str, index: usize, value: &str) -> bool {
        let slots = self.dynamic.entry(letter.to_string()).or_default();
        set_in(slots, index, value)
    }

    pub fn set_static_slot(&mut self, index: usize, value: &str) -> bool {
        set_in(&mut self.static_slots, index, value)
    }

    /// Move one entry to `to`, clamped to the list bounds.
    pub fn move_entry(&mut self, letter: &str, from: usize, to: usize) -> bool {
        match self.dynamic.get_mut(letter) {
            Some(slots) => move_in(slots, from, to),
            None => false,
        }
    }

    pub fn move_static_entry(&mut self, from: usize, to: usize) -> bool {
        move_in(&mut self.static_slots, from, to)
    }

    pub fn set_letter(&mut self, letter: &str, slots: Vec<String>) {
        let slots = capped(letter, slots);
        self.dynamic.insert(letter.to_string(), slots);
    }

    pub fn remove_letter(&mut self, letter: &str) -> bool {
        self.dynamic.remove(letter).is_some()
    }

    /// Replace entries per letter with `custom`. The custom static row wins
    /// when present.
    fn overlay(mut self, custom: VariationTable, custom_has_static: bool) -> Self {
        for (letter, slots) in custom.dynamic {
            self.dynamic.insert(letter, slots);
        }
        if custom_has_static {
            self.static_slots = custom.static_slots;
        }
        self
    }

    /// Load bundled defaults with the custom file layered on top. A broken
    /// file in either tier degrades to an empty contribution.
    pub fn load(source: &LayeredSource) -> Self {
        let bundled = match source.bundled().read_string(VARIATIONS_FILE) {
            Ok(Some(json)) => Self::from_json(&json).unwrap_or_else(|e| {
                warn!(error = %e, "bundled variations unusable");
                Self::new()
            }),
            Ok(None) => Self::new(),
            Err(e) => {
                warn!(error = %e, "cannot read bundled variations");
                Self::new()
            }
        };
        let custom_json = match source.custom().read_string(VARIATIONS_FILE) {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, "cannot read custom variations");
                None
            }
        };
        let Some(json) = custom_json else {
            return bundled;
        };
        let has_static = serde_json::from_str::<VariationFile>(&json)
            .map(|f| f.static_variations.is_some())
            .unwrap_or(false);
        match Self::from_json(&json) {
            Ok(custom) => bundled.overlay(custom, has_static),
            Err(e) => {
                warn!(error = %e, "custom variations unusable, using bundled defaults");
                bundled
            }
        }
    }

    /// Write the table to the custom tier.
    pub fn save(&self, source: &LayeredSource) -> Result<()> {
        let json = self.to_json()?;
        source.custom().write(VARIATIONS_FILE, json.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config_source::MemorySource;
    use std::sync::Arc;

    const BUNDLED: &str = r#"{
        "variations": {"e": ["è", "é", "ê"], "a": ["à", "á"]},
        "staticVariations": ["€", "@"]
    }"#;

    fn source(custom: MemorySource) -> LayeredSource {
        let bundled = MemorySource::new("bundled").with_file(VARIATIONS_FILE, BUNDLED);
        LayeredSource::new(Arc::new(custom), Arc::new(bundled))
    }

    #[test]
    fn variants_never_exceed_seven() {
        let json = r#"{"variations": {"o": ["1","2","3","4","5","6","7","8","9"]}}"#;
        let mut table = VariationTable::from_json(json).unwrap();
        assert_eq!(table.variants_for("o", VariationMode::Dynamic).len(), 7);
        assert!(!table.set_slot("o", 7, "x"));
    }

    #[test]
    fn dynamic_is_case_sensitive_and_static_ignores_letter() {
        let table = VariationTable::from_json(BUNDLED).unwrap();
        assert_eq!(table.variants_for("e", VariationMode::Dynamic), vec!["è", "é", "ê"]);
        assert!(table.variants_for("E", VariationMode::Dynamic).is_empty());
        assert_eq!(table.variants_for("zzz", VariationMode::Static), vec!["€", "@"]);
    }

    #[test]
    fn emptied_slot_is_a_hole_and_only_trailing_holes_are_trimmed() {
        let mut table = VariationTable::from_json(BUNDLED).unwrap();
        table.set_slot("e", 0, "");
        table.set_slot("e", 2, "");
        assert_eq!(table.slots("e"), &["", "é", ""]);
        assert_eq!(table.variants_for("e", VariationMode::Dynamic), vec!["é"]);
        let reloaded = VariationTable::from_json(&table.to_json().unwrap()).unwrap();
        assert_eq!(reloaded.slots("e"), &["", "é"]);
    }

    #[test]
    fn move_clamps_target() {
        let mut table = VariationTable::from_json(BUNDLED).unwrap();
        assert!(table.move_entry("e", 0, 99));
        assert_eq!(table.slots("e"), &["é", "ê", "è"]);
        assert!(!table.move_entry("e", 5, 0));
        assert!(table.move_static_entry(1, 0));
        assert_eq!(table.static_slots(), &["@", "€"]);
    }

    #[test]
    fn custom_replaces_per_letter() {
        let custom = MemorySource::new("custom")
            .with_file(VARIATIONS_FILE, r#"{"variations": {"e": ["ë"]}}"#);
        let table = VariationTable::load(&source(custom));
        assert_eq!(table.variants_for("e", VariationMode::Dynamic), vec!["ë"]);
        assert_eq!(table.variants_for("a", VariationMode::Dynamic), vec!["à", "á"]);
        assert_eq!(table.static_slots(), &["€", "@"]);
    }

    #[test]
    fn save_then_load_round_trips() {
        let src = source(MemorySource::new("custom"));
        let mut table = VariationTable::load(&src);
        table.set_slot("u", 0, "ù");
        table.set_slot("u", 1, "👍🏽");
        table.set_static_slot(2, "§");
        table.save(&src).unwrap();
        assert_eq!(VariationTable::load(&src), table.trimmed());
        assert_eq!(table.trimmed(), table);
    }

    #[test]
    fn broken_custom_file_falls_back() {
        let custom = MemorySource::new("custom").with_file(VARIATIONS_FILE, "[1,2");
        let table = VariationTable::load(&source(custom));
        assert_eq!(table.variants_for("e", VariationMode::Dynamic).len(), 3);
    }
}
