//! Nav-mode remapping.
//!
//! While the navigation modifier is held, letter keys can be remapped to a
//! navigation keycode or a named editor action. The table lives in
//! `ctrl_mappings.json`:
//!
//! ```json
//! { "mappings": {
//!     "Q": {"type": "keycode", "keycode": "DPAD_UP"},
//!     "C": {"type": "action", "action": "copy"},
//!     "P": {"type": "none"} } }
//! ```
//!
//! `value` is accepted as an alias for both `keycode` and `action`.

use crate::config_source::{ConfigSource, LayeredSource, CTRL_MAPPINGS_FILE};
use crate::error::{Error, Result};
use crate::keycode::Keycode;
use crate::text_field::EditorAction;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CtrlMapping {
    Keycode {
        #[serde(alias = "value")]
        keycode: Keycode,
    },
    Action {
        #[serde(alias = "value")]
        action: EditorAction,
    },
    #[default]
    None,
}

impl CtrlMapping {
    pub fn is_none(&self) -> bool {
        matches!(self, CtrlMapping::None)
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct MappingFile<T> {
    #[serde(default)]
    mappings: BTreeMap<String, T>,
}

/// Per-key nav-mode table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NavTable {
    mappings: BTreeMap<Keycode, CtrlMapping>,
}

impl NavTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a mapping document. Entries with unknown keys or malformed
    /// values are skipped individually.
    pub fn from_json(json: &str) -> Result<Self> {
        let file: MappingFile<serde_json::Value> =
            serde_json::from_str(json).map_err(|e| Error::parse(CTRL_MAPPINGS_FILE, e))?;
        let mut table = Self::new();
        for (name, value) in file.mappings {
            let Some(keycode) = Keycode::from_name(&name) else {
                warn!(key = %name, "unknown key in nav mappings, ignoring");
                continue;
            };
            match serde_json::from_value::<CtrlMapping>(value) {
                Ok(mapping) => {
                    table.mappings.insert(keycode, mapping);
                }
                Err(e) => warn!(key = %name, error = %e, "malformed nav mapping, ignoring"),
            }
        }
        Ok(table)
    }

    pub fn to_json(&self) -> Result<String> {
        let file = MappingFile {
            mappings: self
                .mappings
                .iter()
                .map(|(kc, m)| (kc.name().to_string(), *m))
                .collect(),
        };
        serde_json::to_string_pretty(&file).map_err(|e| Error::Serialization(e.to_string()))
    }

    pub fn get(&self, keycode: Keycode) -> Option<CtrlMapping> {
        self.mappings.get(&keycode).copied()
    }

    pub fn set(&mut self, keycode: Keycode, mapping: CtrlMapping) {
        self.mappings.insert(keycode, mapping);
    }

    pub fn remove(&mut self, keycode: Keycode) -> Option<CtrlMapping> {
        self.mappings.remove(&keycode)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Keycode, CtrlMapping)> + '_ {
        self.mappings.iter().map(|(k, m)| (*k, *m))
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    /// Bundled table with custom entries replacing bundled ones per key.
    pub fn load(source: &LayeredSource) -> Self {
        let mut table = read_table(source.bundled()).unwrap_or_default();
        if let Some(custom) = read_table(source.custom()) {
            table.mappings.extend(custom.mappings);
        }
        table
    }
}

fn read_table<S: ConfigSource + ?Sized>(tier: &S) -> Option<NavTable> {
    match tier.read_string(CTRL_MAPPINGS_FILE) {
        Ok(Some(json)) => match NavTable::from_json(&json) {
            Ok(table) => Some(table),
            Err(e) => {
                warn!(source = tier.label(), error = %e, "nav mappings unusable, ignoring file");
                None
            }
        },
        Ok(None) => None,
        Err(e) => {
            warn!(source = tier.label(), error = %e, "cannot read nav mappings");
            None
        }
    }
}

/// Custom table for an edit. A malformed file fails the edit instead of
/// being replaced.
fn read_custom_table(source: &LayeredSource) -> Result<NavTable> {
    match source.custom().read_string(CTRL_MAPPINGS_FILE)? {
        Some(json) => NavTable::from_json(&json),
        None => Ok(NavTable::new()),
    }
}

/// Read-only remapper over a loaded table.
#[derive(Debug, Clone, Default)]
pub struct NavModeRemapper {
    table: NavTable,
}

impl NavModeRemapper {
    pub fn new(table: NavTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &NavTable {
        &self.table
    }

    /// Configured mapping for `keycode`; `None` when absent.
    pub fn remap(&self, keycode: Keycode) -> CtrlMapping {
        self.table.get(keycode).unwrap_or_default()
    }

    /// Store a custom mapping for one key.
    pub fn set_custom_mapping(
        source: &LayeredSource,
        keycode: Keycode,
        mapping: CtrlMapping,
    ) -> Result<()> {
        let mut custom = read_custom_table(source)?;
        custom.set(keycode, mapping);
        source
            .custom()
            .write(CTRL_MAPPINGS_FILE, custom.to_json()?.as_bytes())
    }

    /// Reset one key to its bundled mapping: the bundled entry overwrites the
    /// custom one, or the custom entry is dropped when there is no bundled
    /// entry. Returns the mapping now in effect.
    pub fn revert_to_default(source: &LayeredSource, keycode: Keycode) -> Result<CtrlMapping> {
        let bundled = read_table(source.bundled())
            .and_then(|t| t.get(keycode));
        let mut custom = read_custom_table(source)?;
        match bundled {
            Some(mapping) => custom.set(keycode, mapping),
            None => {
                custom.remove(keycode);
            }
        }
        source
            .custom()
            .write(CTRL_MAPPINGS_FILE, custom.to_json()?.as_bytes())?;
        Ok(bundled.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config_source::MemorySource;
    use std::sync::Arc;

    const BUNDLED: &str = r#"{"mappings": {
        "Q": {"type": "keycode", "value": "DPAD_UP"},
        "C": {"type": "action", "action": "copy"}
    }}"#;

    fn source(custom: MemorySource) -> LayeredSource {
        let bundled = MemorySource::new("bundled").with_file(CTRL_MAPPINGS_FILE, BUNDLED);
        LayeredSource::new(Arc::new(custom), Arc::new(bundled))
    }

    #[test]
    fn parses_tagged_mappings() {
        let table = NavTable::from_json(BUNDLED).unwrap();
        assert_eq!(
            table.get(Keycode::Q),
            Some(CtrlMapping::Keycode {
                keycode: Keycode::DpadUp
            })
        );
        assert_eq!(
            table.get(Keycode::C),
            Some(CtrlMapping::Action {
                action: EditorAction::Copy
            })
        );
    }

    #[test]
    fn absent_keys_are_none() {
        let remapper = NavModeRemapper::new(NavTable::from_json(BUNDLED).unwrap());
        assert_eq!(remapper.remap(Keycode::P), CtrlMapping::None);
    }

    #[test]
    fn malformed_entries_are_isolated() {
        let json = r#"{"mappings": {
            "Q": {"type": "teleport"},
            "NOT_A_KEY": {"type": "none"},
            "W": {"type": "keycode", "keycode": "DPAD_DOWN"}
        }}"#;
        let table = NavTable::from_json(json).unwrap();
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn custom_overrides_and_revert() {
        let src = source(MemorySource::new("custom"));
        NavModeRemapper::set_custom_mapping(&src, Keycode::Q, CtrlMapping::None).unwrap();
        NavModeRemapper::set_custom_mapping(
            &src,
            Keycode::Z,
            CtrlMapping::Action {
                action: EditorAction::Undo,
            },
        )
        .unwrap();
        let table = NavTable::load(&src);
        assert_eq!(table.get(Keycode::Q), Some(CtrlMapping::None));
        assert!(table.get(Keycode::C).is_some());

        let restored = NavModeRemapper::revert_to_default(&src, Keycode::Q).unwrap();
        assert_eq!(
            restored,
            CtrlMapping::Keycode {
                keycode: Keycode::DpadUp
            }
        );
        assert_eq!(
            NavModeRemapper::revert_to_default(&src, Keycode::Z).unwrap(),
            CtrlMapping::None
        );
        let table = NavTable::load(&src);
        assert_eq!(table.get(Keycode::Q), Some(restored));
        assert_eq!(table.get(Keycode::Z), None);
    }

    #[test]
    fn malformed_custom_file_blocks_edits() {
        let src = source(MemorySource::new("custom").with_file(CTRL_MAPPINGS_FILE, "{ broken"));
        assert!(matches!(
            NavModeRemapper::set_custom_mapping(&src, Keycode::W, CtrlMapping::None),
            Err(Error::ConfigParse { .. })
        ));
        assert!(matches!(
            NavModeRemapper::revert_to_default(&src, Keycode::Q),
            Err(Error::ConfigParse { .. })
        ));
        assert_eq!(
            src.custom().read_string(CTRL_MAPPINGS_FILE).unwrap().as_deref(),
            Some("{ broken")
        );
    }

    #[test]
    fn json_round_trip() {
        let table = NavTable::from_json(BUNDLED).unwrap();
        assert_eq!(NavTable::from_json(&table.to_json().unwrap()).unwrap(), table);
    }
}
