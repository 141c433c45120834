//! Keycode + shift state → output lookup against the active layout.

use crate::keycode::Keycode;
use crate::layout::{KeyMapping, LayoutDefinition};
use std::sync::Arc;

/// A key resolved against the active layout for one key event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedKey {
    pub keycode: Keycode,
    pub mapping: KeyMapping,
    /// Effective shift (shift held xor caps lock).
    pub upper: bool,
}

impl ResolvedKey {
    /// Output for a single (non-cycling) press.
    pub fn text(&self) -> &str {
        self.mapping.text(self.upper)
    }

    pub fn cycles(&self) -> bool {
        self.mapping.cycles()
    }

    pub fn tap_count(&self) -> usize {
        self.mapping.taps.len()
    }

    pub fn tap_text(&self, index: usize) -> Option<&str> {
        self.mapping.tap_text(index, self.upper)
    }
}

/// Pure lookup over a loaded layout. Without a layout every letter resolves
/// to its identity mapping.
#[derive(Debug, Clone, Default)]
pub struct LayoutResolver {
    active: Option<Arc<LayoutDefinition>>,
}

impl LayoutResolver {
    pub fn new(active: Option<Arc<LayoutDefinition>>) -> Self {
        Self { active }
    }

    pub fn layout_name(&self) -> Option<&str> {
        self.active.as_deref().map(|l| l.name.as_str())
    }

    /// Resolve a supported letter key. Non-letter keys return `None` and are
    /// left to the platform.
    pub fn resolve(&self, keycode: Keycode, upper: bool) -> Option<ResolvedKey> {
        if !keycode.is_letter() {
            return None;
        }
        let mapping = self
            .active
            .as_deref()
            .and_then(|layout| layout.get(keycode))
            .cloned()
            .or_else(|| KeyMapping::identity(keycode))?;
        Some(ResolvedKey {
            keycode,
            mapping,
            upper,
        })
    }

    /// Resolve a raw platform code. Unsupported codes return `None`.
    pub fn resolve_code(&self, code: u16, upper: bool) -> Option<ResolvedKey> {
        Keycode::from_code(code).and_then(|kc| self.resolve(kc, upper))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::TapMapping;

    fn demo_layout() -> Arc<LayoutDefinition> {
        let mut layout = LayoutDefinition::new("demo");
        layout.mappings.insert(Keycode::Q, KeyMapping::simple("a", "A"));
        layout.mappings.insert(
            Keycode::E,
            KeyMapping::multi_tap(
                "e",
                "E",
                vec![TapMapping::new("e", "E"), TapMapping::new("è", "È")],
            ),
        );
        Arc::new(layout)
    }

    #[test]
    fn resolves_from_layout_with_shift() {
        let resolver = LayoutResolver::new(Some(demo_layout()));
        assert_eq!(resolver.resolve(Keycode::Q, false).unwrap().text(), "a");
        assert_eq!(resolver.resolve(Keycode::Q, true).unwrap().text(), "A");
        let e = resolver.resolve(Keycode::E, true).unwrap();
        assert!(e.cycles());
        assert_eq!(e.tap_text(1), Some("È"));
        assert_eq!(e.tap_text(2), Some("E"));
    }

    #[test]
    fn keys_missing_from_layout_resolve_to_identity_repeatably() {
        let resolver = LayoutResolver::new(Some(demo_layout()));
        let first = resolver.resolve(Keycode::Z, false).unwrap();
        let second = resolver.resolve(Keycode::Z, false).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.text(), "z");
        assert!(!first.cycles());
    }

    #[test]
    fn no_layout_means_identity() {
        let resolver = LayoutResolver::default();
        assert_eq!(resolver.resolve(Keycode::B, true).unwrap().text(), "B");
    }

    #[test]
    fn unsupported_keys_pass_through() {
        let resolver = LayoutResolver::new(Some(demo_layout()));
        assert_eq!(resolver.resolve(Keycode::Space, false), None);
        assert_eq!(resolver.resolve_code(999, false), None);
    }
}
