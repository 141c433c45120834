//! Key-event pipeline with session management.
//!
//! `Pipeline::process_key` runs one platform key event through the stages in
//! order: nav-mode remapping (modifier held), layout resolution, multi-tap
//! sequencing, and correction at word boundaries. Keys the pipeline does not
//! own come back as `KeyResult::NotHandled` for the host's default handling.
//!
//! Configuration is read from one `ConfigSnapshot` per event and from a fresh
//! copy of the settings, so a reload or settings edit never changes the
//! tables halfway through an event.

use crate::engine::CorrectionEngine;
use crate::keycode::Keycode;
use crate::multitap::Clock;
use crate::nav::CtrlMapping;
use crate::resolver::LayoutResolver;
use crate::session::{AppliedCorrection, Session};
use crate::settings::{SettingsStore, VariationMode};
use crate::snapshot::{ConfigLoader, ConfigSnapshot, ReloadMode, SnapshotHandle};
use crate::text_field::{word_before_cursor, TextField};
use crate::userdict::UserDict;
use crate::candidate::Suggestion;
use crate::corrections::LanguageCorrectionSet;
use crate::Config;
use std::sync::Arc;
use tracing::debug;

/// Modifier state accompanying a key event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modifiers {
    pub shift: bool,
    pub caps_lock: bool,
    /// The nav-mode modifier (Ctrl on most hardware).
    pub ctrl: bool,
    pub alt: bool,
}

/// A key-down event from the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub code: u16,
    pub modifiers: Modifiers,
}

impl KeyEvent {
    pub fn new(code: u16) -> Self {
        Self {
            code,
            modifiers: Modifiers::default(),
        }
    }

    pub fn key(keycode: Keycode) -> Self {
        Self::new(keycode.code())
    }

    pub fn shifted(mut self) -> Self {
        self.modifiers.shift = true;
        self
    }

    pub fn with_caps_lock(mut self) -> Self {
        self.modifiers.caps_lock = true;
        self
    }

    pub fn with_ctrl(mut self) -> Self {
        self.modifiers.ctrl = true;
        self
    }

    pub fn with_alt(mut self) -> Self {
        self.modifiers.alt = true;
        self
    }

    /// Shift and caps lock cancel each other out.
    pub fn is_upper(&self) -> bool {
        self.modifiers.shift ^ self.modifiers.caps_lock
    }
}

/// Result of processing a key event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyResult {
    /// Key was handled by the pipeline
    Handled,
    /// Key was not handled (pass through to application)
    NotHandled,
}

/// Per-session pipeline.
///
/// Owns the session state and a correction engine; shares the snapshot
/// handle, settings and personal dictionary with the rest of the process.
pub struct Pipeline {
    snapshots: Arc<SnapshotHandle>,
    loader: Arc<ConfigLoader>,
    settings: Arc<SettingsStore>,
    engine: CorrectionEngine,
    clock: Arc<dyn Clock>,
    reload_mode: ReloadMode,
    session: Session,
}

impl Pipeline {
    pub fn new(
        snapshots: Arc<SnapshotHandle>,
        loader: Arc<ConfigLoader>,
        settings: Arc<SettingsStore>,
        userdict: UserDict,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let window = settings.current().multitap_window_ms;
        Self {
            snapshots,
            loader,
            settings,
            engine: CorrectionEngine::new(userdict),
            clock,
            reload_mode: ReloadMode::default(),
            session: Session::new(window),
        }
    }

    /// Build snapshots inline at safe points instead of in the background.
    pub fn with_reload_mode(mut self, mode: ReloadMode) -> Self {
        self.reload_mode = mode;
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn engine(&self) -> &CorrectionEngine {
        &self.engine
    }

    pub fn settings(&self) -> &Arc<SettingsStore> {
        &self.settings
    }

    /// The snapshot the next event will use.
    pub fn snapshot(&self) -> Arc<ConfigSnapshot> {
        self.snapshots.current()
    }

    /// Reset the session, e.g. on focus change.
    pub fn reset(&mut self) {
        self.session.clear();
    }

    /// Safe point: between events, request a reload if the config version
    /// moved and drop caches built from an older snapshot.
    fn safe_point(&mut self) -> (Arc<ConfigSnapshot>, Config) {
        self.snapshots.refresh_if_stale(&self.loader, self.reload_mode);
        let snapshot = self.snapshots.current();
        if self.session.observe_version(snapshot.version) {
            debug!(version = snapshot.version, "pipeline picked up new snapshot");
            self.engine.clear_cache();
        }
        let config = self.settings.current();
        self.session.sequencer.set_window_ms(config.multitap_window_ms);
        (snapshot, config)
    }

    /// Handle one key-down event against `field`.
    pub fn process_key(&mut self, event: KeyEvent, field: &mut dyn TextField) -> KeyResult {
        let (snapshot, config) = self.safe_point();
        let now = self.clock.now_ms();
        self.session.sequencer.expire(now);

        let Some(keycode) = Keycode::from_code(event.code) else {
            debug!(code = event.code, "unsupported keycode passed through");
            self.session.clear();
            return KeyResult::NotHandled;
        };

        if event.modifiers.ctrl {
            self.session.clear();
            if !config.nav_mode_enabled {
                return KeyResult::NotHandled;
            }
            return self.remap(&snapshot, keycode, field);
        }
        if event.modifiers.alt {
            self.session.clear();
            return KeyResult::NotHandled;
        }

        match keycode {
            Keycode::Space | Keycode::Enter => {
                self.session.sequencer.reset();
                self.boundary(&snapshot, &config, keycode, field)
            }
            Keycode::Del => {
                self.session.sequencer.reset();
                if self.revert_correction(field) {
                    KeyResult::Handled
                } else {
                    KeyResult::NotHandled
                }
            }
            kc if kc.is_letter() => self.letter(&snapshot, &config, kc, event.is_upper(), now, field),
            _ => {
                self.session.clear();
                KeyResult::NotHandled
            }
        }
    }

    fn remap(
        &mut self,
        snapshot: &ConfigSnapshot,
        keycode: Keycode,
        field: &mut dyn TextField,
    ) -> KeyResult {
        match snapshot.nav.remap(keycode) {
            CtrlMapping::Keycode { keycode: target } => {
                debug!(from = %keycode, to = %target, "nav remap to key");
                field.send_key(target);
                KeyResult::Handled
            }
            CtrlMapping::Action { action } => {
                debug!(from = %keycode, %action, "nav remap to action");
                field.perform_action(action);
                KeyResult::Handled
            }
            CtrlMapping::None => KeyResult::NotHandled,
        }
    }

    fn letter(
        &mut self,
        snapshot: &ConfigSnapshot,
        config: &Config,
        keycode: Keycode,
        upper: bool,
        now: u64,
        field: &mut dyn TextField,
    ) -> KeyResult {
        let active = snapshot
            .layouts
            .active(config.layout.as_deref(), &config.locale);
        let resolver = LayoutResolver::new(active);
        let Some(key) = resolver.resolve(keycode, upper) else {
            return KeyResult::NotHandled;
        };
        self.session.forget_correction();
        self.session.sequencer.on_other_key(keycode);
        if key.cycles() {
            self.session.sequencer.press(&key, now, field);
        } else {
            self.session.sequencer.reset();
            field.commit_text(key.text());
        }
        KeyResult::Handled
    }

    fn boundary(
        &mut self,
        snapshot: &ConfigSnapshot,
        config: &Config,
        keycode: Keycode,
        field: &mut dyn TextField,
    ) -> KeyResult {
        self.session.forget_correction();
        let separator = if keycode == Keycode::Space { " " } else { "\n" };

        let word = word_before_cursor(field);
        if !word.is_empty() && field.input_purpose().allows_correction() {
            let sets = language_sets(snapshot, config);
            if let Some(replacement) =
                self.engine
                    .apply_boundary_correction(&word, &sets, &config.correction)
            {
                let end = field.cursor();
                let start = end.saturating_sub(word.chars().count());
                field.replace_range(start, end, &replacement);
                debug!(original = %word, %replacement, "boundary correction applied");
                self.session.record_correction(AppliedCorrection {
                    original: word,
                    replacement,
                    start,
                    separator: separator.to_string(),
                });
            }
        }

        if keycode == Keycode::Space {
            field.commit_text(separator);
            KeyResult::Handled
        } else {
            KeyResult::NotHandled
        }
    }

    fn revert_correction(&mut self, field: &mut dyn TextField) -> bool {
        let Some(correction) = self.session.take_correction() else {
            return false;
        };
        if !correction.is_intact(field) {
            return false;
        }
        debug!(original = %correction.original, "auto-correction reverted");
        correction.revert(field);
        true
    }

    /// The host reports a cursor position. Moves the pipeline did not cause
    /// end the multi-tap cycle and the revert window.
    pub fn notify_selection_changed(&mut self, cursor: usize) {
        self.session.sequencer.on_cursor_moved(cursor);
        if let Some(correction) = self.session.last_correction() {
            if correction.expected_cursor() != cursor {
                self.session.forget_correction();
            }
        }
    }

    /// Ranked suggestions for the word before the cursor.
    pub fn suggestions(&mut self, field: &dyn TextField) -> Vec<Suggestion> {
        let (snapshot, config) = self.safe_point();
        if !field.input_purpose().allows_correction() {
            return Vec::new();
        }
        let word = word_before_cursor(field);
        let sets = language_sets(&snapshot, &config);
        self.engine.suggest(&word, &sets, &config.correction)
    }

    /// Replace the word before the cursor with `word`.
    pub fn apply_suggestion(&mut self, field: &mut dyn TextField, word: &str) -> bool {
        let typed = word_before_cursor(field);
        if typed.is_empty() {
            return false;
        }
        self.session.clear();
        let end = field.cursor();
        let start = end.saturating_sub(typed.chars().count());
        field.replace_range(start, end, word);
        true
    }

    /// Variants offered at the cursor: for the letter before it in dynamic
    /// mode, the utility row in static mode.
    pub fn variants_at_cursor(&mut self, field: &dyn TextField) -> Vec<String> {
        let (snapshot, config) = self.safe_point();
        match config.variation_mode {
            VariationMode::Dynamic => match letter_before_cursor(field) {
                Some(letter) => snapshot
                    .variations
                    .variants_for(&letter, VariationMode::Dynamic),
                None => Vec::new(),
            },
            VariationMode::Static => snapshot.variations.variants_for("", VariationMode::Static),
        }
    }

    /// Apply a chosen variant: dynamic mode replaces the letter before the
    /// cursor, static mode inserts at the cursor.
    pub fn apply_variant(&mut self, field: &mut dyn TextField, variant: &str) -> bool {
        let (_, config) = self.safe_point();
        self.session.clear();
        match config.variation_mode {
            VariationMode::Dynamic => {
                if letter_before_cursor(field).is_none() {
                    return false;
                }
                let end = field.cursor();
                field.replace_range(end - 1, end, variant);
                true
            }
            VariationMode::Static => {
                field.commit_text(variant);
                true
            }
        }
    }

    /// Add a word to the personal dictionary.
    pub fn add_to_dictionary(&self, word: &str) {
        self.engine.add_to_personal(word);
    }
}

fn letter_before_cursor(field: &dyn TextField) -> Option<String> {
    if field.cursor() == 0 {
        return None;
    }
    field
        .text_before_cursor(1)
        .chars()
        .next()
        .filter(|c| c.is_alphabetic())
        .map(String::from)
}

/// Correction sets for the enabled languages, active language first.
fn language_sets(snapshot: &ConfigSnapshot, config: &Config) -> Vec<Arc<LanguageCorrectionSet>> {
    let available = snapshot.available_languages();
    config
        .enabled()
        .resolve(config.language(), &available)
        .iter()
        .filter_map(|lang| snapshot.language(lang).cloned())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config_source::{ConfigVersion, LayeredSource, MemorySource};
    use crate::memory_field::MemoryTextField;
    use crate::multitap::ManualClock;
    use crate::text_field::{EditorAction, InputPurpose};

    const MULTITAP_LAYOUT: &str = r#"{
        "name": "tap",
        "mappings": {
            "Q": {
                "lowercase": "a", "uppercase": "A", "multiTapEnabled": true,
                "taps": [
                    {"lowercase": "a", "uppercase": "A"},
                    {"lowercase": "b", "uppercase": "B"},
                    {"lowercase": "c", "uppercase": "C"}
                ]
            }
        }
    }"#;

    struct Harness {
        pipeline: Pipeline,
        clock: Arc<ManualClock>,
        settings: Arc<SettingsStore>,
    }

    fn harness(config: Config) -> Harness {
        let bundled = MemorySource::new("bundled")
            .with_file("layouts/tap.json", MULTITAP_LAYOUT)
            .with_file(
                "ctrl_mappings.json",
                r#"{"mappings": {
                    "H": {"type": "keycode", "keycode": "DPAD_LEFT"},
                    "C": {"type": "action", "action": "copy"}
                }}"#,
            )
            .with_file(
                "variations.json",
                r#"{"variations": {"e": ["è", "é"]}, "staticVariations": ["€", "£"]}"#,
            )
            .with_file("corrections/en.json", r#"{"teh": "the"}"#)
            .with_file(
                "dictionaries/en_base.json",
                r#"[{"w": "the", "f": 100}, {"w": "world", "f": 50}, {"w": "word", "f": 80}]"#,
            );
        let source = LayeredSource::new(Arc::new(MemorySource::new("custom")), Arc::new(bundled));
        let version = Arc::new(ConfigVersion::new());
        let settings = Arc::new(SettingsStore::new(config, version.clone()));
        let snapshots = Arc::new(SnapshotHandle::new(version));
        let clock = Arc::new(ManualClock::new(1_000));
        let pipeline = Pipeline::new(
            snapshots,
            Arc::new(ConfigLoader::new(source)),
            settings.clone(),
            UserDict::new_in_memory(),
            clock.clone(),
        )
        .with_reload_mode(ReloadMode::Inline);
        Harness {
            pipeline,
            clock,
            settings,
        }
    }

    fn type_word(h: &mut Harness, field: &mut MemoryTextField, word: &str) {
        for c in word.chars() {
            let kc = Keycode::from_letter(c).unwrap();
            let mut event = KeyEvent::key(kc);
            if c.is_uppercase() {
                event = event.shifted();
            }
            assert_eq!(h.pipeline.process_key(event, field), KeyResult::Handled);
        }
    }

    #[test]
    fn letters_follow_shift_and_caps() {
        let mut h = harness(Config::default());
        let mut field = MemoryTextField::new();
        type_word(&mut h, &mut field, "Hi");
        let caps = KeyEvent::key(Keycode::A).with_caps_lock();
        h.pipeline.process_key(caps, &mut field);
        h.pipeline.process_key(caps.shifted(), &mut field);
        assert_eq!(field.text(), "HiAa");
    }

    #[test]
    fn multitap_cycles_within_window() {
        let config = Config {
            layout: Some("tap".into()),
            ..Config::default()
        };
        let mut h = harness(config);
        let mut field = MemoryTextField::new();
        let q = KeyEvent::key(Keycode::Q);
        h.pipeline.process_key(q, &mut field);
        h.clock.advance(100);
        h.pipeline.process_key(q, &mut field);
        assert_eq!(field.text(), "b");
        h.clock.advance(401);
        h.pipeline.process_key(q, &mut field);
        assert_eq!(field.text(), "ba");
    }

    #[test]
    fn space_applies_exact_correction_and_backspace_reverts() {
        let mut h = harness(Config::default());
        let mut field = MemoryTextField::new();
        type_word(&mut h, &mut field, "Teh");
        assert_eq!(
            h.pipeline.process_key(KeyEvent::key(Keycode::Space), &mut field),
            KeyResult::Handled
        );
        assert_eq!(field.text(), "The ");
        assert_eq!(
            h.pipeline.process_key(KeyEvent::key(Keycode::Del), &mut field),
            KeyResult::Handled
        );
        assert_eq!(field.text(), "Teh ");
        // A second backspace is the host's.
        assert_eq!(
            h.pipeline.process_key(KeyEvent::key(Keycode::Del), &mut field),
            KeyResult::NotHandled
        );
    }

    #[test]
    fn enter_corrects_then_passes_through() {
        let mut h = harness(Config::default());
        let mut field = MemoryTextField::new();
        type_word(&mut h, &mut field, "wrold");
        assert_eq!(
            h.pipeline.process_key(KeyEvent::key(Keycode::Enter), &mut field),
            KeyResult::NotHandled
        );
        assert_eq!(field.text(), "world");
    }

    #[test]
    fn password_fields_are_never_corrected() {
        let mut h = harness(Config::default());
        let mut field = MemoryTextField::new().with_purpose(InputPurpose::Password);
        type_word(&mut h, &mut field, "teh");
        h.pipeline.process_key(KeyEvent::key(Keycode::Space), &mut field);
        assert_eq!(field.text(), "teh ");
        assert!(h.pipeline.suggestions(&field).is_empty());
    }

    #[test]
    fn nav_mode_remaps_and_can_be_disabled() {
        let mut h = harness(Config::default());
        let mut field = MemoryTextField::with_text("ab");
        let ctrl_h = KeyEvent::key(Keycode::H).with_ctrl();
        assert_eq!(h.pipeline.process_key(ctrl_h, &mut field), KeyResult::Handled);
        assert_eq!(field.cursor(), 1);
        assert_eq!(field.sent_keys(), &[Keycode::DpadLeft]);

        let ctrl_c = KeyEvent::key(Keycode::C).with_ctrl();
        field.set_selection(0, 2);
        assert_eq!(h.pipeline.process_key(ctrl_c, &mut field), KeyResult::Handled);
        assert_eq!(field.clipboard(), "ab");

        let ctrl_z = KeyEvent::key(Keycode::Z).with_ctrl();
        assert_eq!(h.pipeline.process_key(ctrl_z, &mut field), KeyResult::NotHandled);

        h.settings.update(|c| c.nav_mode_enabled = false);
        assert_eq!(h.pipeline.process_key(ctrl_h, &mut field), KeyResult::NotHandled);
        assert_eq!(EditorAction::Copy.name(), "copy");
    }

    #[test]
    fn unsupported_codes_pass_through() {
        let mut h = harness(Config::default());
        let mut field = MemoryTextField::new();
        assert_eq!(h.pipeline.process_key(KeyEvent::new(9999), &mut field), KeyResult::NotHandled);
        assert_eq!(
            h.pipeline.process_key(KeyEvent::key(Keycode::A).with_alt(), &mut field),
            KeyResult::NotHandled
        );
        assert!(field.is_empty());
    }

    #[test]
    fn dynamic_and_static_variants() {
        let mut h = harness(Config::default());
        let mut field = MemoryTextField::with_text("caffe");
        assert_eq!(h.pipeline.variants_at_cursor(&field), vec!["è", "é"]);
        assert!(h.pipeline.apply_variant(&mut field, "è"));
        assert_eq!(field.text(), "caffè");

        h.settings.update(|c| c.variation_mode = VariationMode::Static);
        assert_eq!(h.pipeline.variants_at_cursor(&field), vec!["€", "£"]);
        h.pipeline.apply_variant(&mut field, "€");
        assert_eq!(field.text(), "caffè€");
    }

    #[test]
    fn suggestions_and_apply() {
        let mut h = harness(Config::default());
        let mut field = MemoryTextField::with_text("hello wrold");
        let words: Vec<String> = h
            .pipeline
            .suggestions(&field)
            .into_iter()
            .map(|s| s.word)
            .collect();
        assert_eq!(words, vec!["world", "word"]);
        assert!(h.pipeline.apply_suggestion(&mut field, "world"));
        assert_eq!(field.text(), "hello world");
    }

    #[test]
    fn cursor_move_ends_multitap_cycle() {
        let config = Config {
            layout: Some("tap".into()),
            ..Config::default()
        };
        let mut h = harness(config);
        let mut field = MemoryTextField::new();
        let q = KeyEvent::key(Keycode::Q);
        h.pipeline.process_key(q, &mut field);
        field.set_cursor(0);
        h.pipeline.notify_selection_changed(0);
        h.pipeline.process_key(q, &mut field);
        assert_eq!(field.text(), "aa");
    }
}
