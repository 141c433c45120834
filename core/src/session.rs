//! Per-input-session state.
//!
//! Everything here is exclusive to the event-handling context: the multi-tap
//! cycle and the last boundary correction (kept so an immediate backspace can
//! undo it). Focus changes start a fresh session.

use crate::multitap::MultiTapSequencer;
use crate::text_field::TextField;

/// A boundary correction that was just applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedCorrection {
    /// The word as typed.
    pub original: String,
    /// What replaced it.
    pub replacement: String,
    /// Char offset where the replacement starts.
    pub start: usize,
    /// Boundary text that followed the replacement.
    pub separator: String,
}

impl AppliedCorrection {
    fn replacement_end(&self) -> usize {
        self.start + self.replacement.chars().count()
    }

    /// Cursor position right after the separator.
    pub fn expected_cursor(&self) -> usize {
        self.replacement_end() + self.separator.chars().count()
    }

    /// Whether the field still shows the replacement and separator with the
    /// cursor right behind them.
    pub fn is_intact(&self, field: &dyn TextField) -> bool {
        let end = self.replacement_end();
        field.cursor() == self.expected_cursor()
            && field.text_in_range(self.start, end).as_deref() == Some(self.replacement.as_str())
            && field.text_in_range(end, self.expected_cursor()).as_deref()
                == Some(self.separator.as_str())
    }

    /// Put the typed word back, keeping the separator.
    pub fn revert(&self, field: &mut dyn TextField) {
        field.replace_range(self.start, self.replacement_end(), &self.original);
    }
}

#[derive(Debug, Clone)]
pub struct Session {
    pub sequencer: MultiTapSequencer,
    last_correction: Option<AppliedCorrection>,
    /// Config version the session last observed.
    seen_version: u64,
}

impl Session {
    pub fn new(window_ms: u64) -> Self {
        Self {
            sequencer: MultiTapSequencer::new(window_ms),
            last_correction: None,
            seen_version: 0,
        }
    }

    pub fn last_correction(&self) -> Option<&AppliedCorrection> {
        self.last_correction.as_ref()
    }

    pub fn record_correction(&mut self, correction: AppliedCorrection) {
        self.last_correction = Some(correction);
    }

    pub fn take_correction(&mut self) -> Option<AppliedCorrection> {
        self.last_correction.take()
    }

    pub fn forget_correction(&mut self) {
        self.last_correction = None;
    }

    pub fn seen_version(&self) -> u64 {
        self.seen_version
    }

    pub fn observe_version(&mut self, version: u64) -> bool {
        let changed = version != self.seen_version;
        self.seen_version = version;
        changed
    }

    /// Drop all transient state.
    pub fn clear(&mut self) {
        self.sequencer.reset();
        self.last_correction = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_field::MemoryTextField;

    #[test]
    fn revert_keeps_separator() {
        let mut field = MemoryTextField::with_text("say the ");
        let correction = AppliedCorrection {
            original: "teh".into(),
            replacement: "the".into(),
            start: 4,
            separator: " ".into(),
        };
        assert!(correction.is_intact(&field));
        correction.revert(&mut field);
        assert_eq!(field.text(), "say teh ");
        assert_eq!(field.cursor(), 8);
    }

    #[test]
    fn moved_cursor_breaks_correction() {
        let mut field = MemoryTextField::with_text("the ");
        field.set_cursor(1);
        let correction = AppliedCorrection {
            original: "teh".into(),
            replacement: "the".into(),
            start: 0,
            separator: " ".into(),
        };
        assert!(!correction.is_intact(&field));
    }
}
