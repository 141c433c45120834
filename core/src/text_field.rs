//! Host text-field boundary.
//!
//! The pipeline never owns the text being edited. It talks to the focused
//! field through `TextField`: cursor-adjacent reads for correction decisions,
//! discrete commits and replacements, synthetic keys and named editor
//! actions. All offsets are in `char`s.

use crate::keycode::Keycode;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Named editor actions the nav-mode remapper can dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditorAction {
    Copy,
    Paste,
    Cut,
    Undo,
    SelectAll,
    ExpandSelectionLeft,
    ExpandSelectionRight,
}

impl EditorAction {
    pub const ALL: [EditorAction; 7] = [
        EditorAction::Copy,
        EditorAction::Paste,
        EditorAction::Cut,
        EditorAction::Undo,
        EditorAction::SelectAll,
        EditorAction::ExpandSelectionLeft,
        EditorAction::ExpandSelectionRight,
    ];

    pub fn name(self) -> &'static str {
        match self {
            EditorAction::Copy => "copy",
            EditorAction::Paste => "paste",
            EditorAction::Cut => "cut",
            EditorAction::Undo => "undo",
            EditorAction::SelectAll => "select_all",
            EditorAction::ExpandSelectionLeft => "expand_selection_left",
            EditorAction::ExpandSelectionRight => "expand_selection_right",
        }
    }
}

impl fmt::Display for EditorAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Input purpose hint reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputPurpose {
    #[default]
    FreeForm,
    Email,
    Url,
    /// Correction and suggestions are disabled.
    Password,
    Number,
}

impl InputPurpose {
    /// Whether auto-correction may touch text in this field.
    pub fn allows_correction(self) -> bool {
        matches!(self, InputPurpose::FreeForm)
    }
}

/// The focused, externally owned text field.
pub trait TextField {
    /// Up to `max_chars` characters immediately before the cursor.
    fn text_before_cursor(&self, max_chars: usize) -> String;

    /// Up to `max_chars` characters immediately after the cursor.
    fn text_after_cursor(&self, max_chars: usize) -> String;

    /// Selection as `(start, end)`, `start <= end`. Equal when collapsed.
    fn selection(&self) -> (usize, usize);

    fn cursor(&self) -> usize {
        self.selection().1
    }

    /// Insert `text` at the cursor, replacing any selection. The cursor ends
    /// up after the inserted text.
    fn commit_text(&mut self, text: &str);

    /// Replace the chars in `start..end` with `text`.
    fn replace_range(&mut self, start: usize, end: usize, text: &str);

    /// Chars in `start..end`, or `None` when the range is out of bounds.
    fn text_in_range(&self, start: usize, end: usize) -> Option<String>;

    /// Delete `count` chars before the cursor (or the selection, if any).
    fn delete_before(&mut self, count: usize);

    /// Deliver a synthetic key press to the field.
    fn send_key(&mut self, keycode: Keycode);

    /// Run a named editor action. Returns whether the field supports it.
    fn perform_action(&mut self, action: EditorAction) -> bool;

    fn input_purpose(&self) -> InputPurpose {
        InputPurpose::FreeForm
    }
}

/// The word (letters and apostrophes) ending at the cursor.
pub fn word_before_cursor(field: &dyn TextField) -> String {
    let before = field.text_before_cursor(64);
    let mut word: Vec<char> = before
        .chars()
        .rev()
        .take_while(|c| is_word_char(*c))
        .collect();
    word.reverse();
    word.into_iter().collect()
}

pub fn is_word_char(c: char) -> bool {
    c.is_alphabetic() || c == '\''
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_names_match_serde() {
        for action in EditorAction::ALL {
            let json = serde_json::to_string(&action).unwrap();
            assert_eq!(json, format!("\"{}\"", action.name()));
        }
    }

    #[test]
    fn only_free_form_allows_correction() {
        assert!(InputPurpose::FreeForm.allows_correction());
        assert!(!InputPurpose::Password.allows_correction());
        assert!(!InputPurpose::Url.allows_correction());
    }
}
