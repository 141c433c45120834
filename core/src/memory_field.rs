//! In-memory `TextField` used by the CLI simulator and tests.

use crate::keycode::Keycode;
use crate::text_field::{EditorAction, InputPurpose, TextField};

#[derive(Debug, Clone, PartialEq, Eq)]
struct FieldState {
    text: Vec<char>,
    start: usize,
    end: usize,
}

/// Text buffer with a selection, a clipboard and an undo stack.
#[derive(Debug, Clone)]
pub struct MemoryTextField {
    state: FieldState,
    clipboard: String,
    undo: Vec<FieldState>,
    sent_keys: Vec<Keycode>,
    purpose: InputPurpose,
}

impl MemoryTextField {
    pub fn new() -> Self {
        Self {
            state: FieldState {
                text: Vec::new(),
                start: 0,
                end: 0,
            },
            clipboard: String::new(),
            undo: Vec::new(),
            sent_keys: Vec::new(),
            purpose: InputPurpose::FreeForm,
        }
    }

    /// Field holding `text` with the cursor at the end.
    pub fn with_text(text: &str) -> Self {
        let mut field = Self::new();
        field.state.text = text.chars().collect();
        field.state.start = field.state.text.len();
        field.state.end = field.state.text.len();
        field
    }

    pub fn with_purpose(mut self, purpose: InputPurpose) -> Self {
        self.purpose = purpose;
        self
    }

    pub fn text(&self) -> String {
        self.state.text.iter().collect()
    }

    pub fn len(&self) -> usize {
        self.state.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.text.is_empty()
    }

    pub fn clipboard(&self) -> &str {
        &self.clipboard
    }

    /// Keys delivered through `send_key`, in order.
    pub fn sent_keys(&self) -> &[Keycode] {
        &self.sent_keys
    }

    /// Move the cursor as a user tap would, collapsing the selection.
    pub fn set_cursor(&mut self, pos: usize) {
        let pos = pos.min(self.state.text.len());
        self.state.start = pos;
        self.state.end = pos;
    }

    pub fn set_selection(&mut self, start: usize, end: usize) {
        let len = self.state.text.len();
        let (a, b) = (start.min(len), end.min(len));
        self.state.start = a.min(b);
        self.state.end = a.max(b);
    }

    fn checkpoint(&mut self) {
        self.undo.push(self.state.clone());
    }

    fn selected(&self) -> String {
        self.state.text[self.state.start..self.state.end].iter().collect()
    }

    fn delete_selection(&mut self) {
        let (start, end) = (self.state.start, self.state.end);
        self.state.text.drain(start..end);
        self.state.end = start;
    }

    fn delete_after(&mut self) {
        if self.state.start != self.state.end {
            self.checkpoint();
            self.delete_selection();
        } else if self.state.end < self.state.text.len() {
            self.checkpoint();
            self.state.text.remove(self.state.end);
        }
    }
}

impl Default for MemoryTextField {
    fn default() -> Self {
        Self::new()
    }
}

impl TextField for MemoryTextField {
    fn text_before_cursor(&self, max_chars: usize) -> String {
        let end = self.state.start;
        let start = end.saturating_sub(max_chars);
        self.state.text[start..end].iter().collect()
    }

    fn text_after_cursor(&self, max_chars: usize) -> String {
        let start = self.state.end;
        let end = (start + max_chars).min(self.state.text.len());
        self.state.text[start..end].iter().collect()
    }

    fn selection(&self) -> (usize, usize) {
        (self.state.start, self.state.end)
    }

    fn commit_text(&mut self, text: &str) {
        self.checkpoint();
        self.delete_selection();
        let at = self.state.start;
        let inserted: Vec<char> = text.chars().collect();
        let n = inserted.len();
        self.state.text.splice(at..at, inserted);
        self.state.start = at + n;
        self.state.end = at + n;
    }

    fn replace_range(&mut self, start: usize, end: usize, text: &str) {
        let len = self.state.text.len();
        if start > end || end > len {
            return;
        }
        self.checkpoint();
        let inserted: Vec<char> = text.chars().collect();
        let n = inserted.len();
        self.state.text.splice(start..end, inserted);
        // Positions after the replaced range shift with it.
        let shift = |pos: usize| {
            if pos >= end {
                pos + n - (end - start)
            } else if pos > start {
                start + n
            } else {
                pos
            }
        };
        self.state.start = shift(self.state.start);
        self.state.end = shift(self.state.end);
    }

    fn text_in_range(&self, start: usize, end: usize) -> Option<String> {
        if start > end || end > self.state.text.len() {
            return None;
        }
        Some(self.state.text[start..end].iter().collect())
    }

    fn delete_before(&mut self, count: usize) {
        if self.state.start != self.state.end {
            self.checkpoint();
            self.delete_selection();
            return;
        }
        let end = self.state.end;
        let start = end.saturating_sub(count);
        if start == end {
            return;
        }
        self.checkpoint();
        self.state.text.drain(start..end);
        self.state.start = start;
        self.state.end = start;
    }

    fn send_key(&mut self, keycode: Keycode) {
        self.sent_keys.push(keycode);
        let len = self.state.text.len();
        match keycode {
            Keycode::DpadLeft => {
                let pos = if self.state.start != self.state.end {
                    self.state.start
                } else {
                    self.state.start.saturating_sub(1)
                };
                self.set_cursor(pos);
            }
            Keycode::DpadRight => {
                let pos = if self.state.start != self.state.end {
                    self.state.end
                } else {
                    (self.state.end + 1).min(len)
                };
                self.set_cursor(pos);
            }
            Keycode::DpadUp | Keycode::MoveHome | Keycode::PageUp => self.set_cursor(0),
            Keycode::DpadDown | Keycode::MoveEnd | Keycode::PageDown => self.set_cursor(len),
            Keycode::Del => self.delete_before(1),
            Keycode::ForwardDel => self.delete_after(),
            Keycode::Enter => self.commit_text("\n"),
            Keycode::Tab => self.commit_text("\t"),
            Keycode::Space => self.commit_text(" "),
            Keycode::Escape => {}
            letter => {
                if let Some(ch) = letter.default_char() {
                    self.commit_text(&ch.to_string());
                }
            }
        }
    }

    fn perform_action(&mut self, action: EditorAction) -> bool {
        match action {
            EditorAction::Copy => {
                if self.state.start != self.state.end {
                    self.clipboard = self.selected();
                }
            }
            EditorAction::Cut => {
                if self.state.start != self.state.end {
                    self.clipboard = self.selected();
                    self.checkpoint();
                    self.delete_selection();
                }
            }
            EditorAction::Paste => {
                if !self.clipboard.is_empty() {
                    let clip = self.clipboard.clone();
                    self.commit_text(&clip);
                }
            }
            EditorAction::Undo => {
                if let Some(previous) = self.undo.pop() {
                    self.state = previous;
                }
            }
            EditorAction::SelectAll => {
                self.state.start = 0;
                self.state.end = self.state.text.len();
            }
            EditorAction::ExpandSelectionLeft => {
                self.state.start = self.state.start.saturating_sub(1);
            }
            EditorAction::ExpandSelectionRight => {
                self.state.end = (self.state.end + 1).min(self.state.text.len());
            }
        }
        true
    }

    fn input_purpose(&self) -> InputPurpose {
        self.purpose
    }
}
