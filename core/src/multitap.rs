//! Multi-tap sequencing.
//!
//! Repeated presses of one key inside the timing window cycle through the
//! key's tap sequence, replacing the character emitted by the previous press
//! in place. The state machine is explicit (`TapState`) and reads time from
//! an injected `Clock`, so every transition is testable without sleeping.

use crate::keycode::Keycode;
use crate::resolver::ResolvedKey;
use crate::text_field::TextField;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::debug;

/// Millisecond time source.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

/// Monotonic wall clock measured from construction.
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}

/// Hand-driven clock for tests and simulations.
#[derive(Debug, Default)]
pub struct ManualClock(AtomicU64);

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self(AtomicU64::new(start_ms))
    }

    pub fn advance(&self, ms: u64) {
        self.0.fetch_add(ms, Ordering::AcqRel);
    }

    pub fn set(&self, ms: u64) {
        self.0.store(ms, Ordering::Release);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }
}

/// Char-offset range of the cycling character in the text field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TapState {
    #[default]
    Idle,
    Cycling {
        keycode: Keycode,
        tap_index: usize,
        deadline: u64,
        span: Span,
        /// Text committed by the last press; checked before replacing.
        emitted: String,
    },
}

/// What a press did to the text field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TapStep {
    /// A new character was inserted at the cursor.
    Inserted { tap_index: usize, text: String },
    /// The previous press's character was replaced in place.
    Replaced { tap_index: usize, text: String },
}

impl TapStep {
    pub fn tap_index(&self) -> usize {
        match self {
            TapStep::Inserted { tap_index, .. } | TapStep::Replaced { tap_index, .. } => *tap_index,
        }
    }

    pub fn text(&self) -> &str {
        match self {
            TapStep::Inserted { text, .. } | TapStep::Replaced { text, .. } => text,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MultiTapSequencer {
    state: TapState,
    window_ms: u64,
}

impl MultiTapSequencer {
    pub fn new(window_ms: u64) -> Self {
        Self {
            state: TapState::Idle,
            window_ms,
        }
    }

    pub fn state(&self) -> &TapState {
        &self.state
    }

    pub fn window_ms(&self) -> u64 {
        self.window_ms
    }

    pub fn set_window_ms(&mut self, window_ms: u64) {
        self.window_ms = window_ms;
    }

    pub fn reset(&mut self) {
        if self.state != TapState::Idle {
            debug!("multi-tap cycle reset");
        }
        self.state = TapState::Idle;
    }

    /// Drop the cycle if its window has elapsed at `now`.
    pub fn expire(&mut self, now: u64) {
        if let TapState::Cycling { deadline, .. } = self.state {
            if now > deadline {
                self.reset();
            }
        }
    }

    /// Another key was pressed.
    pub fn on_other_key(&mut self, keycode: Keycode) {
        if let TapState::Cycling { keycode: current, .. } = self.state {
            if current != keycode {
                self.reset();
            }
        }
    }

    /// The host reported a cursor position. Moves that do not land where the
    /// last press left the cursor were not caused by the sequencer.
    pub fn on_cursor_moved(&mut self, cursor: usize) {
        if let TapState::Cycling { span, .. } = self.state {
            if cursor != span.end {
                self.reset();
            }
        }
    }

    /// Handle a key-down of a cycling key at time `now`, writing to `field`.
    pub fn press(&mut self, key: &ResolvedKey, now: u64, field: &mut dyn TextField) -> TapStep {
        let continuing = match &self.state {
            TapState::Cycling {
                keycode,
                tap_index,
                deadline,
                span,
                emitted,
            } if *keycode == key.keycode && now <= *deadline => {
                Some(((tap_index + 1) % key.tap_count().max(1), *span, emitted.clone()))
            }
            _ => None,
        };

        let (tap_index, step, span) = match continuing {
            Some((tap_index, span, emitted)) => {
                let text = key.tap_text(tap_index).unwrap_or_default().to_string();
                let intact = field.text_in_range(span.start, span.end).as_deref() == Some(emitted.as_str());
                if intact {
                    field.replace_range(span.start, span.end, &text);
                    let span = Span {
                        start: span.start,
                        end: span.start + text.chars().count(),
                    };
                    (tap_index, TapStep::Replaced { tap_index, text }, span)
                } else {
                    debug!(key = %key.keycode, "cycled text was edited externally, inserting instead");
                    let span = insert(field, &text);
                    (tap_index, TapStep::Inserted { tap_index, text }, span)
                }
            }
            None => {
                let text = key.tap_text(0).unwrap_or_default().to_string();
                let span = insert(field, &text);
                (0, TapStep::Inserted { tap_index: 0, text }, span)
            }
        };

        self.state = TapState::Cycling {
            keycode: key.keycode,
            tap_index,
            deadline: now + self.window_ms,
            span,
            emitted: step.text().to_string(),
        };
        step
    }
}

fn insert(field: &mut dyn TextField, text: &str) -> Span {
    let start = field.selection().0;
    field.commit_text(text);
    Span {
        start,
        end: start + text.chars().count(),
    }
}
