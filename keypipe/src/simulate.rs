//! Key-script simulation for the CLI and tests.
//!
//! A script is plain text typed key by key. Letters, space and newline map
//! to their keycodes; other characters are committed as-is, the way a host
//! would insert keys the pipeline does not own. Bracketed tokens cover
//! everything else:
//!
//! - `<bs>`, `<del>`, `<enter>`, `<space>`, `<tab>`, `<esc>`
//! - `<left>`, `<right>`, `<up>`, `<down>`, `<home>`, `<end>`
//! - `<ctrl-x>` (nav modifier + key), `<alt-x>`
//! - `<wait:500>` advances the clock by 500 ms
//! - `<code:45>` sends a raw platform keycode
//! - `<<` types a literal `<`

use anyhow::{anyhow, bail, Result};
use keypipe_core::{KeyEvent, KeyResult, Keycode, ManualClock, Pipeline, TextField};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stroke {
    Key(KeyEvent),
    /// Text the host inserts directly.
    Text(char),
    Wait(u64),
}

fn named_key(name: &str) -> Option<Keycode> {
    let kc = match name {
        "bs" | "backspace" => Keycode::Del,
        "del" | "delete" => Keycode::ForwardDel,
        "enter" => Keycode::Enter,
        "space" => Keycode::Space,
        "tab" => Keycode::Tab,
        "esc" => Keycode::Escape,
        "left" => Keycode::DpadLeft,
        "right" => Keycode::DpadRight,
        "up" => Keycode::DpadUp,
        "down" => Keycode::DpadDown,
        "home" => Keycode::MoveHome,
        "end" => Keycode::MoveEnd,
        other => return Keycode::from_name(other),
    };
    Some(kc)
}

fn letter_event(c: char) -> Option<KeyEvent> {
    let event = KeyEvent::key(Keycode::from_letter(c)?);
    Some(if c.is_ascii_uppercase() {
        event.shifted()
    } else {
        event
    })
}

fn parse_token(token: &str) -> Result<Stroke> {
    if let Some(ms) = token.strip_prefix("wait:") {
        let ms = ms
            .parse::<u64>()
            .map_err(|e| anyhow!("bad wait duration {ms:?}: {e}"))?;
        return Ok(Stroke::Wait(ms));
    }
    if let Some(code) = token.strip_prefix("code:") {
        let code = code
            .parse::<u16>()
            .map_err(|e| anyhow!("bad keycode {code:?}: {e}"))?;
        return Ok(Stroke::Key(KeyEvent::key(Keycode::try_from(code)?)));
    }
    for (prefix, ctrl) in [("ctrl-", true), ("alt-", false)] {
        if let Some(rest) = token.strip_prefix(prefix) {
            let mut chars = rest.chars();
            let event = match (chars.next(), chars.next()) {
                (Some(c), None) => letter_event(c.to_ascii_lowercase()),
                _ => named_key(rest).map(KeyEvent::key),
            }
            .ok_or_else(|| anyhow!("unknown key in <{token}>"))?;
            return Ok(Stroke::Key(if ctrl {
                event.with_ctrl()
            } else {
                event.with_alt()
            }));
        }
    }
    named_key(token)
        .map(|kc| Stroke::Key(KeyEvent::key(kc)))
        .ok_or_else(|| anyhow!("unknown token <{token}>"))
}

/// Parse a key script into strokes.
pub fn parse_script(script: &str) -> Result<Vec<Stroke>> {
    let mut strokes = Vec::new();
    let mut chars = script.chars().peekable();
    while let Some(c) = chars.next() {
        let stroke = match c {
            '<' if chars.peek() == Some(&'<') => {
                chars.next();
                Stroke::Text('<')
            }
            '<' => {
                let token: String = chars.by_ref().take_while(|&c| c != '>').collect();
                if token.is_empty() {
                    bail!("empty token in key script");
                }
                parse_token(&token.to_ascii_lowercase())?
            }
            ' ' => Stroke::Key(KeyEvent::key(Keycode::Space)),
            '\n' => Stroke::Key(KeyEvent::key(Keycode::Enter)),
            c => letter_event(c).map(Stroke::Key).unwrap_or(Stroke::Text(c)),
        };
        strokes.push(stroke);
    }
    Ok(strokes)
}

/// Feed `strokes` through `pipeline`, advancing `clock` by `gap_ms` between
/// keys. Keys the pipeline passes through get the host's default handling.
pub fn run(
    pipeline: &mut Pipeline,
    field: &mut dyn TextField,
    clock: &ManualClock,
    strokes: &[Stroke],
    gap_ms: u64,
) {
    for stroke in strokes {
        match *stroke {
            Stroke::Key(event) => {
                if pipeline.process_key(event, field) == KeyResult::NotHandled {
                    host_default(event, field);
                }
                pipeline.notify_selection_changed(field.cursor());
                clock.advance(gap_ms);
            }
            Stroke::Text(c) => {
                field.commit_text(&c.to_string());
                pipeline.notify_selection_changed(field.cursor());
            }
            Stroke::Wait(ms) => clock.advance(ms),
        }
    }
}

fn host_default(event: KeyEvent, field: &mut dyn TextField) {
    let mods = event.modifiers;
    if mods.ctrl || mods.alt {
        return;
    }
    if let Some(kc) = Keycode::from_code(event.code) {
        field.send_key(kc);
    }
}
