//! Platform key codes understood by the pipeline.
//!
//! Numeric values and names follow the Android `KeyEvent.KEYCODE_*` table,
//! which is what physical keyboards report to the host input service. Only
//! the letters `A`..`Z` are remappable through layouts; the remaining codes
//! are boundary keys or navigation targets for nav mode.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
#[repr(u16)]
pub enum Keycode {
    DpadUp = 19,
    DpadDown = 20,
    DpadLeft = 21,
    DpadRight = 22,
    A = 29,
    B = 30,
    C = 31,
    D = 32,
    E = 33,
    F = 34,
    G = 35,
    H = 36,
    I = 37,
    J = 38,
    K = 39,
    L = 40,
    M = 41,
    N = 42,
    O = 43,
    P = 44,
    Q = 45,
    R = 46,
    S = 47,
    T = 48,
    U = 49,
    V = 50,
    W = 51,
    X = 52,
    Y = 53,
    Z = 54,
    Tab = 61,
    Space = 62,
    Enter = 66,
    Del = 67,
    PageUp = 92,
    PageDown = 93,
    Escape = 111,
    ForwardDel = 112,
    MoveHome = 122,
    MoveEnd = 123,
}

const LETTERS: [Keycode; 26] = [
    Keycode::A,
    Keycode::B,
    Keycode::C,
    Keycode::D,
    Keycode::E,
    Keycode::F,
    Keycode::G,
    Keycode::H,
    Keycode::I,
    Keycode::J,
    Keycode::K,
    Keycode::L,
    Keycode::M,
    Keycode::N,
    Keycode::O,
    Keycode::P,
    Keycode::Q,
    Keycode::R,
    Keycode::S,
    Keycode::T,
    Keycode::U,
    Keycode::V,
    Keycode::W,
    Keycode::X,
    Keycode::Y,
    Keycode::Z,
];

const OTHERS: [(Keycode, &str); 14] = [
    (Keycode::DpadUp, "DPAD_UP"),
    (Keycode::DpadDown, "DPAD_DOWN"),
    (Keycode::DpadLeft, "DPAD_LEFT"),
    (Keycode::DpadRight, "DPAD_RIGHT"),
    (Keycode::Tab, "TAB"),
    (Keycode::Space, "SPACE"),
    (Keycode::Enter, "ENTER"),
    (Keycode::Del, "DEL"),
    (Keycode::PageUp, "PAGE_UP"),
    (Keycode::PageDown, "PAGE_DOWN"),
    (Keycode::Escape, "ESCAPE"),
    (Keycode::ForwardDel, "FORWARD_DEL"),
    (Keycode::MoveHome, "MOVE_HOME"),
    (Keycode::MoveEnd, "MOVE_END"),
];

static BY_NAME: Lazy<HashMap<&'static str, Keycode>> = Lazy::new(|| {
    let mut m = HashMap::new();
    for kc in LETTERS {
        m.insert(kc.name(), kc);
    }
    for (kc, name) in OTHERS {
        m.insert(name, kc);
    }
    m
});

static BY_CODE: Lazy<HashMap<u16, Keycode>> =
    Lazy::new(|| BY_NAME.values().map(|kc| (*kc as u16, *kc)).collect());

impl Keycode {
    /// Look up a raw platform code. Unsupported codes return `None`.
    pub fn from_code(code: u16) -> Option<Self> {
        BY_CODE.get(&code).copied()
    }

    /// Parse a key name such as `"Q"`, `"KEYCODE_Q"` or `"DPAD_UP"`.
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        let bare = name.strip_prefix("KEYCODE_").unwrap_or(name);
        BY_NAME.get(bare.to_ascii_uppercase().as_str()).copied()
    }

    /// Key for the letter `ch` (case-insensitive), if it is `a`..`z`.
    pub fn from_letter(ch: char) -> Option<Self> {
        if !ch.is_ascii_alphabetic() {
            return None;
        }
        let idx = (ch.to_ascii_uppercase() as u8 - b'A') as usize;
        LETTERS.get(idx).copied()
    }

    pub fn code(self) -> u16 {
        self as u16
    }

    pub fn name(self) -> &'static str {
        match self {
            Keycode::A => "A",
            Keycode::B => "B",
            Keycode::C => "C",
            Keycode::D => "D",
            Keycode::E => "E",
            Keycode::F => "F",
            Keycode::G => "G",
            Keycode::H => "H",
            Keycode::I => "I",
            Keycode::J => "J",
            Keycode::K => "K",
            Keycode::L => "L",
            Keycode::M => "M",
            Keycode::N => "N",
            Keycode::O => "O",
            Keycode::P => "P",
            Keycode::Q => "Q",
            Keycode::R => "R",
            Keycode::S => "S",
            Keycode::T => "T",
            Keycode::U => "U",
            Keycode::V => "V",
            Keycode::W => "W",
            Keycode::X => "X",
            Keycode::Y => "Y",
            Keycode::Z => "Z",
            other => OTHERS
                .iter()
                .find(|(kc, _)| *kc == other)
                .map(|(_, name)| *name)
                .unwrap_or("UNKNOWN"),
        }
    }

    /// Whether this key belongs to the remappable alphabetic set.
    pub fn is_letter(self) -> bool {
        (Keycode::A as u16..=Keycode::Z as u16).contains(&(self as u16))
    }

    /// Word-boundary keys trigger boundary correction.
    pub fn is_boundary(self) -> bool {
        matches!(self, Keycode::Space | Keycode::Enter)
    }

    /// Character the platform would produce without any layout, for letters.
    pub fn default_char(self) -> Option<char> {
        if self.is_letter() {
            let offset = (self as u16 - Keycode::A as u16) as u8;
            Some((b'a' + offset) as char)
        } else {
            None
        }
    }

    /// All letter keys in alphabetical order.
    pub fn letters() -> impl Iterator<Item = Keycode> {
        LETTERS.into_iter()
    }
}

impl fmt::Display for Keycode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl TryFrom<String> for Keycode {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Keycode::from_name(&value).ok_or_else(|| format!("unknown key name '{}'", value))
    }
}

/// Raw platform code, for management and scripting paths. The key-event
/// path uses `from_code` and passes unknown codes through instead.
impl TryFrom<u16> for Keycode {
    type Error = crate::error::Error;

    fn try_from(code: u16) -> Result<Self, Self::Error> {
        Keycode::from_code(code).ok_or(crate::error::Error::InvalidKeycode(code))
    }
}

impl From<Keycode> for String {
    fn from(kc: Keycode) -> Self {
        kc.name().to_string()
    }
}
