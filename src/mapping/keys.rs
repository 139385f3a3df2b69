//! Key identities and logical state keys
//!
//! Mappings resolve to an [`ActuationTarget`], parsed once when the mapping is
//! created. Key names are matched against [`KEY_NAMES`] ignoring ASCII case and
//! stored in their canonical spelling, so `"a"`, `"A"` and `"Esc"`/`"Escape"`
//! each name one key. Inputs are identified per frame by a [`LogicalStateKey`],
//! which is what edge detection and holder counting operate on.

use crate::mapping::{Direction, MappingError};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use std::str::FromStr;

const MOUSE_PREFIX: &str = "Mouse";

/// Canonical keyboard key names, each with the aliases accepted for it
pub const KEY_NAMES: &[(&str, &[&str])] = &[
    ("A", &[]),
    ("B", &[]),
    ("C", &[]),
    ("D", &[]),
    ("E", &[]),
    ("F", &[]),
    ("G", &[]),
    ("H", &[]),
    ("I", &[]),
    ("J", &[]),
    ("K", &[]),
    ("L", &[]),
    ("M", &[]),
    ("N", &[]),
    ("O", &[]),
    ("P", &[]),
    ("Q", &[]),
    ("R", &[]),
    ("S", &[]),
    ("T", &[]),
    ("U", &[]),
    ("V", &[]),
    ("W", &[]),
    ("X", &[]),
    ("Y", &[]),
    ("Z", &[]),
    ("0", &["Digit0"]),
    ("1", &["Digit1"]),
    ("2", &["Digit2"]),
    ("3", &["Digit3"]),
    ("4", &["Digit4"]),
    ("5", &["Digit5"]),
    ("6", &["Digit6"]),
    ("7", &["Digit7"]),
    ("8", &["Digit8"]),
    ("9", &["Digit9"]),
    ("F1", &[]),
    ("F2", &[]),
    ("F3", &[]),
    ("F4", &[]),
    ("F5", &[]),
    ("F6", &[]),
    ("F7", &[]),
    ("F8", &[]),
    ("F9", &[]),
    ("F10", &[]),
    ("F11", &[]),
    ("F12", &[]),
    ("Space", &[]),
    ("Enter", &["Return"]),
    ("Escape", &["Esc"]),
    ("Tab", &[]),
    ("Backspace", &[]),
    ("ShiftLeft", &["Shift"]),
    ("ShiftRight", &[]),
    ("ControlLeft", &["Control", "Ctrl"]),
    ("ControlRight", &[]),
    ("AltLeft", &["Alt"]),
    ("AltRight", &[]),
    ("MetaLeft", &["Meta", "Super"]),
    ("MetaRight", &[]),
    ("ArrowUp", &["Up"]),
    ("ArrowDown", &["Down"]),
    ("ArrowLeft", &["Left"]),
    ("ArrowRight", &["Right"]),
    ("Home", &[]),
    ("End", &[]),
    ("PageUp", &[]),
    ("PageDown", &[]),
    ("Insert", &[]),
    ("Delete", &[]),
    ("CapsLock", &[]),
    ("Minus", &[]),
    ("Equal", &[]),
    ("BracketLeft", &[]),
    ("BracketRight", &[]),
    ("Semicolon", &[]),
    ("Quote", &[]),
    ("Backquote", &[]),
    ("Backslash", &[]),
    ("Comma", &[]),
    ("Period", &[]),
    ("Slash", &[]),
];

/// Canonical spelling of a keyboard key name or alias, ignoring ASCII case
fn canonical_key_name(name: &str) -> Option<&'static str> {
    KEY_NAMES
        .iter()
        .find(|(canonical, aliases)| {
            canonical.eq_ignore_ascii_case(name)
                || aliases.iter().any(|alias| alias.eq_ignore_ascii_case(name))
        })
        .map(|(canonical, _)| *canonical)
}

/// Canonical name of a keyboard key, e.g. `"A"`, `"Space"` or `"ArrowUp"`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyIdentity(&'static str);

impl KeyIdentity {
    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

impl Display for KeyIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
    Back,
    Forward,
}

impl MouseButton {
    const ALL: [MouseButton; 5] = [
        MouseButton::Left,
        MouseButton::Right,
        MouseButton::Middle,
        MouseButton::Back,
        MouseButton::Forward,
    ];

    fn from_suffix(suffix: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|button| button.suffix().eq_ignore_ascii_case(suffix))
    }

    fn suffix(self) -> &'static str {
        match self {
            MouseButton::Left => "Left",
            MouseButton::Right => "Right",
            MouseButton::Middle => "Middle",
            MouseButton::Back => "Back",
            MouseButton::Forward => "Forward",
        }
    }
}

fn mouse_button(name: &str) -> Option<MouseButton> {
    let prefix = name.get(..MOUSE_PREFIX.len())?;
    if !prefix.eq_ignore_ascii_case(MOUSE_PREFIX) {
        return None;
    }
    name.get(MOUSE_PREFIX.len()..)
        .and_then(MouseButton::from_suffix)
}

/// What a mapping presses: a keyboard key or a mouse button.
///
/// Persisted as its plain name (`"A"`, `"MouseLeft"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ActuationTarget {
    Keyboard(KeyIdentity),
    MouseButton(MouseButton),
}

impl ActuationTarget {
    pub fn key(name: &str) -> Result<Self, MappingError> {
        name.parse()
    }
}

impl FromStr for ActuationTarget {
    type Err = MappingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        if name.is_empty() {
            return Err(MappingError::InvalidKey(s.to_string()));
        }

        if let Some(button) = mouse_button(name) {
            return Ok(ActuationTarget::MouseButton(button));
        }

        canonical_key_name(name)
            .map(|canonical| ActuationTarget::Keyboard(KeyIdentity(canonical)))
            .ok_or_else(|| MappingError::InvalidKey(s.to_string()))
    }
}

impl TryFrom<String> for ActuationTarget {
    type Error = MappingError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ActuationTarget> for String {
    fn from(target: ActuationTarget) -> Self {
        target.to_string()
    }
}

impl Display for ActuationTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActuationTarget::Keyboard(key) => write!(f, "{}", key),
            ActuationTarget::MouseButton(button) => write!(f, "{}{}", MOUSE_PREFIX, button.suffix()),
        }
    }
}

/// Which physical input of a device a logical state key refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputSource {
    Button(usize),
    Dpad(Direction),
    Stick { stick: usize, direction: Direction },
}

/// Identity of one input's boolean activity on one device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LogicalStateKey {
    pub device: usize,
    pub source: InputSource,
}

impl LogicalStateKey {
    pub fn button(device: usize, button: usize) -> Self {
        Self {
            device,
            source: InputSource::Button(button),
        }
    }

    pub fn dpad(device: usize, direction: Direction) -> Self {
        Self {
            device,
            source: InputSource::Dpad(direction),
        }
    }

    pub fn stick(device: usize, stick: usize, direction: Direction) -> Self {
        Self {
            device,
            source: InputSource::Stick { stick, direction },
        }
    }
}

impl Display for LogicalStateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.source {
            InputSource::Button(button) => write!(f, "device {}, button {}", self.device, button),
            InputSource::Dpad(direction) => write!(f, "device {}, dpad {}", self.device, direction),
            InputSource::Stick { stick, direction } => write!(
                f,
                "device {}, axis {} direction {}",
                self.device, stick, direction
            ),
        }
    }
}
