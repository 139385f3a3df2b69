//! Linux backend synthesizing input through `/dev/uinput`
//!
//! Two virtual devices are created on first use: a keyboard exposing every key
//! code and a relative pointer with five buttons. Creation is retried on each
//! call until it succeeds, so granting access to `/dev/uinput` while running
//! takes effect on the next press.

use crate::actuation::{ActuationError, Actuator};
use crate::mapping::{KeyIdentity, MouseButton, KEY_NAMES};
use evdev::{
    uinput::{VirtualDevice, VirtualDeviceBuilder},
    AttributeSet, EventType, InputEvent, Key, RelativeAxisType,
};
use std::io::{self, ErrorKind};
use std::sync::Mutex;
use tracing::{debug, info, warn};

/// Key code of every canonical key name
const KEY_CODES: &[(&str, Key)] = &[
    ("A", Key::KEY_A),
    ("B", Key::KEY_B),
    ("C", Key::KEY_C),
    ("D", Key::KEY_D),
    ("E", Key::KEY_E),
    ("F", Key::KEY_F),
    ("G", Key::KEY_G),
    ("H", Key::KEY_H),
    ("I", Key::KEY_I),
    ("J", Key::KEY_J),
    ("K", Key::KEY_K),
    ("L", Key::KEY_L),
    ("M", Key::KEY_M),
    ("N", Key::KEY_N),
    ("O", Key::KEY_O),
    ("P", Key::KEY_P),
    ("Q", Key::KEY_Q),
    ("R", Key::KEY_R),
    ("S", Key::KEY_S),
    ("T", Key::KEY_T),
    ("U", Key::KEY_U),
    ("V", Key::KEY_V),
    ("W", Key::KEY_W),
    ("X", Key::KEY_X),
    ("Y", Key::KEY_Y),
    ("Z", Key::KEY_Z),
    ("0", Key::KEY_0),
    ("1", Key::KEY_1),
    ("2", Key::KEY_2),
    ("3", Key::KEY_3),
    ("4", Key::KEY_4),
    ("5", Key::KEY_5),
    ("6", Key::KEY_6),
    ("7", Key::KEY_7),
    ("8", Key::KEY_8),
    ("9", Key::KEY_9),
    ("F1", Key::KEY_F1),
    ("F2", Key::KEY_F2),
    ("F3", Key::KEY_F3),
    ("F4", Key::KEY_F4),
    ("F5", Key::KEY_F5),
    ("F6", Key::KEY_F6),
    ("F7", Key::KEY_F7),
    ("F8", Key::KEY_F8),
    ("F9", Key::KEY_F9),
    ("F10", Key::KEY_F10),
    ("F11", Key::KEY_F11),
    ("F12", Key::KEY_F12),
    ("Space", Key::KEY_SPACE),
    ("Enter", Key::KEY_ENTER),
    ("Escape", Key::KEY_ESC),
    ("Tab", Key::KEY_TAB),
    ("Backspace", Key::KEY_BACKSPACE),
    ("ShiftLeft", Key::KEY_LEFTSHIFT),
    ("ShiftRight", Key::KEY_RIGHTSHIFT),
    ("ControlLeft", Key::KEY_LEFTCTRL),
    ("ControlRight", Key::KEY_RIGHTCTRL),
    ("AltLeft", Key::KEY_LEFTALT),
    ("AltRight", Key::KEY_RIGHTALT),
    ("MetaLeft", Key::KEY_LEFTMETA),
    ("MetaRight", Key::KEY_RIGHTMETA),
    ("ArrowUp", Key::KEY_UP),
    ("ArrowDown", Key::KEY_DOWN),
    ("ArrowLeft", Key::KEY_LEFT),
    ("ArrowRight", Key::KEY_RIGHT),
    ("Home", Key::KEY_HOME),
    ("End", Key::KEY_END),
    ("PageUp", Key::KEY_PAGEUP),
    ("PageDown", Key::KEY_PAGEDOWN),
    ("Insert", Key::KEY_INSERT),
    ("Delete", Key::KEY_DELETE),
    ("CapsLock", Key::KEY_CAPSLOCK),
    ("Minus", Key::KEY_MINUS),
    ("Equal", Key::KEY_EQUAL),
    ("BracketLeft", Key::KEY_LEFTBRACE),
    ("BracketRight", Key::KEY_RIGHTBRACE),
    ("Semicolon", Key::KEY_SEMICOLON),
    ("Quote", Key::KEY_APOSTROPHE),
    ("Backquote", Key::KEY_GRAVE),
    ("Backslash", Key::KEY_BACKSLASH),
    ("Comma", Key::KEY_COMMA),
    ("Period", Key::KEY_DOT),
    ("Slash", Key::KEY_SLASH),
];

fn code_for_name(canonical: &str) -> Option<Key> {
    KEY_CODES
        .iter()
        .find(|(name, _)| *name == canonical)
        .map(|(_, code)| *code)
}

/// Resolves a key identity; identities always carry their canonical name
pub fn key_code(key: &KeyIdentity) -> Option<Key> {
    code_for_name(key.as_str())
}

fn button_code(button: MouseButton) -> Key {
    match button {
        MouseButton::Left => Key::BTN_LEFT,
        MouseButton::Right => Key::BTN_RIGHT,
        MouseButton::Middle => Key::BTN_MIDDLE,
        MouseButton::Back => Key::BTN_SIDE,
        MouseButton::Forward => Key::BTN_EXTRA,
    }
}

/// Splits accumulated motion into whole pixels and the remaining fraction
fn carry(residual: f32, delta: f32) -> (i32, f32) {
    let total = residual + delta;
    let whole = total.trunc();
    (whole as i32, total - whole)
}

fn map_io_error(context: &str, e: io::Error) -> ActuationError {
    let detail = format!("{}: {}", context, e);
    match e.kind() {
        ErrorKind::PermissionDenied => ActuationError::PermissionDenied(detail),
        ErrorKind::NotFound => ActuationError::Unavailable(detail),
        _ => ActuationError::Backend(detail),
    }
}

struct VirtualDevices {
    keyboard: VirtualDevice,
    pointer: VirtualDevice,
}

impl VirtualDevices {
    fn create() -> io::Result<Self> {
        let mut keys = AttributeSet::<Key>::new();
        for (name, _) in KEY_NAMES {
            match code_for_name(name) {
                Some(code) => keys.insert(code),
                None => warn!("No uinput key code for {}", name),
            }
        }
        let keyboard = VirtualDeviceBuilder::new()?
            .name("padmapper keyboard")
            .with_keys(&keys)?
            .build()?;

        let mut buttons = AttributeSet::<Key>::new();
        for button in [
            MouseButton::Left,
            MouseButton::Right,
            MouseButton::Middle,
            MouseButton::Back,
            MouseButton::Forward,
        ] {
            buttons.insert(button_code(button));
        }
        let mut rel_axes = AttributeSet::<RelativeAxisType>::new();
        rel_axes.insert(RelativeAxisType::REL_X);
        rel_axes.insert(RelativeAxisType::REL_Y);

        let pointer = VirtualDeviceBuilder::new()?
            .name("padmapper pointer")
            .with_keys(&buttons)?
            .with_relative_axes(&rel_axes)?
            .build()?;

        info!("Created uinput keyboard and pointer devices");
        Ok(Self { keyboard, pointer })
    }
}

#[derive(Default)]
pub struct UinputActuator {
    devices: Mutex<Option<VirtualDevices>>,
    residual: Mutex<(f32, f32)>,
}

impl UinputActuator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the virtual devices up front so permission problems surface at startup
    pub fn open_devices(&self) -> Result<(), ActuationError> {
        self.with_devices(|_| Ok(()))
    }

    fn with_devices<T>(
        &self,
        f: impl FnOnce(&mut VirtualDevices) -> io::Result<T>,
    ) -> Result<T, ActuationError> {
        let mut guard = self
            .devices
            .lock()
            .map_err(|e| ActuationError::Backend(format!("uinput lock poisoned: {}", e)))?;

        if guard.is_none() {
            debug!("Opening /dev/uinput");
            *guard = Some(VirtualDevices::create().map_err(|e| map_io_error("/dev/uinput", e))?);
        }

        match guard.as_mut() {
            Some(devices) => f(devices).map_err(|e| map_io_error("uinput write", e)),
            None => Err(ActuationError::Unavailable("uinput devices missing".into())),
        }
    }
}

impl Actuator for UinputActuator {
    fn set_key_state(&self, key: &KeyIdentity, down: bool) -> Result<(), ActuationError> {
        let code = key_code(key)
            .ok_or_else(|| ActuationError::UnknownKey(key.to_string()))?;
        let event = InputEvent::new(EventType::KEY, code.code(), i32::from(down));
        self.with_devices(|devices| devices.keyboard.emit(&[event]))
    }

    fn set_mouse_button_state(
        &self,
        button: MouseButton,
        down: bool,
    ) -> Result<(), ActuationError> {
        let event = InputEvent::new(EventType::KEY, button_code(button).code(), i32::from(down));
        self.with_devices(|devices| devices.pointer.emit(&[event]))
    }

    fn move_mouse_by(&self, dx: f32, dy: f32) -> Result<(), ActuationError> {
        let (step_x, step_y) = {
            let mut residual = self
                .residual
                .lock()
                .map_err(|e| ActuationError::Backend(format!("residual lock poisoned: {}", e)))?;
            let (step_x, rest_x) = carry(residual.0, dx);
            let (step_y, rest_y) = carry(residual.1, dy);
            *residual = (rest_x, rest_y);
            (step_x, step_y)
        };

        let mut events = Vec::with_capacity(2);
        if step_x != 0 {
            events.push(InputEvent::new(
                EventType::RELATIVE,
                RelativeAxisType::REL_X.0,
                step_x,
            ));
        }
        if step_y != 0 {
            events.push(InputEvent::new(
                EventType::RELATIVE,
                RelativeAxisType::REL_Y.0,
                step_y,
            ));
        }
        if events.is_empty() {
            return Ok(());
        }
        self.with_devices(|devices| devices.pointer.emit(&events))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::mapping::ActuationTarget;

    fn code_of(name: &str) -> Option<Key> {
        match ActuationTarget::key(name).unwrap() {
            ActuationTarget::Keyboard(key) => key_code(&key),
            ActuationTarget::MouseButton(_) => None,
        }
    }

    #[test]
    fn every_key_name_has_a_code() {
        for (name, _) in KEY_NAMES {
            assert!(code_of(name).is_some(), "{name} has no key code");
        }
        assert_eq!(KEY_CODES.len(), KEY_NAMES.len());
    }

    #[test]
    fn spellings_resolve_to_the_same_code() {
        assert_eq!(code_of("a"), Some(Key::KEY_A));
        assert_eq!(code_of("SPACE"), Some(Key::KEY_SPACE));
        assert_eq!(code_of("Left"), Some(Key::KEY_LEFT));
        assert_eq!(code_of("return"), code_of("Enter"));
    }

    #[test]
    fn fractional_motion_is_carried_over() {
        let (step, rest) = carry(0.0, 0.4);
        assert_eq!(step, 0);
        let (step, rest) = carry(rest, 0.4);
        assert_eq!(step, 0);
        let (step, rest) = carry(rest, 0.4);
        assert_eq!(step, 1);
        assert!((rest - 0.2).abs() < 1e-5);

        let (step, rest) = carry(0.0, -2.5);
        assert_eq!(step, -2);
        assert!((rest + 0.5).abs() < 1e-6);
    }
}
