//! Per-frame device state and the fixed button/axis layout
//!
//! Layout follows the standard gamepad convention:
//!
//! ```text
//! buttons  0 A/South   1 B/East    2 X/West     3 Y/North
//!          4 LB        5 RB        6 LT         7 RT
//!          8 Select    9 Start    10 L3        11 R3
//!         12 Up       13 Down     14 Left      15 Right    16 Guide
//! axes     0 LX        1 LY        2 RX         3 RY        (Y positive = down)
//! ```

pub const BUTTON_COUNT: usize = 17;
pub const STICK_COUNT: usize = 2;
pub const AXIS_COUNT: usize = STICK_COUNT * 2;

pub const DPAD_UP: usize = 12;
pub const DPAD_DOWN: usize = 13;
pub const DPAD_LEFT: usize = 14;
pub const DPAD_RIGHT: usize = 15;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ButtonState {
    pub pressed: bool,
    /// Analog value in `[0, 1]`, meaningful for triggers
    pub value: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DpadState {
    pub up: bool,
    pub down: bool,
    pub left: bool,
    pub right: bool,
}

/// Instantaneous state of one device, produced fresh every frame
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceSample {
    pub buttons: Vec<ButtonState>,
    pub axes: Vec<f32>,
}

impl DeviceSample {
    pub fn neutral() -> Self {
        Self {
            buttons: vec![ButtonState::default(); BUTTON_COUNT],
            axes: vec![0.0; AXIS_COUNT],
        }
    }

    /// Button state; buttons the device does not report read as released
    pub fn button(&self, index: usize) -> ButtonState {
        self.buttons.get(index).copied().unwrap_or_default()
    }

    /// Axis value clamped to `[-1, 1]`; missing axes read as centered
    pub fn axis(&self, index: usize) -> f32 {
        self.axes
            .get(index)
            .copied()
            .filter(|value| value.is_finite())
            .map(|value| value.clamp(-1.0, 1.0))
            .unwrap_or(0.0)
    }

    /// `(x, y)` of a stick
    pub fn stick(&self, stick: usize) -> (f32, f32) {
        (self.axis(stick * 2), self.axis(stick * 2 + 1))
    }

    pub fn dpad(&self) -> DpadState {
        DpadState {
            up: self.button(DPAD_UP).pressed,
            down: self.button(DPAD_DOWN).pressed,
            left: self.button(DPAD_LEFT).pressed,
            right: self.button(DPAD_RIGHT).pressed,
        }
    }

    pub fn set_button(&mut self, index: usize, pressed: bool) {
        if self.buttons.len() <= index {
            self.buttons.resize(index + 1, ButtonState::default());
        }
        self.buttons[index] = ButtonState {
            pressed,
            value: if pressed { 1.0 } else { 0.0 },
        };
    }

    pub fn set_stick(&mut self, stick: usize, x: f32, y: f32) {
        let needed = stick * 2 + 2;
        if self.axes.len() < needed {
            self.axes.resize(needed, 0.0);
        }
        self.axes[stick * 2] = x;
        self.axes[stick * 2 + 1] = y;
    }
}
