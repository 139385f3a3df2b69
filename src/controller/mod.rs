//! Controller subsystem for gamepad input sampling
//!
//! 1. [`sample`] - Per-frame device state and the fixed button/axis layout
//! 2. [`device_sampler`] - gilrs-backed [`DeviceSource`]
//!
//! # Architecture
//!
//! ```text
//! Gamepads ──► gilrs ──► DeviceSampler ──► DeviceSample (per device, per frame)
//! ```
//!
//! The sampler is polled once per frame by the frame loop; it never blocks.

pub mod device_sampler;
pub mod sample;

pub use device_sampler::{ControllerError, DeviceSampler, DeviceSource};
pub use sample::{
    ButtonState, DeviceSample, DpadState, AXIS_COUNT, BUTTON_COUNT, DPAD_DOWN, DPAD_LEFT,
    DPAD_RIGHT, DPAD_UP, STICK_COUNT,
};
