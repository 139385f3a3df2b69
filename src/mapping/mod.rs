//! Mapping model: what each gamepad input translates into
//!
//! 1. [`direction`] - 8-way classification of sticks and the D-pad, diagonal fallback
//! 2. [`keys`] - Actuation targets and per-input logical state keys
//! 3. [`store`] - Per-device mapping sets and their invariants
//! 4. [`editor`] - Worker serializing every mutation of the shared store
//!
//! # Architecture
//!
//! ```text
//! EditorClient ──[EditorAction]──► MappingEditor ──(write)──► MappingStore
//!                                                                 │
//!                                              frame loop ◄──(read)┘
//! ```

pub mod direction;
pub mod editor;
pub mod error;
pub mod keys;
pub mod store;

pub use direction::{classify_dpad, classify_stick, resolve_directions, ActiveDirections, Direction};
pub use editor::{EditorAction, EditorClient, MappingEditor};
pub use error::MappingError;
pub use keys::{
    ActuationTarget, InputSource, KeyIdentity, LogicalStateKey, MouseButton, KEY_NAMES,
};
pub use store::{
    AxisMapping, AxisMode, ButtonMapping, DeviceMapping, DpadMapping, HotkeyEntry,
    MappingDefaults, MappingStore, MouseSettings, StickConfig, DEFAULT_ACCELERATION,
    DEFAULT_SENSITIVITY, DEFAULT_THRESHOLD,
};
