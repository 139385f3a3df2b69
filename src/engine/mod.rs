//! Translation engine
//!
//! 1. [`key_hold`] - Reference-counted, edge-triggered key holding
//! 2. [`mouse_motion`] - Stick-to-pointer integration with anti-queueing
//! 3. [`frame`] - One frame of translation over every connected device
//! 4. [`runner`] - Frame loop lifecycle on its own thread
//!
//! # Architecture
//!
//! ```text
//! DeviceSource ──► TranslationEngine::step ──► TaskDispatcher ──► Actuator
//!                     ▲        │                     │
//!                     │   KeyHoldActuator           │
//!                     │   MotionIntegrator          │
//!                     └────────[Completion]──────────┘
//! ```

pub mod frame;
pub mod key_hold;
pub mod mouse_motion;
pub mod runner;

pub use frame::{EngineStats, FrameReport, TranslationEngine};
pub use key_hold::KeyHoldActuator;
pub use mouse_motion::{MotionIntegrator, MotionPlan, MOTION_SCALE};
pub use runner::{EngineError, EngineHandle, FrameLoop};
