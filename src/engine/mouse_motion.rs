//! Stick-to-pointer motion
//!
//! One [`MotionIntegrator`] exists per `(device, stick)` in mouse mode. Each
//! frame it turns the raw stick position into a pointer delta:
//!
//! 1. apply inversion flags
//! 2. per-axis flat deadzone, remapping `[threshold, 1]` onto `[0, 1]`
//! 3. at rest: forget the movement start, emit nothing
//! 4. otherwise remember when movement started
//! 5. multiplier = `acceleration ^ seconds_in_motion`
//! 6. delta = normalized * sensitivity * multiplier * [`MOTION_SCALE`]
//!
//! Dispatch is gated twice. The stick is re-read right before dispatch and the
//! command is dropped if it has come back to rest, and only one command per
//! stick may be in flight; while one is pending, new commands are dropped
//! rather than queued.

use crate::mapping::MouseSettings;
use std::time::Instant;
use tracing::debug;

/// Pointer pixels per frame at full deflection, sensitivity 1 and no acceleration
pub const MOTION_SCALE: f32 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionDelta {
    pub dx: f32,
    pub dy: f32,
}

impl MotionDelta {
    pub fn magnitude(&self) -> f32 {
        self.dx.hypot(self.dy)
    }
}

/// Result of planning one frame of motion
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MotionPlan {
    AtRest,
    /// A previous command has not completed yet
    Busy,
    Move(MotionDelta),
}

/// Deadzone remap of a single axis
fn normalize_axis(value: f32, threshold: f32) -> f32 {
    if value.abs() < threshold {
        0.0
    } else {
        value.signum() * (value.abs() - threshold) / (1.0 - threshold)
    }
}

/// Applies inversion and the per-axis deadzone to a raw stick position
pub fn normalize(raw: (f32, f32), settings: &MouseSettings) -> (f32, f32) {
    let x = if settings.invert_x { -raw.0 } else { raw.0 };
    let y = if settings.invert_y { -raw.1 } else { raw.1 };
    (
        normalize_axis(x, settings.threshold),
        normalize_axis(y, settings.threshold),
    )
}

pub fn is_at_rest(raw: (f32, f32), settings: &MouseSettings) -> bool {
    normalize(raw, settings) == (0.0, 0.0)
}

#[derive(Debug, Default)]
pub struct MotionIntegrator {
    movement_start: Option<Instant>,
    in_flight: bool,
    dropped: u64,
}

impl MotionIntegrator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Computes this frame's motion for a raw stick position
    pub fn plan(&mut self, raw: (f32, f32), settings: &MouseSettings, now: Instant) -> MotionPlan {
        let (x, y) = normalize(raw, settings);
        if x == 0.0 && y == 0.0 {
            self.movement_start = None;
            return MotionPlan::AtRest;
        }

        let start = *self.movement_start.get_or_insert(now);
        let elapsed = now.saturating_duration_since(start).as_secs_f32();
        let multiplier = settings.acceleration.powf(elapsed);
        let scale = settings.sensitivity * multiplier * MOTION_SCALE;

        if self.in_flight {
            self.dropped += 1;
            debug!("Previous motion command pending, dropping this frame");
            return MotionPlan::Busy;
        }

        MotionPlan::Move(MotionDelta {
            dx: x * scale,
            dy: y * scale,
        })
    }

    /// Marks a command as dispatched; no further command is planned until it completes
    pub fn mark_dispatched(&mut self) {
        self.in_flight = true;
    }

    /// Clears the pending flag, whether the command succeeded or failed
    pub fn complete(&mut self) {
        self.in_flight = false;
    }

    pub fn in_flight(&self) -> bool {
        self.in_flight
    }

    pub fn is_moving(&self) -> bool {
        self.movement_start.is_some()
    }

    /// Commands dropped because one was still pending
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}
