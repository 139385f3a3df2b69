//! Direction classification for analog sticks and the D-pad
//!
//! Sticks and the D-pad are reduced to one of eight directions (or none). The
//! classification is a pure function of its inputs; the diagonal fallback is
//! evaluated against whatever set of directions is configured for the input
//! being evaluated, so two sticks with different mappings resolve independently.

use crate::controller::DpadState;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

/// One of the eight compass directions a stick or D-pad can point to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
    UpLeft,
    UpRight,
    DownLeft,
    DownRight,
}

impl Direction {
    pub const ALL: [Direction; 8] = [
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
        Direction::UpLeft,
        Direction::UpRight,
        Direction::DownLeft,
        Direction::DownRight,
    ];

    /// The two cardinal directions a diagonal is composed of
    pub fn cardinals(self) -> Option<(Direction, Direction)> {
        match self {
            Direction::UpLeft => Some((Direction::Up, Direction::Left)),
            Direction::UpRight => Some((Direction::Up, Direction::Right)),
            Direction::DownLeft => Some((Direction::Down, Direction::Left)),
            Direction::DownRight => Some((Direction::Down, Direction::Right)),
            _ => None,
        }
    }

    /// Composes a direction from its vertical and horizontal components
    fn compose(vertical: Option<Direction>, horizontal: Option<Direction>) -> Option<Direction> {
        match (vertical, horizontal) {
            (None, None) => None,
            (Some(v), None) => Some(v),
            (None, Some(h)) => Some(h),
            (Some(Direction::Up), Some(Direction::Left)) => Some(Direction::UpLeft),
            (Some(Direction::Up), Some(Direction::Right)) => Some(Direction::UpRight),
            (Some(Direction::Down), Some(Direction::Left)) => Some(Direction::DownLeft),
            (Some(Direction::Down), Some(Direction::Right)) => Some(Direction::DownRight),
            // Components are only ever produced as cardinals below
            (Some(v), Some(_)) => Some(v),
        }
    }
}

impl Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Direction::Up => "up",
            Direction::Down => "down",
            Direction::Left => "left",
            Direction::Right => "right",
            Direction::UpLeft => "up-left",
            Direction::UpRight => "up-right",
            Direction::DownLeft => "down-left",
            Direction::DownRight => "down-right",
        };
        write!(f, "{}", name)
    }
}

/// Classifies a stick position into a direction.
///
/// Axis values are in `[-1, 1]` with negative Y pointing up. Each axis is compared
/// strictly against `threshold`, so a value exactly at the threshold contributes
/// nothing. Both axes past the threshold yield the matching diagonal.
pub fn classify_stick(x: f32, y: f32, threshold: f32) -> Option<Direction> {
    if x.abs() < threshold && y.abs() < threshold {
        return None;
    }

    let vertical = if y < -threshold {
        Some(Direction::Up)
    } else if y > threshold {
        Some(Direction::Down)
    } else {
        None
    };

    let horizontal = if x < -threshold {
        Some(Direction::Left)
    } else if x > threshold {
        Some(Direction::Right)
    } else {
        None
    };

    Direction::compose(vertical, horizontal)
}

/// Classifies the four D-pad buttons into a direction.
///
/// Opposing buttons held together cancel each other out on that axis.
pub fn classify_dpad(dpad: DpadState) -> Option<Direction> {
    let vertical = match (dpad.up, dpad.down) {
        (true, false) => Some(Direction::Up),
        (false, true) => Some(Direction::Down),
        _ => None,
    };
    let horizontal = match (dpad.left, dpad.right) {
        (true, false) => Some(Direction::Left),
        (false, true) => Some(Direction::Right),
        _ => None,
    };

    Direction::compose(vertical, horizontal)
}

/// Set of directions that should count as active for a classified direction.
///
/// A diagonal with its own mapping in `configured` activates only itself. A
/// diagonal without one falls back to its two adjacent cardinals.
pub fn resolve_directions(
    classified: Option<Direction>,
    configured: &[Direction],
) -> ActiveDirections {
    let mut active = ActiveDirections::default();

    let Some(direction) = classified else {
        return active;
    };

    match direction.cardinals() {
        Some((vertical, horizontal)) if !configured.contains(&direction) => {
            active.insert(vertical);
            active.insert(horizontal);
        }
        _ => active.insert(direction),
    }
    active
}

/// Small fixed-capacity set of active directions (at most two are ever active)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActiveDirections {
    slots: [Option<Direction>; 2],
}

impl ActiveDirections {
    fn insert(&mut self, direction: Direction) {
        if self.contains(direction) {
            return;
        }
        if let Some(slot) = self.slots.iter_mut().find(|slot| slot.is_none()) {
            *slot = Some(direction);
        }
    }

    pub fn contains(&self, direction: Direction) -> bool {
        self.slots.contains(&Some(direction))
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    pub fn iter(&self) -> impl Iterator<Item = Direction> + '_ {
        self.slots.iter().flatten().copied()
    }
}
