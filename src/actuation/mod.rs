//! Actuation of keyboard keys, mouse buttons and pointer motion
//!
//! The engine never talks to the operating system directly. It emits
//! [`ActuationCommand`]s into a [`CommandSink`]; the production sink
//! ([`TaskDispatcher`]) executes them fire-and-forget against an [`Actuator`]
//! and reports each outcome back as a [`Completion`].
//!
//! ```text
//! TranslationEngine ─[ActuationCommand]→ TaskDispatcher ─→ Actuator (uinput / dry run)
//!         ▲                                    │
//!         └────────────[Completion]────────────┘
//! ```

pub mod dispatcher;
pub mod failure;
pub mod logging;
#[cfg(target_os = "linux")]
pub mod uinput;

pub use dispatcher::TaskDispatcher;
pub use failure::{EngineNotice, FailureLog};
pub use logging::LoggingActuator;

use crate::mapping::{ActuationTarget, KeyIdentity, MouseButton};
use std::fmt::{self, Display};
use thiserror::Error;

/// Errors reported by an actuation backend
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ActuationError {
    /// The operating system refused access, usually a missing permission
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// The backend does not know the requested key
    #[error("Unknown key: {0}")]
    UnknownKey(String),

    /// The backend is not available on this system
    #[error("Actuation backend unavailable: {0}")]
    Unavailable(String),

    /// Any other backend failure
    #[error("Actuation failed: {0}")]
    Backend(String),
}

impl ActuationError {
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, ActuationError::PermissionDenied(_))
    }

    /// Stable name of the error class, used to deduplicate diagnostics
    pub fn class(&self) -> &'static str {
        match self {
            ActuationError::PermissionDenied(_) => "permission-denied",
            ActuationError::UnknownKey(_) => "unknown-key",
            ActuationError::Unavailable(_) => "unavailable",
            ActuationError::Backend(_) => "backend",
        }
    }
}

/// Platform capability for synthesizing input.
///
/// Calls may block briefly; they are always executed off the frame loop.
pub trait Actuator: Send + Sync + 'static {
    fn set_key_state(&self, key: &KeyIdentity, down: bool) -> Result<(), ActuationError>;

    fn set_mouse_button_state(&self, button: MouseButton, down: bool)
        -> Result<(), ActuationError>;

    fn move_mouse_by(&self, dx: f32, dy: f32) -> Result<(), ActuationError>;
}

/// One physical call to issue
#[derive(Debug, Clone, PartialEq)]
pub enum ActuationCommand {
    SetTarget { target: ActuationTarget, down: bool },
    MoveBy { dx: f32, dy: f32 },
}

impl ActuationCommand {
    pub fn press(target: ActuationTarget) -> Self {
        ActuationCommand::SetTarget { target, down: true }
    }

    pub fn release(target: ActuationTarget) -> Self {
        ActuationCommand::SetTarget {
            target,
            down: false,
        }
    }

    /// Runs the command against a backend
    pub fn execute(&self, actuator: &dyn Actuator) -> Result<(), ActuationError> {
        match self {
            ActuationCommand::SetTarget {
                target: ActuationTarget::Keyboard(key),
                down,
            } => actuator.set_key_state(key, *down),
            ActuationCommand::SetTarget {
                target: ActuationTarget::MouseButton(button),
                down,
            } => actuator.set_mouse_button_state(*button, *down),
            ActuationCommand::MoveBy { dx, dy } => actuator.move_mouse_by(*dx, *dy),
        }
    }
}

/// What a command was issued for; completions are routed back by origin
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CommandOrigin {
    Key(ActuationTarget),
    Motion { device: usize, stick: usize },
}

impl Display for CommandOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandOrigin::Key(target) => write!(f, "key {}", target),
            CommandOrigin::Motion { device, stick } => {
                write!(f, "motion device {} stick {}", device, stick)
            }
        }
    }
}

/// Outcome of one dispatched command
#[derive(Debug, Clone)]
pub struct Completion {
    pub origin: CommandOrigin,
    pub result: Result<(), ActuationError>,
}

/// Receiver of the commands produced during a frame
pub trait CommandSink {
    fn submit(&mut self, origin: CommandOrigin, command: ActuationCommand);
}

/// Sink that only records commands, used by tests and dry runs of a single frame
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub commands: Vec<(CommandOrigin, ActuationCommand)>,
}

impl RecordingSink {
    pub fn take(&mut self) -> Vec<(CommandOrigin, ActuationCommand)> {
        std::mem::take(&mut self.commands)
    }

    pub fn presses(&self) -> usize {
        self.count(true)
    }

    pub fn releases(&self) -> usize {
        self.count(false)
    }

    fn count(&self, wanted: bool) -> usize {
        self.commands
            .iter()
            .filter(|(_, command)| {
                matches!(command, ActuationCommand::SetTarget { down, .. } if *down == wanted)
            })
            .count()
    }
}

impl CommandSink for RecordingSink {
    fn submit(&mut self, origin: CommandOrigin, command: ActuationCommand) {
        self.commands.push((origin, command));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Calls(Mutex<Vec<String>>);

    impl Actuator for Calls {
        fn set_key_state(&self, key: &KeyIdentity, down: bool) -> Result<(), ActuationError> {
            self.0.lock().unwrap().push(format!("key {} {}", key, down));
            Ok(())
        }

        fn set_mouse_button_state(
            &self,
            button: MouseButton,
            down: bool,
        ) -> Result<(), ActuationError> {
            self.0.lock().unwrap().push(format!("button {:?} {}", button, down));
            Ok(())
        }

        fn move_mouse_by(&self, dx: f32, dy: f32) -> Result<(), ActuationError> {
            self.0.lock().unwrap().push(format!("move {} {}", dx, dy));
            Ok(())
        }
    }

    #[test]
    fn commands_route_to_the_matching_capability() {
        let calls = Calls::default();
        let space = ActuationTarget::key("Space").unwrap();
        let left = ActuationTarget::key("MouseLeft").unwrap();

        ActuationCommand::press(space).execute(&calls).unwrap();
        ActuationCommand::release(left).execute(&calls).unwrap();
        ActuationCommand::MoveBy { dx: 2.0, dy: -1.5 }
            .execute(&calls)
            .unwrap();

        let recorded = calls.0.lock().unwrap();
        assert_eq!(
            *recorded,
            vec!["key Space true", "button Left false", "move 2 -1.5"]
        );
    }

    #[test]
    fn permission_errors_are_distinguishable() {
        let denied = ActuationError::PermissionDenied("/dev/uinput".into());
        assert!(denied.is_permission_denied());
        assert!(!ActuationError::Backend("io".into()).is_permission_denied());
        assert_eq!(denied.class(), "permission-denied");
    }
}
