//! Dry-run backend that only logs what would be actuated

use crate::actuation::{ActuationError, Actuator};
use crate::mapping::{KeyIdentity, MouseButton};
use tracing::info;

#[derive(Debug, Default)]
pub struct LoggingActuator;

impl Actuator for LoggingActuator {
    fn set_key_state(&self, key: &KeyIdentity, down: bool) -> Result<(), ActuationError> {
        info!("[dry run] key {} {}", key, if down { "down" } else { "up" });
        Ok(())
    }

    fn set_mouse_button_state(
        &self,
        button: MouseButton,
        down: bool,
    ) -> Result<(), ActuationError> {
        info!(
            "[dry run] mouse button {:?} {}",
            button,
            if down { "down" } else { "up" }
        );
        Ok(())
    }

    fn move_mouse_by(&self, dx: f32, dy: f32) -> Result<(), ActuationError> {
        info!("[dry run] move pointer by ({:.2}, {:.2})", dx, dy);
        Ok(())
    }
}
