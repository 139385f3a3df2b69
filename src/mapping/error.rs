//! Error definitions for the mapping module

use thiserror::Error;

/// Errors raised while editing or validating mappings
#[derive(Debug, Error)]
pub enum MappingError {
    /// Key name could not be resolved to a keyboard key or mouse button
    #[error("Invalid key: {0:?}")]
    InvalidKey(String),

    /// Threshold outside of the open interval (0, 1)
    #[error("Invalid threshold {0}: must be between 0 and 1 (exclusive)")]
    InvalidThreshold(f32),

    #[error("Invalid sensitivity {0}: must be greater than 0")]
    InvalidSensitivity(f32),

    #[error("Invalid acceleration {0}: must be greater than 0")]
    InvalidAcceleration(f32),

    #[error("Unknown button index: {0}")]
    UnknownButton(usize),

    /// Stick index outside of the fixed layout
    #[error("Unknown stick index: {0}")]
    UnknownStick(usize),

    /// No mapping exists for the requested device
    #[error("No mappings for device {0}")]
    UnknownDevice(usize),

    /// Communication with the editor worker failed
    #[error("Channel error: {0}")]
    ChannelError(String),

    /// Persisting the mapping set failed
    #[error("Persistence error: {0}")]
    Persistence(String),
}
