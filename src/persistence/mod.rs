//! # Persistence Module
//!
//! Saves and restores the mapping set as a single TOML file. The engine treats
//! the stored data as an opaque list of [`DeviceMapping`]s; location and format
//! live entirely here.
//!
//! ## Error Handling Strategy
//! A missing file is an empty mapping set. A file that fails to parse is
//! reported and also treated as empty for this run, so a hand-edited mistake
//! never keeps the application from starting. The bad file is left in place
//! until the next save overwrites it.

pub mod repository;

pub use repository::MappingRepository;

use crate::mapping::DeviceMapping;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("I/O error on {path}: {message}")]
    Io { path: String, message: String },

    /// Stored data exists but could not be parsed
    #[error("Malformed mapping file {path}: {message}")]
    Malformed { path: String, message: String },

    #[error("Failed to serialize mappings: {0}")]
    Serialize(String),
}

/// On-disk layout of the mapping file
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
pub struct MappingFile {
    #[serde(default)]
    pub devices: Vec<DeviceMapping>,
}
