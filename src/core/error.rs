//! Error types for the carving core

use thiserror::Error;

use crate::streaming::disk_io::CodecError;

/// Main error type for the crate
#[derive(Debug, Error)]
pub enum Error {
    #[error("GPU error: {0}")]
    Gpu(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Invalid chunk dimensions {x}x{y}x{z}")]
    InvalidDimensions { x: u32, y: u32, z: u32 },

    #[error("Config error: {0}")]
    Config(String),

    #[error("Persistence worker error: {0}")]
    Worker(String),
}
