//! Error types for magnet-tracker
//!
//! Start failures are surfaced to observers as `TrackingState::Failed` using
//! the Display text of these variants; they never escape the event loop.

use thiserror::Error;

/// Main error type for the magnet tracker
#[derive(Error, Debug)]
pub enum Error {
    /// Hardware or platform cannot run image tracking
    #[error("image tracking is not supported on this device")]
    Unsupported,

    /// Reference pattern group failed to load or was empty
    #[error("missing or empty reference resource: {0}")]
    ResourceMissing(String),

    /// Subsystem session could not be started
    #[error("session failed to start: {0}")]
    SessionStart(String),

    /// Tracking subsystem reported an error outside session start
    #[error("tracking subsystem error: {0}")]
    Subsystem(String),

    /// Tracker configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Event script loading or validation errors
    #[error("Script error: {0}")]
    Script(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors from the shared library
    #[error(transparent)]
    Common(#[from] magnet_common::Error),
}

/// Convenience Result type using magnet-tracker Error
pub type Result<T> = std::result::Result<T, Error>;
