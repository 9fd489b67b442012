//! # Magnet Tracker Common Library
//!
//! Shared code for the magnet tracker and anything presenting its state:
//! - Tracking state, provider state and metrics types
//! - Event types (TrackerEvent enum) and the EventBus
//! - Configuration loading
//! - Timestamp and UUID utilities

pub mod config;
pub mod error;
pub mod events;
pub mod time;
pub mod uuid_utils;

pub use error::{Error, Result};
pub use events::{EventBus, ProviderState, TrackerEvent, TrackingMetrics, TrackingState};
