//! GrblKit Settings Crate
//!
//! Loads, validates and saves the connection and streaming configuration.

pub mod config;
pub mod error;

pub use config::{Config, ConnectionSettings, StreamingSettings};
pub use error::{SettingsError, SettingsResult};
