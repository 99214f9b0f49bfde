//! Configuration module for certkit
//!
//! Handles loading runtime settings from TOML files.

pub mod settings;

pub use settings::Settings;
