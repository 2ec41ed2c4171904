//! Configuration module for snapvault
//!
//! This module provides configuration management including:
//! - Base directory resolution
//! - User settings persistence

pub mod paths;
pub mod settings;

pub use paths::SnapvaultPaths;
pub use settings::Settings;
