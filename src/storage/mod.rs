//! Storage layer for snapvault
//!
//! JSON persistence with atomic writes, used for the settings file.

pub mod file_io;

pub use file_io::{read_json, write_json_atomic};
