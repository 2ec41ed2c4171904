//! Display formatting for terminal output
//!
//! Provides utilities for formatting backups and operation reports for
//! terminal display.

pub mod backup;

pub use backup::{
    format_backup_list, format_create_report, format_duration, format_metadata,
    format_restore_report, format_size,
};
