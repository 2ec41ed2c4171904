//! snapvault - encrypted, compressed file backups
//!
//! This library packs a set of files and directories into a single archive
//! file: a tar stream compressed with zstd and, optionally, sealed with
//! AES-256-GCM under a PBKDF2-derived key. Archives are written atomically,
//! verified in full on restore, and pruned by a count-based retention policy.
//!
//! # Architecture
//!
//! The crate is organized into the following modules:
//!
//! - `backup`: Archive creation, restore, retention and the directory manager
//! - `crypto`: Key derivation and the framed AEAD stream
//! - `config`: Configuration and path management
//! - `storage`: Atomic JSON persistence
//! - `cli`: Command handlers for the `snapvault` binary
//! - `display`: Terminal formatting
//! - `error`: Custom error types
//!
//! # Example
//!
//! ```rust,ignore
//! use snapvault::backup::BackupManager;
//! use snapvault::config::{SnapvaultPaths, Settings};
//!
//! let paths = SnapvaultPaths::new()?;
//! let settings = Settings::load_or_create(&paths)?;
//! let manager = BackupManager::new(&paths, settings);
//! let (report, pruned) = manager.create_backup_with_retention(&["/etc/app"], None)?;
//! ```

pub mod backup;
pub mod cli;
pub mod config;
pub mod crypto;
pub mod display;
pub mod error;
pub mod logging;
pub mod storage;

pub use error::{BackupError, BackupResult, ErrorKind};
