//! Backup engine for snapvault
//!
//! # Architecture
//!
//! - [`builder`]: writes a new archive atomically (`create_archive`)
//! - [`restore`]: verifies and extracts an archive (`restore_archive`)
//! - [`retention`]: bounds how many archives a directory keeps
//! - [`manager`]: `BackupManager`, the directory-level facade
//!
//! # Archive Format
//!
//! An archive is a tar stream compressed with zstd. The first entry is
//! `backup.json` holding [`BackupMetadata`]; every following entry is a
//! backed-up file named by its root-relative path. Encrypted archives wrap the
//! compressed bytes in the framed AEAD layer from [`crate::crypto::stream`].
//!
//! # Example
//!
//! ```rust,ignore
//! use snapvault::backup::{create_archive, restore_archive, CreateOptions, RestoreOptions};
//! use snapvault::crypto::SecureString;
//!
//! let passphrase = SecureString::new("correct horse");
//! let report = create_archive(
//!     Path::new("/backups/b1.tar.zst"),
//!     &["/etc/app/config.yml", "/var/lib/app/db"],
//!     Some(&passphrase),
//!     &CreateOptions::default(),
//! )?;
//!
//! let restored = restore_archive(&report.path, Some(&passphrase), &RestoreOptions::into_dir("/tmp/r"))?;
//! println!("{}", restored.summary());
//! ```

pub mod builder;
pub mod manager;
pub mod metadata;
pub mod restore;
pub mod retention;
pub mod walker;

pub use builder::{create_archive, CreateOptions, CreateReport};
pub use manager::{BackupInfo, BackupManager};
pub use metadata::BackupMetadata;
pub use restore::{inspect_archive, restore_archive, RestoreMode, RestoreOptions, RestoreReport};
pub use retention::{cleanup_old_backups, remove_stale_temp_files};
