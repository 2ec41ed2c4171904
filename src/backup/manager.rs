//! Backup manager for snapvault
//!
//! Owns a backup directory: writes timestamped archives into it, lists them
//! and enforces the retention policy.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::paths::SnapvaultPaths;
use crate::config::settings::Settings;
use crate::crypto::{is_encrypted_archive, SecureString};
use crate::error::{BackupError, BackupResult};

use super::builder::{create_archive, CreateReport};
use super::retention::{archive_file_name, cleanup_old_backups, list_archives, ArchiveFile};

/// Metadata about a backup on disk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupInfo {
    /// Backup filename
    pub filename: String,
    /// Full path to backup
    pub path: PathBuf,
    /// When the backup was created, as recorded in its name
    pub created_at: DateTime<Utc>,
    /// Last modification time; retention orders by this
    pub modified: DateTime<Utc>,
    /// Size in bytes
    pub size_bytes: u64,
    /// Whether the archive starts with the encrypted stream header
    pub encrypted: bool,
}

impl BackupInfo {
    fn from_archive(archive: ArchiveFile) -> Self {
        // Unreadable headers are listed as plain; restore reports the real error
        let encrypted = is_encrypted_archive(&archive.path).unwrap_or(false);
        Self {
            modified: DateTime::<Utc>::from(archive.modified),
            filename: archive.filename,
            path: archive.path,
            created_at: archive.created_at,
            size_bytes: archive.size_bytes,
            encrypted,
        }
    }
}

/// Manages backup creation and retention
pub struct BackupManager {
    /// Path to backup directory
    backup_dir: PathBuf,
    settings: Settings,
}

impl BackupManager {
    /// Create a new BackupManager
    pub fn new(paths: &SnapvaultPaths, settings: Settings) -> Self {
        let backup_dir = settings.resolve_backup_dir(paths);
        Self {
            backup_dir,
            settings,
        }
    }

    /// Create a manager for an explicit directory
    pub fn with_backup_dir(backup_dir: PathBuf, settings: Settings) -> Self {
        Self {
            backup_dir,
            settings,
        }
    }

    /// Create a backup of `sources`, or of the configured sources when empty
    ///
    /// Returns the report for the created archive.
    pub fn create_backup<P: AsRef<Path>>(
        &self,
        sources: &[P],
        passphrase: Option<&SecureString>,
    ) -> BackupResult<CreateReport> {
        let sources: Vec<PathBuf> = if sources.is_empty() {
            self.settings.sources.clone()
        } else {
            sources.iter().map(|s| s.as_ref().to_path_buf()).collect()
        };

        if sources.is_empty() {
            return Err(BackupError::Config(
                "No sources given and none configured".into(),
            ));
        }

        let destination = self.backup_dir.join(archive_file_name(Utc::now()));
        create_archive(
            &destination,
            &sources,
            passphrase,
            &self.settings.create_options(),
        )
    }

    /// List all available backups, newest first
    pub fn list_backups(&self) -> BackupResult<Vec<BackupInfo>> {
        let mut archives = list_archives(&self.backup_dir)?;
        archives.reverse();
        Ok(archives.into_iter().map(BackupInfo::from_archive).collect())
    }

    /// Enforce retention policy by deleting old backups
    pub fn enforce_retention(&self) -> BackupResult<Vec<PathBuf>> {
        self.enforce_retention_with(self.settings.retention.keep_count)
    }

    /// Enforce retention with an explicit keep count
    pub fn enforce_retention_with(&self, keep_count: usize) -> BackupResult<Vec<PathBuf>> {
        cleanup_old_backups(&self.backup_dir, keep_count)
    }

    /// Create a backup and then enforce retention policy
    pub fn create_backup_with_retention<P: AsRef<Path>>(
        &self,
        sources: &[P],
        passphrase: Option<&SecureString>,
    ) -> BackupResult<(CreateReport, Vec<PathBuf>)> {
        let report = self.create_backup(sources, passphrase)?;
        let deleted = self.enforce_retention()?;
        Ok((report, deleted))
    }

    /// Get backup directory path
    pub fn backup_dir(&self) -> &PathBuf {
        &self.backup_dir
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Get a specific backup by filename
    pub fn get_backup(&self, filename: &str) -> BackupResult<Option<BackupInfo>> {
        Ok(self
            .list_backups()?
            .into_iter()
            .find(|b| b.filename == filename))
    }

    /// Get the most recent backup
    pub fn get_latest_backup(&self) -> BackupResult<Option<BackupInfo>> {
        Ok(self.list_backups()?.into_iter().next())
    }
}
