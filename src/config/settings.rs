//! User settings for snapvault
//!
//! Manages backup sources, the backup directory, retention and encryption
//! tunables. Stored as `config.json` in the base directory.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::paths::SnapvaultPaths;
use crate::backup::builder::{CreateOptions, DEFAULT_COMPRESSION_LEVEL};
use crate::crypto::key_derivation::{KdfParams, DEFAULT_KDF_ITERATIONS};
use crate::error::{BackupError, BackupResult, Phase};
use crate::storage::{read_json, write_json_atomic};

/// Backup retention settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupRetention {
    /// Number of most recent archives to keep
    #[serde(default = "default_keep_count")]
    pub keep_count: usize,
}

impl Default for BackupRetention {
    fn default() -> Self {
        Self {
            keep_count: default_keep_count(),
        }
    }
}

/// Encryption settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionSettings {
    /// PBKDF2 iterations written into new encrypted archives
    #[serde(default = "default_kdf_iterations")]
    pub kdf_iterations: u32,
}

impl Default for EncryptionSettings {
    fn default() -> Self {
        Self {
            kdf_iterations: default_kdf_iterations(),
        }
    }
}

/// User settings for snapvault
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Schema version for migration support
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,

    /// Where managed archives live; defaults to `<base>/backups`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_dir: Option<PathBuf>,

    /// Files and directories backed up when none are given on the command line
    #[serde(default)]
    pub sources: Vec<PathBuf>,

    /// Backup retention policy
    #[serde(default)]
    pub retention: BackupRetention,

    #[serde(default)]
    pub encryption: EncryptionSettings,

    /// zstd level for new archives
    #[serde(default = "default_compression_level")]
    pub compression_level: i32,
}

fn default_schema_version() -> u32 {
    1
}

fn default_keep_count() -> usize {
    10
}

fn default_kdf_iterations() -> u32 {
    DEFAULT_KDF_ITERATIONS
}

fn default_compression_level() -> i32 {
    DEFAULT_COMPRESSION_LEVEL
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            schema_version: default_schema_version(),
            backup_dir: None,
            sources: Vec::new(),
            retention: BackupRetention::default(),
            encryption: EncryptionSettings::default(),
            compression_level: default_compression_level(),
        }
    }
}

impl Settings {
    /// Load settings from disk, or default settings if the file doesn't exist
    pub fn load_or_create(paths: &SnapvaultPaths) -> BackupResult<Self> {
        let settings: Settings = read_json(paths.settings_file())?;
        settings.validate()?;
        Ok(settings)
    }

    /// Save settings to disk
    pub fn save(&self, paths: &SnapvaultPaths) -> BackupResult<()> {
        self.validate()?;
        paths.ensure_directories()?;
        write_json_atomic(paths.settings_file(), self)
    }

    /// Reject values the engine would refuse at create time
    pub fn validate(&self) -> BackupResult<()> {
        KdfParams::with_values([0u8; 32], self.encryption.kdf_iterations)
            .validate(Phase::Prepare)
            .map_err(|_| {
                BackupError::Config(format!(
                    "kdf_iterations out of range: {}",
                    self.encryption.kdf_iterations
                ))
            })?;

        if !zstd::compression_level_range().contains(&self.compression_level) {
            return Err(BackupError::Config(format!(
                "compression_level out of range: {}",
                self.compression_level
            )));
        }
        Ok(())
    }

    /// Resolve the backup directory against the base paths
    pub fn resolve_backup_dir(&self, paths: &SnapvaultPaths) -> PathBuf {
        self.backup_dir
            .clone()
            .unwrap_or_else(|| paths.backup_dir())
    }

    /// Archive creation options derived from these settings
    pub fn create_options(&self) -> CreateOptions {
        CreateOptions {
            compression_level: self.compression_level,
            kdf_iterations: self.encryption.kdf_iterations,
            ..CreateOptions::default()
        }
    }
}
