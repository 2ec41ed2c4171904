//! Path management for snapvault
//!
//! ## Path Resolution Order
//!
//! 1. `SNAPVAULT_DATA_DIR` environment variable (if set)
//! 2. The platform config directory from `directories::ProjectDirs`
//! 3. `$HOME/.config/snapvault`

use std::ffi::OsString;
use std::fs;
use std::path::PathBuf;

use directories::ProjectDirs;

use crate::error::{BackupError, BackupResult, Phase};

/// Environment variable overriding the base directory
pub const DATA_DIR_ENV: &str = "SNAPVAULT_DATA_DIR";

/// Manages all paths used by snapvault
#[derive(Debug, Clone)]
pub struct SnapvaultPaths {
    /// Base directory for settings and default backups
    base_dir: PathBuf,
}

impl SnapvaultPaths {
    /// Resolve paths from the environment
    ///
    /// # Errors
    ///
    /// Returns an error if no home or config directory can be determined.
    pub fn new() -> BackupResult<Self> {
        let base_dir = resolve_base_dir(std::env::var_os(DATA_DIR_ENV))?;
        Ok(Self { base_dir })
    }

    /// Create SnapvaultPaths with a custom base directory (useful for testing)
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    pub fn base_dir(&self) -> &PathBuf {
        &self.base_dir
    }

    /// Get the default backup directory (`<base>/backups/`)
    pub fn backup_dir(&self) -> PathBuf {
        self.base_dir.join("backups")
    }

    /// Get the path to the settings file
    pub fn settings_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    /// Ensure the base and backup directories exist
    pub fn ensure_directories(&self) -> BackupResult<()> {
        for dir in [self.base_dir.clone(), self.backup_dir()] {
            fs::create_dir_all(&dir).map_err(|e| BackupError::io(Phase::Prepare, &dir, e))?;
        }
        Ok(())
    }
}

fn resolve_base_dir(override_dir: Option<OsString>) -> BackupResult<PathBuf> {
    if let Some(custom) = override_dir.filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(custom));
    }

    if let Some(dirs) = ProjectDirs::from("", "", "snapvault") {
        return Ok(dirs.config_dir().to_path_buf());
    }

    std::env::var_os("HOME")
        .map(|home| PathBuf::from(home).join(".config").join("snapvault"))
        .ok_or_else(|| BackupError::Config("Could not determine a home directory".into()))
}
