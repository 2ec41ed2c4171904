//! Retention garbage collection
//!
//! Bounds the number of archives kept in a backup directory and sweeps temp
//! files abandoned by interrupted creates.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};

use crate::error::{BackupError, BackupResult, Phase};

use super::builder::{TEMP_PREFIX, TEMP_SUFFIX};

/// File name prefix of managed archives
pub const ARCHIVE_PREFIX: &str = "backup-";

/// File name extension of managed archives
pub const ARCHIVE_EXTENSION: &str = ".tar.zst";

/// Age after which an abandoned temp file is removed
pub const STALE_TEMP_AGE: Duration = Duration::from_secs(60 * 60);

/// Build an archive file name for `timestamp`: `backup-YYYYMMDD-HHMMSS-mmm.tar.zst`
pub fn archive_file_name(timestamp: DateTime<Utc>) -> String {
    format!(
        "{}{}-{:03}{}",
        ARCHIVE_PREFIX,
        timestamp.format("%Y%m%d-%H%M%S"),
        timestamp.timestamp_subsec_millis(),
        ARCHIVE_EXTENSION
    )
}

/// Parse the timestamp out of an archive file name, if it follows the convention
pub fn parse_archive_file_name(filename: &str) -> Option<DateTime<Utc>> {
    let date_str = filename
        .strip_prefix(ARCHIVE_PREFIX)?
        .strip_suffix(ARCHIVE_EXTENSION)?;

    // Expected format: YYYYMMDD-HHMMSS or YYYYMMDD-HHMMSS-mmm
    let parts: Vec<&str> = date_str.split('-').collect();
    if parts.len() < 2 || parts.len() > 3 {
        return None;
    }

    let date_part = parts[0];
    let time_part = parts[1];
    let millis: u32 = match parts.get(2) {
        Some(ms) if ms.len() == 3 => ms.parse().ok()?,
        Some(_) => return None,
        None => 0,
    };

    if date_part.len() != 8 || time_part.len() != 6 {
        return None;
    }

    let year: i32 = date_part[0..4].parse().ok()?;
    let month: u32 = date_part[4..6].parse().ok()?;
    let day: u32 = date_part[6..8].parse().ok()?;
    let hour: u32 = time_part[0..2].parse().ok()?;
    let minute: u32 = time_part[2..4].parse().ok()?;
    let second: u32 = time_part[4..6].parse().ok()?;

    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    let time = NaiveTime::from_hms_milli_opt(hour, minute, second, millis)?;

    Some(DateTime::from_naive_utc_and_offset(
        NaiveDateTime::new(date, time),
        Utc,
    ))
}

/// A managed archive found on disk
#[derive(Debug, Clone)]
pub(crate) struct ArchiveFile {
    pub path: PathBuf,
    pub filename: String,
    pub created_at: DateTime<Utc>,
    pub modified: SystemTime,
    pub size_bytes: u64,
}

/// List archives in `dir` that follow the naming convention, oldest first by mtime
pub(crate) fn list_archives(dir: &Path) -> BackupResult<Vec<ArchiveFile>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let read_err = |e| BackupError::io(Phase::Cleanup, dir, e);
    let mut archives = Vec::new();

    for entry in fs::read_dir(dir).map_err(read_err)? {
        let entry = entry.map_err(read_err)?;
        let filename = entry.file_name().to_string_lossy().into_owned();
        let Some(created_at) = parse_archive_file_name(&filename) else {
            continue;
        };

        // Vanished between listing and stat; nothing to manage
        let Ok(metadata) = entry.metadata() else {
            continue;
        };
        if !metadata.is_file() {
            continue;
        }

        archives.push(ArchiveFile {
            path: entry.path(),
            filename,
            created_at,
            modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            size_bytes: metadata.len(),
        });
    }

    archives.sort_by(|a, b| {
        a.modified
            .cmp(&b.modified)
            .then_with(|| a.filename.cmp(&b.filename))
    });

    Ok(archives)
}

/// Delete the oldest archives in `directory` so at most `keep_count` remain.
///
/// Returns the paths deleted. A single failed deletion is logged and skipped.
/// Stale temp files older than [`STALE_TEMP_AGE`] are swept as well.
pub fn cleanup_old_backups(directory: &Path, keep_count: usize) -> BackupResult<Vec<PathBuf>> {
    remove_stale_temp_files(directory, STALE_TEMP_AGE)?;

    let archives = list_archives(directory)?;
    if archives.len() <= keep_count {
        return Ok(Vec::new());
    }

    let excess = archives.len() - keep_count;
    let mut deleted = Vec::with_capacity(excess);

    for archive in archives.into_iter().take(excess) {
        match fs::remove_file(&archive.path) {
            Ok(()) => {
                tracing::info!(path = %archive.path.display(), "deleted old backup");
                deleted.push(archive.path);
            }
            Err(e) => {
                tracing::warn!(path = %archive.path.display(), error = %e, "failed to delete old backup");
            }
        }
    }

    Ok(deleted)
}

/// Remove temp files left in `directory` by creates that never committed
pub fn remove_stale_temp_files(directory: &Path, older_than: Duration) -> BackupResult<Vec<PathBuf>> {
    if !directory.exists() {
        return Ok(Vec::new());
    }

    let read_err = |e| BackupError::io(Phase::Cleanup, directory, e);
    let now = SystemTime::now();
    let mut removed = Vec::new();

    for entry in fs::read_dir(directory).map_err(read_err)? {
        let entry = entry.map_err(read_err)?;
        let filename = entry.file_name().to_string_lossy().into_owned();
        if !filename.starts_with(TEMP_PREFIX) || !filename.ends_with(TEMP_SUFFIX) {
            continue;
        }

        let Ok(metadata) = entry.metadata() else {
            continue;
        };
        let age = metadata
            .modified()
            .ok()
            .and_then(|m| now.duration_since(m).ok())
            .unwrap_or_default();
        if !metadata.is_file() || age < older_than {
            continue;
        }

        match fs::remove_file(entry.path()) {
            Ok(()) => {
                tracing::warn!(path = %entry.path().display(), "removed abandoned temp file");
                removed.push(entry.path());
            }
            Err(e) => {
                tracing::warn!(path = %entry.path().display(), error = %e, "failed to remove temp file");
            }
        }
    }

    Ok(removed)
}
