//! Source discovery for backups
//!
//! Expands the caller's source list into the regular files to archive.
//! Directories are walked recursively; only the files beneath them are
//! recorded and the directory structure is implied by entry names.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use walkdir::WalkDir;

use crate::error::{BackupError, BackupResult};

/// A regular file selected for backup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Path on disk
    pub path: PathBuf,
    /// Root-relative name used inside the archive
    pub entry_name: PathBuf,
}

/// Collect every regular file named by `sources`, in a stable order.
///
/// Fails on the first source that cannot be read; no best-effort skipping.
pub fn collect_sources<P: AsRef<Path>>(sources: &[P]) -> BackupResult<Vec<SourceFile>> {
    let mut files = Vec::new();
    let mut seen = HashSet::new();

    for source in sources {
        let source = source.as_ref();
        let metadata = fs::metadata(source).map_err(|e| unreadable(source, e))?;

        if metadata.is_file() {
            push_unique(&mut files, &mut seen, source.to_path_buf())?;
            continue;
        }

        if !metadata.is_dir() {
            return Err(unreadable(
                source,
                io::Error::new(io::ErrorKind::InvalidInput, "not a regular file or directory"),
            ));
        }

        for entry in WalkDir::new(source).follow_links(false).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                let path = e.path().unwrap_or(source).to_path_buf();
                unreadable(&path, e.into())
            })?;

            let file_type = entry.file_type();
            if file_type.is_file() {
                push_unique(&mut files, &mut seen, entry.into_path())?;
            } else if file_type.is_symlink() {
                tracing::debug!(path = %entry.path().display(), "skipping symlink");
            }
        }
    }

    Ok(files)
}

fn push_unique(
    files: &mut Vec<SourceFile>,
    seen: &mut HashSet<PathBuf>,
    path: PathBuf,
) -> BackupResult<()> {
    let entry_name = archive_entry_name(&path).map_err(|e| unreadable(&path, e))?;
    if !seen.insert(entry_name.clone()) {
        tracing::debug!(path = %path.display(), "skipping duplicate source");
        return Ok(());
    }
    files.push(SourceFile { path, entry_name });
    Ok(())
}

fn unreadable(path: &Path, source: io::Error) -> BackupError {
    BackupError::SourceUnreadable {
        path: path.to_path_buf(),
        source,
    }
}

/// Compute the root-relative archive name for a source path.
///
/// The path is made absolute against the working directory and normalized
/// lexically, then its root is stripped: `/etc/app/config.yml` becomes
/// `etc/app/config.yml`.
pub fn archive_entry_name(path: &Path) -> io::Result<PathBuf> {
    let absolute = std::path::absolute(path)?;

    let mut name = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::Prefix(_) | Component::RootDir | Component::CurDir => {}
            Component::ParentDir => {
                name.pop();
            }
            Component::Normal(part) => name.push(part),
        }
    }

    if name.as_os_str().is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "path has no file name",
        ));
    }
    Ok(name)
}
