//! Backup restoration for snapvault
//!
//! Reverses archive creation: opens the optional AEAD layer, decompresses,
//! reads the metadata envelope and writes every remaining entry back to disk
//! in archive order.
//!
//! In-place restores are not transactional. Entries written before a later
//! failure stay on disk. Staged restores extract into a scratch directory
//! next to the target and swap it into place only once every entry succeeded.

use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::path::{Component, Path, PathBuf};

use tar::EntryType;

use crate::crypto::stream::{OpenReader, MAGIC};
use crate::crypto::SecureString;
use crate::error::{BackupError, BackupResult, Phase};

use super::metadata::{BackupMetadata, METADATA_ENTRY};

type ArchiveStream = tar::Archive<Box<dyn Read>>;

/// How entries are committed to the target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RestoreMode {
    /// Write each entry directly to its destination
    #[default]
    InPlace,
    /// Extract to a scratch directory, then swap it onto the target
    Staged,
}

/// Where and how to restore
#[derive(Debug, Clone, Default)]
pub struct RestoreOptions {
    /// Re-root every entry under this directory; `None` restores original paths
    pub target_dir: Option<PathBuf>,
    /// Commit strategy
    pub mode: RestoreMode,
}

impl RestoreOptions {
    /// Restore into `dir`, in place
    pub fn into_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            target_dir: Some(dir.into()),
            mode: RestoreMode::InPlace,
        }
    }

    /// Restore into `dir` through a scratch directory
    pub fn staged(dir: impl Into<PathBuf>) -> Self {
        Self {
            target_dir: Some(dir.into()),
            mode: RestoreMode::Staged,
        }
    }
}

/// Result of a restore operation
#[derive(Debug, Clone)]
pub struct RestoreReport {
    /// Metadata read from the archive
    pub metadata: BackupMetadata,
    /// Files written, in archive order
    pub files_restored: Vec<PathBuf>,
    /// Total bytes written
    pub bytes_restored: u64,
}

impl RestoreReport {
    /// Get a summary of what was restored
    pub fn summary(&self) -> String {
        format!(
            "Restored {} file(s), {} bytes, from backup created {}",
            self.files_restored.len(),
            self.bytes_restored,
            self.metadata.created_at.format("%Y-%m-%d %H:%M:%S UTC")
        )
    }
}

/// Restore the archive at `source`
pub fn restore_archive(
    source: &Path,
    passphrase: Option<&SecureString>,
    options: &RestoreOptions,
) -> BackupResult<RestoreReport> {
    match options.mode {
        RestoreMode::InPlace => {
            let root = options
                .target_dir
                .clone()
                .unwrap_or_else(|| PathBuf::from("/"));
            extract(source, passphrase, &root)
        }
        RestoreMode::Staged => {
            let target = options.target_dir.as_deref().ok_or_else(|| {
                BackupError::Config("A staged restore requires a target directory".to_string())
            })?;
            restore_staged(source, passphrase, target)
        }
    }
}

/// Read the metadata envelope, authenticating the whole stream on the way
pub fn inspect_archive(source: &Path, passphrase: Option<&SecureString>) -> BackupResult<BackupMetadata> {
    let mut archive = open_archive(source, passphrase)?;
    let mut entries = archive
        .entries()
        .map_err(|e| BackupError::from_stream(Phase::Read, source, e))?;
    let metadata = read_metadata(&mut entries, source)?;
    drop(entries);

    drain(archive, source)?;
    Ok(metadata)
}

/// Open the decrypt/decompress/deserialize pipeline over `source`
fn open_archive(source: &Path, passphrase: Option<&SecureString>) -> BackupResult<ArchiveStream> {
    let file = File::open(source).map_err(|e| BackupError::io(Phase::Read, source, e))?;
    let mut reader = BufReader::new(file);

    let plain: Box<dyn Read> = match passphrase.filter(|p| !p.is_empty()) {
        Some(pass) => Box::new(
            OpenReader::new(reader, pass.as_str()).map_err(|e| e.with_path(source))?,
        ),
        None => {
            let head = reader
                .fill_buf()
                .map_err(|e| BackupError::io(Phase::Read, source, e))?;
            if head.starts_with(&MAGIC) {
                return Err(BackupError::format(
                    Phase::Read,
                    "archive is encrypted; a passphrase is required",
                ));
            }
            Box::new(reader)
        }
    };

    let decoder = zstd::stream::read::Decoder::new(plain)
        .map_err(|e| BackupError::from_stream(Phase::Read, source, e))?;
    let decoded: Box<dyn Read> = Box::new(decoder);
    Ok(tar::Archive::new(decoded))
}

/// Read whatever follows the tar trailer.
///
/// The final AEAD frame and the trailing-bytes check are only reached once
/// the decrypting reader hits its end, which `tar` never asks for.
fn drain(archive: ArchiveStream, source: &Path) -> BackupResult<()> {
    let mut rest = archive.into_inner();
    io::copy(&mut rest, &mut io::sink())
        .map_err(|e| BackupError::from_stream(Phase::Read, source, e))?;
    Ok(())
}

fn read_metadata<R: Read>(entries: &mut tar::Entries<'_, R>, source: &Path) -> BackupResult<BackupMetadata> {
    let mut entry = match entries.next() {
        Some(entry) => entry.map_err(|e| BackupError::from_stream(Phase::Read, source, e))?,
        None => return Err(BackupError::format(Phase::Read, "archive contains no entries")),
    };

    let name = entry
        .path()
        .map_err(|e| BackupError::from_stream(Phase::Read, source, e))?
        .into_owned();
    if name != Path::new(METADATA_ENTRY) {
        return Err(BackupError::format(
            Phase::Read,
            format!("first entry is {}, expected {}", name.display(), METADATA_ENTRY),
        ));
    }

    serde_json::from_reader(&mut entry).map_err(|e| {
        if e.is_io() {
            BackupError::from_stream(Phase::Read, source, e.into())
        } else {
            BackupError::format(Phase::Read, format!("invalid metadata: {}", e))
        }
    })
}

fn extract(source: &Path, passphrase: Option<&SecureString>, root: &Path) -> BackupResult<RestoreReport> {
    let stream_err = |e: io::Error| BackupError::from_stream(Phase::Read, source, e);

    let mut archive = open_archive(source, passphrase)?;
    let mut entries = archive.entries().map_err(stream_err)?;
    let metadata = read_metadata(&mut entries, source)?;

    let mut files_restored = Vec::new();
    let mut bytes_restored = 0;

    for entry in entries {
        let mut entry = entry.map_err(stream_err)?;
        let name = entry.path().map_err(stream_err)?.into_owned();
        let dest = root.join(sanitize_entry_name(&name)?);

        match entry.header().entry_type() {
            EntryType::Regular | EntryType::Continuous => {}
            EntryType::Directory => {
                fs::create_dir_all(&dest).map_err(|e| BackupError::io(Phase::Extract, &dest, e))?;
                continue;
            }
            other => {
                tracing::warn!(entry = %name.display(), kind = ?other, "skipping unsupported entry");
                continue;
            }
        }

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|e| BackupError::io(Phase::Extract, parent, e))?;
        }

        bytes_restored += write_entry(&mut entry, source, &dest)?;
        restore_mode(&dest, entry.header().mode().ok())?;

        tracing::debug!(path = %dest.display(), "restored entry");
        files_restored.push(dest);
    }

    drain(archive, source)?;

    tracing::info!(
        source = %source.display(),
        files = files_restored.len(),
        bytes = bytes_restored,
        "backup restored"
    );

    Ok(RestoreReport {
        metadata,
        files_restored,
        bytes_restored,
    })
}

/// Copy one entry to `dest`, telling archive read errors from disk write errors
fn write_entry<R: Read>(entry: &mut R, source: &Path, dest: &Path) -> BackupResult<u64> {
    let write_err = |e: io::Error| BackupError::io(Phase::Extract, dest, e);

    let mut out = BufWriter::new(File::create(dest).map_err(write_err)?);
    let mut buf = vec![0u8; 64 * 1024];
    let mut total = 0u64;
    loop {
        let n = entry
            .read(&mut buf)
            .map_err(|e| BackupError::from_stream(Phase::Read, source, e))?;
        if n == 0 {
            break;
        }
        out.write_all(&buf[..n]).map_err(write_err)?;
        total += n as u64;
    }
    out.flush().map_err(write_err)?;
    Ok(total)
}

#[cfg(unix)]
fn restore_mode(dest: &Path, mode: Option<u32>) -> BackupResult<()> {
    use std::os::unix::fs::PermissionsExt;

    if let Some(mode) = mode {
        fs::set_permissions(dest, fs::Permissions::from_mode(mode & 0o7777))
            .map_err(|e| BackupError::io(Phase::Extract, dest, e))?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn restore_mode(_dest: &Path, _mode: Option<u32>) -> BackupResult<()> {
    Ok(())
}

/// Reject entry names that would escape the restore root
fn sanitize_entry_name(name: &Path) -> BackupResult<PathBuf> {
    let mut clean = PathBuf::new();
    for component in name.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            _ => {
                return Err(BackupError::format(
                    Phase::Extract,
                    format!("unsafe entry path: {}", name.display()),
                ))
            }
        }
    }
    if clean.as_os_str().is_empty() {
        return Err(BackupError::format(Phase::Extract, "empty entry path"));
    }
    Ok(clean)
}

fn restore_staged(source: &Path, passphrase: Option<&SecureString>, target: &Path) -> BackupResult<RestoreReport> {
    let parent = match target.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(|e| BackupError::io(Phase::Prepare, parent, e))?;

    // Removed on drop, so a failed extraction leaves nothing behind
    let scratch = tempfile::Builder::new()
        .prefix(".snapvault-restore-")
        .tempdir_in(parent)
        .map_err(|e| BackupError::io(Phase::Prepare, parent, e))?;

    let mut report = extract(source, passphrase, scratch.path())?;
    report.files_restored = report
        .files_restored
        .into_iter()
        .map(|p| match p.strip_prefix(scratch.path()) {
            Ok(rel) => target.join(rel),
            Err(_) => p,
        })
        .collect();

    let previous = if target.exists() {
        let holder = tempfile::Builder::new()
            .prefix(".snapvault-previous-")
            .tempdir_in(parent)
            .map_err(|e| BackupError::io(Phase::Commit, parent, e))?;
        let aside = holder.path().join("previous");
        fs::rename(target, &aside).map_err(|e| BackupError::io(Phase::Commit, target, e))?;
        Some((holder, aside))
    } else {
        None
    };

    if let Err(e) = fs::rename(scratch.path(), target) {
        if let Some((_, aside)) = &previous {
            if let Err(undo) = fs::rename(aside, target) {
                tracing::warn!(
                    target = %target.display(),
                    error = %undo,
                    "failed to put previous contents back"
                );
            }
        }
        return Err(BackupError::io(Phase::Commit, target, e));
    }

    // Dropping the holder deletes the previous contents
    drop(previous);

    tracing::info!(target = %target.display(), "staged restore swapped into place");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::builder::{create_archive, CreateOptions};
    use crate::crypto::key_derivation::MIN_KDF_ITERATIONS;
    use tempfile::TempDir;

    fn fast_options() -> CreateOptions {
        CreateOptions {
            kdf_iterations: MIN_KDF_ITERATIONS,
            ..Default::default()
        }
    }

    fn sample_archive(temp: &TempDir, passphrase: Option<&SecureString>) -> (PathBuf, PathBuf) {
        let src = temp.path().join("src");
        fs::create_dir_all(src.join("db/tables")).unwrap();
        fs::write(src.join("config.yml"), "port: 8080\n").unwrap();
        fs::write(src.join("db/tables/users.dat"), vec![1u8; 300_000]).unwrap();

        let archive = temp.path().join("backups/b1.tar.zst");
        create_archive(&archive, &[&src], passphrase, &fast_options()).unwrap();
        (archive, src)
    }

    fn relative(src: &Path, name: &str) -> PathBuf {
        crate::backup::walker::archive_entry_name(&src.join(name)).unwrap()
    }

    #[test]
    fn test_restore_into_target() {
        let temp = TempDir::new().unwrap();
        let (archive, src) = sample_archive(&temp, None);
        let target = temp.path().join("restored");

        let report = restore_archive(&archive, None, &RestoreOptions::into_dir(&target)).unwrap();

        assert_eq!(report.files_restored.len(), 2);
        assert_eq!(report.bytes_restored, 11 + 300_000);
        assert_eq!(
            fs::read_to_string(target.join(relative(&src, "config.yml"))).unwrap(),
            "port: 8080\n"
        );
        assert_eq!(
            fs::read(target.join(relative(&src, "db/tables/users.dat"))).unwrap(),
            vec![1u8; 300_000]
        );
    }

    #[test]
    fn test_metadata_entry_not_extracted() {
        let temp = TempDir::new().unwrap();
        let (archive, _) = sample_archive(&temp, None);
        let target = temp.path().join("restored");

        restore_archive(&archive, None, &RestoreOptions::into_dir(&target)).unwrap();
        assert!(!target.join(METADATA_ENTRY).exists());
    }

    #[test]
    fn test_inspect_archive() {
        let temp = TempDir::new().unwrap();
        let pass = SecureString::new("pw");
        let (archive, src) = sample_archive(&temp, Some(&pass));

        let metadata = inspect_archive(&archive, Some(&pass)).unwrap();
        assert!(metadata.encrypted);
        assert_eq!(metadata.files, vec![src.to_string_lossy().into_owned()]);
    }

    #[test]
    fn test_encrypted_without_passphrase_is_format_error() {
        let temp = TempDir::new().unwrap();
        let pass = SecureString::new("pw");
        let (archive, _) = sample_archive(&temp, Some(&pass));

        let err = inspect_archive(&archive, None).unwrap_err();
        assert!(err.is_format());
    }

    #[test]
    fn test_garbage_is_format_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("garbage.tar.zst");
        fs::write(&path, b"this is not an archive at all").unwrap();

        let err = inspect_archive(&path, None).unwrap_err();
        assert!(err.is_format());
    }

    #[test]
    fn test_corrupted_ciphertext_is_authentication_error() {
        let temp = TempDir::new().unwrap();
        let pass = SecureString::new("pw");
        let (archive, _) = sample_archive(&temp, Some(&pass));

        let mut bytes = fs::read(&archive).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x55;
        fs::write(&archive, bytes).unwrap();

        let target = temp.path().join("restored");
        let err = restore_archive(&archive, Some(&pass), &RestoreOptions::into_dir(&target)).unwrap_err();
        assert!(err.is_authentication());
    }

    #[test]
    fn test_sanitize_rejects_traversal() {
        assert!(sanitize_entry_name(Path::new("../etc/passwd")).is_err());
        assert!(sanitize_entry_name(Path::new("a/../../b")).is_err());
        assert!(sanitize_entry_name(Path::new("/etc/passwd")).is_err());
        assert_eq!(
            sanitize_entry_name(Path::new("./etc/app/config.yml")).unwrap(),
            PathBuf::from("etc/app/config.yml")
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_file_mode_restored() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let src = temp.path().join("secret.key");
        fs::write(&src, "k").unwrap();
        fs::set_permissions(&src, fs::Permissions::from_mode(0o600)).unwrap();

        let archive = temp.path().join("b.tar.zst");
        create_archive(&archive, &[&src], None, &fast_options()).unwrap();

        let target = temp.path().join("out");
        let report = restore_archive(&archive, None, &RestoreOptions::into_dir(&target)).unwrap();
        let mode = fs::metadata(&report.files_restored[0]).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_staged_restore_replaces_target() {
        let temp = TempDir::new().unwrap();
        let (archive, src) = sample_archive(&temp, None);
        let target = temp.path().join("restored");
        fs::create_dir_all(&target).unwrap();
        fs::write(target.join("stale.txt"), "old").unwrap();

        let report = restore_archive(&archive, None, &RestoreOptions::staged(&target)).unwrap();

        assert!(!target.join("stale.txt").exists());
        assert!(target.join(relative(&src, "config.yml")).exists());
        assert!(report.files_restored.iter().all(|p| p.starts_with(&target)));
        assert!(report.files_restored.iter().all(|p| p.exists()));
    }

    #[test]
    fn test_staged_restore_failure_keeps_target() {
        let temp = TempDir::new().unwrap();
        let pass = SecureString::new("right");
        let (archive, _) = sample_archive(&temp, Some(&pass));
        let target = temp.path().join("restored");
        fs::create_dir_all(&target).unwrap();
        fs::write(target.join("keep.txt"), "keep").unwrap();

        let wrong = SecureString::new("wrong");
        let err = restore_archive(&archive, Some(&wrong), &RestoreOptions::staged(&target)).unwrap_err();

        assert!(err.is_authentication());
        assert_eq!(fs::read_to_string(target.join("keep.txt")).unwrap(), "keep");
        let leftovers = fs::read_dir(temp.path())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().starts_with(".snapvault-"))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn test_staged_requires_target() {
        let temp = TempDir::new().unwrap();
        let (archive, _) = sample_archive(&temp, None);
        let options = RestoreOptions {
            target_dir: None,
            mode: RestoreMode::Staged,
        };
        assert!(matches!(
            restore_archive(&archive, None, &options).unwrap_err(),
            BackupError::Config(_)
        ));
    }
}
