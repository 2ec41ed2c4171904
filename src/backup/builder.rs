//! Archive creation
//!
//! Writes the metadata envelope and every discovered source file into a
//! tar stream, compresses it with zstd and, when a passphrase is given, seals
//! it with the framed AEAD layer. All bytes go to a uniquely named temp file
//! next to the destination, which is renamed into place only once complete.

use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use tar::{EntryType, Header, HeaderMode};
use tempfile::NamedTempFile;

use crate::crypto::key_derivation::DEFAULT_KDF_ITERATIONS;
use crate::crypto::stream::{SealWriter, StreamHeader, DEFAULT_FRAME_SIZE};
use crate::crypto::SecureString;
use crate::error::{BackupError, BackupResult, Phase};

use super::metadata::{BackupMetadata, METADATA_ENTRY};
use super::walker::{collect_sources, SourceFile};

/// Name prefix of in-progress archive files
pub const TEMP_PREFIX: &str = ".snapvault-";

/// Name suffix of in-progress archive files
pub const TEMP_SUFFIX: &str = ".tmp";

/// Default zstd compression level
pub const DEFAULT_COMPRESSION_LEVEL: i32 = 3;

/// Tunables for archive creation
#[derive(Debug, Clone)]
pub struct CreateOptions {
    /// zstd compression level
    pub compression_level: i32,
    /// PBKDF2 iterations for encrypted archives
    pub kdf_iterations: u32,
    /// Plaintext bytes per AEAD frame
    pub frame_size: usize,
}

impl Default for CreateOptions {
    fn default() -> Self {
        Self {
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            kdf_iterations: DEFAULT_KDF_ITERATIONS,
            frame_size: DEFAULT_FRAME_SIZE,
        }
    }
}

/// Outcome of a successful archive creation
#[derive(Debug, Clone)]
pub struct CreateReport {
    /// Path of the committed archive
    pub path: PathBuf,
    /// Metadata written as the first entry
    pub metadata: BackupMetadata,
    /// Number of file entries (excluding metadata)
    pub file_count: usize,
    /// Total size of archived file contents
    pub bytes_in: u64,
    /// Size of the archive on disk
    pub bytes_out: u64,
}

/// Bottom of the write pipeline: the buffered temp file, sealed or not
enum Sink<W: Write> {
    Plain(W),
    Sealed(SealWriter<W>),
}

impl<W: Write> Sink<W> {
    fn finish(self) -> io::Result<W> {
        match self {
            Self::Plain(w) => Ok(w),
            Self::Sealed(s) => s.finish(),
        }
    }
}

impl<W: Write> Write for Sink<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Plain(w) => w.write(buf),
            Self::Sealed(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Plain(w) => w.flush(),
            Self::Sealed(s) => s.flush(),
        }
    }
}

/// Create an archive of `sources` at `destination`.
///
/// An empty or absent passphrase produces an unencrypted archive. On any
/// failure the temp file is removed and `destination` is left as it was.
pub fn create_archive<P: AsRef<Path>>(
    destination: &Path,
    sources: &[P],
    passphrase: Option<&SecureString>,
    options: &CreateOptions,
) -> BackupResult<CreateReport> {
    let passphrase = passphrase.filter(|p| !p.is_empty());

    if !zstd::compression_level_range().contains(&options.compression_level) {
        return Err(BackupError::Config(format!(
            "Unsupported compression level: {}",
            options.compression_level
        )));
    }

    let metadata = BackupMetadata::new(sources, passphrase.is_some(), Utc::now());
    let files = collect_sources(sources)?;

    let parent = match destination.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(|e| BackupError::io(Phase::Prepare, parent, e))?;

    let temp = tempfile::Builder::new()
        .prefix(TEMP_PREFIX)
        .suffix(TEMP_SUFFIX)
        .tempfile_in(parent)
        .map_err(|e| BackupError::io(Phase::Prepare, parent, e))?;
    let temp_path = temp.path().to_path_buf();
    let write_err = |e: io::Error| BackupError::io(Phase::Write, &temp_path, e);

    let buffered = BufWriter::new(temp.as_file());
    let sink = match passphrase {
        Some(pass) => {
            let header = StreamHeader::generate(options.kdf_iterations, options.frame_size)?;
            Sink::Sealed(SealWriter::new(buffered, pass.as_str(), header)?)
        }
        None => Sink::Plain(buffered),
    };

    let encoder = zstd::stream::write::Encoder::new(sink, options.compression_level).map_err(write_err)?;
    let mut archive = tar::Builder::new(encoder);

    append_metadata(&mut archive, &metadata).map_err(write_err)?;

    let mut bytes_in = 0;
    for file in &files {
        bytes_in += append_source(&mut archive, file)?;
    }

    // Close inner to outer: tar trailer, zstd epilogue, final AEAD frame
    let encoder = archive.into_inner().map_err(write_err)?;
    let sink = encoder.finish().map_err(write_err)?;
    let mut buffered = sink.finish().map_err(write_err)?;
    buffered.flush().map_err(write_err)?;
    drop(buffered);

    commit(temp, destination)?;

    let bytes_out = fs::metadata(destination)
        .map(|m| m.len())
        .map_err(|e| BackupError::io(Phase::Commit, destination, e))?;

    tracing::info!(
        path = %destination.display(),
        files = files.len(),
        bytes_in,
        bytes_out,
        encrypted = metadata.encrypted,
        "backup archive created"
    );

    Ok(CreateReport {
        path: destination.to_path_buf(),
        metadata,
        file_count: files.len(),
        bytes_in,
        bytes_out,
    })
}

fn append_metadata<W: Write>(archive: &mut tar::Builder<W>, metadata: &BackupMetadata) -> io::Result<()> {
    let json = serde_json::to_vec_pretty(metadata)?;

    let mut header = Header::new_gnu();
    header.set_entry_type(EntryType::Regular);
    header.set_size(json.len() as u64);
    header.set_mode(0o644);
    header.set_mtime(metadata.created_at.timestamp().max(0) as u64);

    archive.append_data(&mut header, METADATA_ENTRY, json.as_slice())
}

fn append_source<W: Write>(archive: &mut tar::Builder<W>, source: &SourceFile) -> BackupResult<u64> {
    let unreadable = |e: io::Error| BackupError::SourceUnreadable {
        path: source.path.clone(),
        source: e,
    };

    let file = File::open(&source.path).map_err(unreadable)?;
    let meta = file.metadata().map_err(unreadable)?;
    let size = meta.len();

    let mut header = Header::new_gnu();
    header.set_metadata_in_mode(&meta, HeaderMode::Complete);
    header.set_size(size);

    tracing::debug!(path = %source.path.display(), size, "adding entry");

    let mut body = SizedReader::new(file, size);
    match archive.append_data(&mut header, &source.entry_name, &mut body) {
        Ok(()) => Ok(size),
        Err(e) if body.fell_short() => Err(unreadable(e)),
        Err(e) => Err(BackupError::io(Phase::Write, &source.path, e)),
    }
}

/// Yields exactly `remaining` bytes of `inner`.
///
/// Extra bytes from a file growing mid-read are ignored. Running out before
/// the size written to the tar header is an error.
struct SizedReader<R> {
    inner: R,
    remaining: u64,
    short: bool,
}

impl<R: Read> SizedReader<R> {
    fn new(inner: R, size: u64) -> Self {
        Self {
            inner,
            remaining: size,
            short: false,
        }
    }

    fn fell_short(&self) -> bool {
        self.short
    }
}

impl<R: Read> Read for SizedReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.remaining == 0 || buf.is_empty() {
            return Ok(0);
        }
        let max = buf.len().min(usize::try_from(self.remaining).unwrap_or(usize::MAX));
        let n = self.inner.read(&mut buf[..max])?;
        if n == 0 {
            self.short = true;
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("file shrank while being read, {} bytes missing", self.remaining),
            ));
        }
        self.remaining -= n as u64;
        Ok(n)
    }
}

/// Sync the finished temp file and rename it onto `destination`
fn commit(temp: NamedTempFile, destination: &Path) -> BackupResult<()> {
    temp.as_file()
        .sync_all()
        .map_err(|e| BackupError::io(Phase::Commit, temp.path(), e))?;

    // On failure the returned NamedTempFile is dropped, deleting the temp file
    temp.persist(destination)
        .map_err(|e| BackupError::io(Phase::Commit, destination, e.error))?;

    sync_parent_dir(destination);
    Ok(())
}

/// Best effort; a failed sync does not undo the rename
#[cfg(unix)]
fn sync_parent_dir(path: &Path) {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if let Err(e) = File::open(parent).and_then(|dir| dir.sync_all()) {
            tracing::debug!(dir = %parent.display(), error = %e, "directory sync failed");
        }
    }
}

#[cfg(not(unix))]
fn sync_parent_dir(_path: &Path) {}
