//! Framed streaming AEAD
//!
//! Encrypted archives are sealed as a sequence of AES-256-GCM frames so that
//! neither writing nor reading has to hold the whole payload in memory.
//!
//! ```text
//! header: "SVLT" | version u8 | kdf iterations u32 BE | frame size u32 BE | salt (32) | base nonce (12)
//! frame:  word u32 BE (bit 31 = final, bits 0..30 = ciphertext length) | ciphertext||tag
//! ```
//!
//! Frame `n` is sealed under the base nonce with `n` XORed into bytes 4..12 and
//! AAD `header || n (u64 BE) || final (u8)`. Every stream ends with exactly one
//! final frame, so truncation, reordering and header edits all fail
//! authentication.

use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;

use crate::error::{AuthenticationFailed, BackupError, BackupResult, Phase};

use super::encryption::{ArchiveCipher, NONCE_SIZE, TAG_SIZE};
use super::key_derivation::{derive_key, random_bytes, KdfParams, SALT_SIZE};

/// Leading bytes of every encrypted archive
pub const MAGIC: [u8; 4] = *b"SVLT";

/// Current header layout version
pub const HEADER_VERSION: u8 = 1;

/// Encoded header length in bytes
pub const HEADER_SIZE: usize = 4 + 1 + 4 + 4 + SALT_SIZE + NONCE_SIZE;

/// Plaintext bytes per frame for new archives
pub const DEFAULT_FRAME_SIZE: usize = 64 * 1024;

/// Largest frame size accepted from a header
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

const FINAL_FLAG: u32 = 1 << 31;

/// Unencrypted prefix of an encrypted archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamHeader {
    pub kdf: KdfParams,
    pub frame_size: u32,
    pub base_nonce: [u8; NONCE_SIZE],
}

impl StreamHeader {
    /// Create a header with fresh salt and base nonce
    pub fn generate(iterations: u32, frame_size: usize) -> BackupResult<Self> {
        if frame_size == 0 || frame_size > MAX_FRAME_SIZE {
            return Err(BackupError::Config(format!(
                "Frame size must be between 1 and {} bytes, got {}",
                MAX_FRAME_SIZE, frame_size
            )));
        }
        Ok(Self {
            kdf: KdfParams::generate(iterations)?,
            frame_size: frame_size as u32,
            base_nonce: random_bytes()?,
        })
    }

    /// Encode the header
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[0..4].copy_from_slice(&MAGIC);
        out[4] = HEADER_VERSION;
        out[5..9].copy_from_slice(&self.kdf.iterations.to_be_bytes());
        out[9..13].copy_from_slice(&self.frame_size.to_be_bytes());
        out[13..13 + SALT_SIZE].copy_from_slice(&self.kdf.salt);
        out[13 + SALT_SIZE..].copy_from_slice(&self.base_nonce);
        out
    }

    /// Decode and sanity-check a header
    pub fn parse(bytes: &[u8; HEADER_SIZE]) -> BackupResult<Self> {
        if bytes[0..4] != MAGIC {
            return Err(BackupError::format(
                Phase::Read,
                "missing encryption header (archive is not encrypted)",
            ));
        }
        if bytes[4] != HEADER_VERSION {
            return Err(BackupError::format(
                Phase::Read,
                format!("unsupported encryption header version: {}", bytes[4]),
            ));
        }

        let iterations = u32::from_be_bytes([bytes[5], bytes[6], bytes[7], bytes[8]]);
        let frame_size = u32::from_be_bytes([bytes[9], bytes[10], bytes[11], bytes[12]]);
        if frame_size == 0 || frame_size as usize > MAX_FRAME_SIZE {
            return Err(BackupError::format(
                Phase::Read,
                format!("invalid frame size in header: {}", frame_size),
            ));
        }

        let mut salt = [0u8; SALT_SIZE];
        salt.copy_from_slice(&bytes[13..13 + SALT_SIZE]);
        let mut base_nonce = [0u8; NONCE_SIZE];
        base_nonce.copy_from_slice(&bytes[13 + SALT_SIZE..]);

        let kdf = KdfParams::with_values(salt, iterations);
        kdf.validate(Phase::Read)?;

        Ok(Self {
            kdf,
            frame_size,
            base_nonce,
        })
    }

    fn frame_nonce(&self, counter: u64) -> [u8; NONCE_SIZE] {
        let mut nonce = self.base_nonce;
        for (byte, c) in nonce[4..].iter_mut().zip(counter.to_be_bytes()) {
            *byte ^= c;
        }
        nonce
    }
}

fn frame_aad(header: &[u8; HEADER_SIZE], counter: u64, last: bool) -> Vec<u8> {
    let mut aad = Vec::with_capacity(HEADER_SIZE + 9);
    aad.extend_from_slice(header);
    aad.extend_from_slice(&counter.to_be_bytes());
    aad.push(last as u8);
    aad
}

fn counter_exhausted() -> io::Error {
    io::Error::new(io::ErrorKind::Other, "frame counter exhausted")
}

/// Writer that seals everything written to it into AEAD frames
pub struct SealWriter<W: Write> {
    inner: W,
    cipher: ArchiveCipher,
    header: StreamHeader,
    header_bytes: [u8; HEADER_SIZE],
    header_written: bool,
    buf: Vec<u8>,
    counter: u64,
}

impl<W: Write> SealWriter<W> {
    /// Wrap `inner`; the header is emitted with the first frame
    pub fn new(inner: W, passphrase: &str, header: StreamHeader) -> BackupResult<Self> {
        let key = derive_key(passphrase, &header.kdf);
        let cipher = ArchiveCipher::new(&key)?;
        let header_bytes = header.to_bytes();
        let frame_size = header.frame_size as usize;

        Ok(Self {
            inner,
            cipher,
            header,
            header_bytes,
            header_written: false,
            buf: Vec::with_capacity(frame_size),
            counter: 0,
        })
    }

    fn seal_frame(&mut self, last: bool) -> io::Result<()> {
        if !self.header_written {
            self.inner.write_all(&self.header_bytes)?;
            self.header_written = true;
        }

        let nonce = self.header.frame_nonce(self.counter);
        let aad = frame_aad(&self.header_bytes, self.counter, last);
        let sealed = self
            .cipher
            .seal(&nonce, &aad, &self.buf)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;

        let mut word = sealed.len() as u32;
        if last {
            word |= FINAL_FLAG;
        }
        self.inner.write_all(&word.to_be_bytes())?;
        self.inner.write_all(&sealed)?;

        self.buf.clear();
        self.counter = self.counter.checked_add(1).ok_or_else(counter_exhausted)?;
        Ok(())
    }

    /// Seal the final frame and hand back the inner writer
    pub fn finish(mut self) -> io::Result<W> {
        self.seal_frame(true)?;
        self.inner.flush()?;
        Ok(self.inner)
    }
}

impl<W: Write> Write for SealWriter<W> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let frame_size = self.header.frame_size as usize;
        let take = (frame_size - self.buf.len()).min(data.len());
        self.buf.extend_from_slice(&data[..take]);
        if self.buf.len() == frame_size {
            self.seal_frame(false)?;
        }
        Ok(take)
    }

    fn flush(&mut self) -> io::Result<()> {
        // Partial frames stay buffered until full or finished
        self.inner.flush()
    }
}

/// Reader that verifies and opens AEAD frames
pub struct OpenReader<R: Read> {
    inner: R,
    cipher: ArchiveCipher,
    header: StreamHeader,
    header_bytes: [u8; HEADER_SIZE],
    counter: u64,
    buf: Vec<u8>,
    pos: usize,
    finished: bool,
}

impl<R: Read> OpenReader<R> {
    /// Read the header, derive the key and authenticate the first frame.
    ///
    /// A wrong passphrase fails here, before any plaintext is released.
    pub fn new(mut inner: R, passphrase: &str) -> BackupResult<Self> {
        let mut header_bytes = [0u8; HEADER_SIZE];
        inner.read_exact(&mut header_bytes).map_err(|e| {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                BackupError::format(Phase::Read, "archive too short for encryption header")
            } else {
                BackupError::from_stream(Phase::Read, "", e)
            }
        })?;
        let header = StreamHeader::parse(&header_bytes)?;

        let key = derive_key(passphrase, &header.kdf);
        let cipher = ArchiveCipher::new(&key)?;

        let mut reader = Self {
            inner,
            cipher,
            header,
            header_bytes,
            counter: 0,
            buf: Vec::new(),
            pos: 0,
            finished: false,
        };
        reader
            .next_frame()
            .map_err(|e| BackupError::from_stream(Phase::Read, "", e))?;
        Ok(reader)
    }

    /// Get the parsed header
    pub fn header(&self) -> &StreamHeader {
        &self.header
    }

    fn read_framed(&mut self, buf: &mut [u8]) -> io::Result<()> {
        self.inner.read_exact(buf).map_err(|e| {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                AuthenticationFailed.into_io()
            } else {
                e
            }
        })
    }

    fn next_frame(&mut self) -> io::Result<()> {
        let mut word = [0u8; 4];
        self.read_framed(&mut word)?;
        let word = u32::from_be_bytes(word);
        let last = word & FINAL_FLAG != 0;
        let len = (word & !FINAL_FLAG) as usize;

        let frame_size = self.header.frame_size as usize;
        if !(TAG_SIZE..=frame_size + TAG_SIZE).contains(&len) {
            return Err(AuthenticationFailed.into_io());
        }

        let mut sealed = vec![0u8; len];
        self.read_framed(&mut sealed)?;

        let nonce = self.header.frame_nonce(self.counter);
        let aad = frame_aad(&self.header_bytes, self.counter, last);
        let plaintext = self
            .cipher
            .open(&nonce, &aad, &sealed)
            .map_err(|_| AuthenticationFailed.into_io())?;
        if !last && plaintext.len() != frame_size {
            return Err(AuthenticationFailed.into_io());
        }

        self.buf = plaintext;
        self.pos = 0;
        self.counter = self.counter.checked_add(1).ok_or_else(counter_exhausted)?;

        if last {
            self.finished = true;
            let mut probe = [0u8; 1];
            if self.inner.read(&mut probe)? != 0 {
                return Err(AuthenticationFailed.into_io());
            }
        }
        Ok(())
    }
}

impl<R: Read> Read for OpenReader<R> {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if out.is_empty() {
            return Ok(0);
        }
        loop {
            if self.pos < self.buf.len() {
                let n = (self.buf.len() - self.pos).min(out.len());
                out[..n].copy_from_slice(&self.buf[self.pos..self.pos + n]);
                self.pos += n;
                return Ok(n);
            }
            if self.finished {
                return Ok(0);
            }
            self.next_frame()?;
        }
    }
}

/// Check whether the file at `path` starts with the encryption header magic
pub fn is_encrypted_archive(path: &Path) -> BackupResult<bool> {
    let mut file = File::open(path).map_err(|e| BackupError::io(Phase::Read, path, e))?;
    let mut magic = [0u8; 4];
    let mut filled = 0;
    while filled < magic.len() {
        let n = file
            .read(&mut magic[filled..])
            .map_err(|e| BackupError::io(Phase::Read, path, e))?;
        if n == 0 {
            return Ok(false);
        }
        filled += n;
    }
    Ok(magic == MAGIC)
}
