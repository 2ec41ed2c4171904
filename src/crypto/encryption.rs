//! AES-256-GCM encryption/decryption
//!
//! Provides authenticated encryption for archive payloads. `ArchiveCipher`
//! seals single messages under an explicit nonce and AAD and is shared with
//! the framed stream layer. `encrypt`/`decrypt` seal a whole buffer in one
//! operation under a freshly derived key.

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};

use crate::error::{BackupError, BackupResult, Phase};

use super::key_derivation::{derive_key, random_bytes, DerivedKey, KdfParams, SALT_SIZE};

/// Size of the AES-GCM nonce in bytes (96 bits)
pub const NONCE_SIZE: usize = 12;

/// Size of the AES-GCM authentication tag in bytes
pub const TAG_SIZE: usize = 16;

/// AES-256-GCM keyed from a passphrase-derived key
pub struct ArchiveCipher {
    cipher: Aes256Gcm,
}

impl ArchiveCipher {
    /// Create a cipher from a derived key
    pub fn new(key: &DerivedKey) -> BackupResult<Self> {
        let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
            .map_err(|e| BackupError::Encryption(format!("Failed to create cipher: {}", e)))?;
        Ok(Self { cipher })
    }

    /// Seal `plaintext`, returning ciphertext with the tag appended
    pub fn seal(&self, nonce: &[u8; NONCE_SIZE], aad: &[u8], plaintext: &[u8]) -> BackupResult<Vec<u8>> {
        self.cipher
            .encrypt(
                Nonce::from_slice(nonce),
                Payload {
                    msg: plaintext,
                    aad,
                },
            )
            .map_err(|e| BackupError::Encryption(format!("Encryption failed: {}", e)))
    }

    /// Open `ciphertext`; any tag mismatch is an authentication failure
    pub fn open(&self, nonce: &[u8; NONCE_SIZE], aad: &[u8], ciphertext: &[u8]) -> BackupResult<Vec<u8>> {
        self.cipher
            .decrypt(
                Nonce::from_slice(nonce),
                Payload {
                    msg: ciphertext,
                    aad,
                },
            )
            .map_err(|_| BackupError::Authentication)
    }
}

/// A whole payload sealed in one AEAD operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedPayload {
    /// Salt and iteration count the key was derived with
    pub kdf: KdfParams,
    /// Random nonce, fresh per call
    pub nonce: [u8; NONCE_SIZE],
    /// Ciphertext followed by the 16-byte tag
    pub ciphertext: Vec<u8>,
}

impl SealedPayload {
    /// Serialize as `SALT || NONCE || ciphertext||tag`
    ///
    /// The iteration count is not part of this layout; callers reading it back
    /// must supply the count it was sealed with.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(SALT_SIZE + NONCE_SIZE + self.ciphertext.len());
        out.extend_from_slice(&self.kdf.salt);
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.ciphertext);
        out
    }

    /// Parse the layout written by [`SealedPayload::to_bytes`]
    pub fn from_bytes(bytes: &[u8], iterations: u32) -> BackupResult<Self> {
        if bytes.len() < SALT_SIZE + NONCE_SIZE + TAG_SIZE {
            return Err(BackupError::format(
                Phase::Read,
                format!("sealed payload too short: {} bytes", bytes.len()),
            ));
        }
        let (salt, rest) = bytes.split_at(SALT_SIZE);
        let (nonce, ciphertext) = rest.split_at(NONCE_SIZE);

        let mut salt_arr = [0u8; SALT_SIZE];
        salt_arr.copy_from_slice(salt);
        let mut nonce_arr = [0u8; NONCE_SIZE];
        nonce_arr.copy_from_slice(nonce);

        let kdf = KdfParams::with_values(salt_arr, iterations);
        kdf.validate(Phase::Read)?;

        Ok(Self {
            kdf,
            nonce: nonce_arr,
            ciphertext: ciphertext.to_vec(),
        })
    }
}

/// Encrypt plaintext in a single AEAD operation
///
/// Generates a random salt and nonce for each call.
pub fn encrypt(plaintext: &[u8], passphrase: &str, iterations: u32) -> BackupResult<SealedPayload> {
    let kdf = KdfParams::generate(iterations)?;
    let nonce: [u8; NONCE_SIZE] = random_bytes()?;

    let key = derive_key(passphrase, &kdf);
    let ciphertext = ArchiveCipher::new(&key)?.seal(&nonce, &[], plaintext)?;

    Ok(SealedPayload {
        kdf,
        nonce,
        ciphertext,
    })
}

/// Decrypt a payload produced by [`encrypt`]
pub fn decrypt(sealed: &SealedPayload, passphrase: &str) -> BackupResult<Vec<u8>> {
    sealed.kdf.validate(Phase::Read)?;
    if sealed.ciphertext.len() < TAG_SIZE {
        return Err(BackupError::Authentication);
    }

    let key = derive_key(passphrase, &sealed.kdf);
    ArchiveCipher::new(&key)?.open(&sealed.nonce, &[], &sealed.ciphertext)
}
