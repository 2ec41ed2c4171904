//! Key derivation using PBKDF2-HMAC-SHA256
//!
//! Derives archive encryption keys from user passphrases. The iteration count
//! travels with each archive so the default can be raised later without
//! breaking archives written under an older one.

use aes_gcm::aead::{rand_core::RngCore, OsRng};
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{BackupError, BackupResult, Phase};

/// Salt length in bytes
pub const SALT_SIZE: usize = 32;

/// Derived key length in bytes (AES-256)
pub const KEY_SIZE: usize = 32;

/// Iteration count used for new archives
pub const DEFAULT_KDF_ITERATIONS: u32 = 100_000;

/// Lowest iteration count accepted from an archive header
pub const MIN_KDF_ITERATIONS: u32 = 1_000;

/// Highest iteration count accepted from an archive header
pub const MAX_KDF_ITERATIONS: u32 = 10_000_000;

/// Parameters for key derivation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KdfParams {
    /// Random salt, fresh per archive
    pub salt: [u8; SALT_SIZE],
    /// PBKDF2 iteration count
    pub iterations: u32,
}

impl KdfParams {
    /// Create params with a fresh random salt
    pub fn generate(iterations: u32) -> BackupResult<Self> {
        let params = Self {
            salt: random_bytes()?,
            iterations,
        };
        params.validate(Phase::Prepare)?;
        Ok(params)
    }

    /// Create params from values read back from an archive
    pub fn with_values(salt: [u8; SALT_SIZE], iterations: u32) -> Self {
        Self { salt, iterations }
    }

    /// Check the iteration count is within the accepted bounds
    pub fn validate(&self, phase: Phase) -> BackupResult<()> {
        if !(MIN_KDF_ITERATIONS..=MAX_KDF_ITERATIONS).contains(&self.iterations) {
            return Err(BackupError::format(
                phase,
                format!(
                    "KDF iteration count {} outside {}..={}",
                    self.iterations, MIN_KDF_ITERATIONS, MAX_KDF_ITERATIONS
                ),
            ));
        }
        Ok(())
    }
}

/// A derived encryption key, zeroed when dropped
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct DerivedKey {
    key: [u8; KEY_SIZE],
}

impl DerivedKey {
    /// Get the key bytes
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.key
    }
}

/// Derive an encryption key from a passphrase
pub fn derive_key(passphrase: &str, params: &KdfParams) -> DerivedKey {
    let mut key = [0u8; KEY_SIZE];
    pbkdf2::pbkdf2_hmac::<Sha256>(
        passphrase.as_bytes(),
        &params.salt,
        params.iterations,
        &mut key,
    );
    DerivedKey { key }
}

/// Fill a fixed-size array from the OS random number generator
pub(crate) fn random_bytes<const N: usize>() -> BackupResult<[u8; N]> {
    let mut bytes = [0u8; N];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| BackupError::Encryption(format!("Random number generator failed: {}", e)))?;
    Ok(bytes)
}
