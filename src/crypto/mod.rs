//! Cryptographic functions for snapvault
//!
//! Provides AES-256-GCM encryption with PBKDF2-HMAC-SHA256 key derivation,
//! both as a one-shot seal of a whole buffer and as a framed stream for
//! archives of any size.

pub mod encryption;
pub mod key_derivation;
pub mod secure_memory;
pub mod stream;

pub use encryption::{decrypt, encrypt, ArchiveCipher, SealedPayload};
pub use key_derivation::{derive_key, DerivedKey, KdfParams, DEFAULT_KDF_ITERATIONS};
pub use secure_memory::SecureString;
pub use stream::{is_encrypted_archive, OpenReader, SealWriter, StreamHeader};
