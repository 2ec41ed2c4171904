//! Archive metadata envelope
//!
//! The metadata is the first entry of every archive body and the only entry
//! a restore treats specially.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Entry name of the metadata envelope inside the archive
pub const METADATA_ENTRY: &str = "backup.json";

/// Version string written into new archives
pub const ARCHIVE_FORMAT_VERSION: &str = "1.0";

/// Metadata describing a backup archive
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupMetadata {
    /// Archive format version
    pub version: String,
    /// When the backup was created
    pub created_at: DateTime<Utc>,
    /// Whether the body is sealed with a passphrase
    pub encrypted: bool,
    /// Whether the body is compressed
    pub compressed: bool,
    /// Source paths exactly as the caller passed them
    pub files: Vec<String>,
    /// Free-form annotations (hostname, tool version)
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl BackupMetadata {
    /// Build metadata for a new archive
    pub fn new<P: AsRef<Path>>(sources: &[P], encrypted: bool, created_at: DateTime<Utc>) -> Self {
        let mut metadata = BTreeMap::new();
        metadata.insert("hostname".to_string(), local_hostname());
        metadata.insert(
            "snapvault_version".to_string(),
            env!("CARGO_PKG_VERSION").to_string(),
        );

        Self {
            version: ARCHIVE_FORMAT_VERSION.to_string(),
            created_at,
            encrypted,
            compressed: true,
            files: sources
                .iter()
                .map(|p| p.as_ref().to_string_lossy().into_owned())
                .collect(),
            metadata,
        }
    }

    /// Hostname recorded at creation, if any
    pub fn hostname(&self) -> Option<&str> {
        self.metadata.get("hostname").map(String::as_str)
    }
}

fn local_hostname() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "unknown".to_string())
}
