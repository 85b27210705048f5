//! Upload ledger for incremental FTP deploys.
//!
//! A dev deploy only sends files whose content changed since the last
//! successful upload to the same remote. The ledger remembers, per output
//! file, the SHA-256 of the bytes last uploaded.
//!
//! ## Keys
//!
//! - **`remote`**: `host` + remote path. Deploying the same build to a
//!   different server or directory starts from an empty ledger, so the new
//!   remote receives everything.
//! - **entries**: output-relative path (forward slashes) → content hash.
//!   Content-based rather than mtime-based: a dev rebuild that rewrites a
//!   file with identical bytes does not trigger an upload.
//!
//! ## Storage
//!
//! One JSON file per target in the project root
//! ([`Layout::upload_ledger`](crate::target::Layout::upload_ledger)), outside
//! the output directory so it is never uploaded itself and survives a dist
//! clean. Unreadable, corrupt or outdated ledgers load as empty.

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::path::Path;

/// Bump to invalidate every existing ledger when the key computation changes.
const LEDGER_VERSION: u32 = 1;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct UploadLedger {
    pub version: u32,
    pub remote: String,
    pub entries: HashMap<String, String>,
}

/// Identity of an upload destination.
pub fn remote_key(host: &str, path: &str) -> String {
    format!("{host}:{path}")
}

impl UploadLedger {
    pub fn empty(remote: &str) -> Self {
        Self {
            version: LEDGER_VERSION,
            remote: remote.to_string(),
            entries: HashMap::new(),
        }
    }

    /// Load the ledger for `remote`. Anything recorded for another remote is
    /// discarded.
    pub fn load(path: &Path, remote: &str) -> Self {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(_) => return Self::empty(remote),
        };
        let ledger: Self = match serde_json::from_str(&content) {
            Ok(l) => l,
            Err(e) => {
                tracing::debug!(error = %e, "discarding unreadable upload ledger");
                return Self::empty(remote);
            }
        };
        if ledger.version != LEDGER_VERSION || ledger.remote != remote {
            return Self::empty(remote);
        }
        ledger
    }

    pub fn save(&self, path: &Path) -> io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
    }

    /// True when `relative` was never uploaded or its content changed.
    pub fn needs_upload(&self, relative: &str, hash: &str) -> bool {
        self.entries.get(relative).is_none_or(|h| h != hash)
    }

    pub fn record(&mut self, relative: String, hash: String) {
        self.entries.insert(relative, hash);
    }
}

/// SHA-256 hash of a file's contents, returned as a hex string.
pub fn hash_file(path: &Path) -> io::Result<String> {
    let bytes = std::fs::read(path)?;
    let digest = Sha256::digest(&bytes);
    Ok(format!("{:x}", digest))
}

/// Summary of a deploy run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct UploadStats {
    pub uploaded: u32,
    pub unchanged: u32,
    pub failed: u32,
}

impl UploadStats {
    pub fn total(&self) -> u32 {
        self.uploaded + self.unchanged + self.failed
    }
}

impl fmt::Display for UploadStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.unchanged > 0 {
            write!(
                f,
                "{} uploaded, {} unchanged ({} total)",
                self.uploaded,
                self.unchanged,
                self.total()
            )?;
        } else {
            write!(f, "{} uploaded", self.uploaded)?;
        }
        if self.failed > 0 {
            write!(f, ", {} failed", self.failed)?;
        }
        Ok(())
    }
}
