//! Certificate store backends (SPEC_FULL.md §B "folder-reloaded stores").

use std::fs;
use std::path::PathBuf;

/// Source of trust anchors, intermediate issuers, and revocation entries
/// for the chain validator.
///
/// Implementations may reload their lists from disk on every call
/// (`FolderCertificateStore`) or simply return a fixed in-memory set
/// (`MemoryCertificateStore`), mirroring the open62541 PKI plugin's
/// `reloadCertificates` hook (`examples/original_source` `ua_pki_default.c`).
pub trait CertificateStore: Send + Sync {
    /// DER-encoded trust anchor certificates.
    fn trust_anchors(&self) -> Vec<Vec<u8>>;
    /// DER-encoded intermediate issuer certificates.
    fn issuers(&self) -> Vec<Vec<u8>>;
    /// DER-encoded revocation list entries (CRLs).
    fn revocation_lists(&self) -> Vec<Vec<u8>>;
}

/// A fixed, in-memory certificate store; never reloads.
#[derive(Debug, Clone, Default)]
pub struct MemoryCertificateStore {
    trust_anchors: Vec<Vec<u8>>,
    issuers: Vec<Vec<u8>>,
    revocation_lists: Vec<Vec<u8>>,
}

impl MemoryCertificateStore {
    /// Build a store from explicit lists.
    pub fn new(trust_anchors: Vec<Vec<u8>>, issuers: Vec<Vec<u8>>, revocation_lists: Vec<Vec<u8>>) -> Self {
        Self {
            trust_anchors,
            issuers,
            revocation_lists,
        }
    }
}

impl CertificateStore for MemoryCertificateStore {
    fn trust_anchors(&self) -> Vec<Vec<u8>> {
        self.trust_anchors.clone()
    }

    fn issuers(&self) -> Vec<Vec<u8>> {
        self.issuers.clone()
    }

    fn revocation_lists(&self) -> Vec<Vec<u8>> {
        self.revocation_lists.clone()
    }
}

/// A store backed by three directories of DER (`.der`/`.crt`/`.crl`) files,
/// re-read from disk on every call (SPEC_FULL.md §B).
#[derive(Debug, Clone)]
pub struct FolderCertificateStore {
    trust_dir: PathBuf,
    issuers_dir: PathBuf,
    crl_dir: PathBuf,
}

impl FolderCertificateStore {
    /// Point the store at three folders holding trust anchors, issuers, and
    /// CRLs respectively.
    pub fn new(trust_dir: impl Into<PathBuf>, issuers_dir: impl Into<PathBuf>, crl_dir: impl Into<PathBuf>) -> Self {
        Self {
            trust_dir: trust_dir.into(),
            issuers_dir: issuers_dir.into(),
            crl_dir: crl_dir.into(),
        }
    }

    fn read_dir(dir: &PathBuf) -> Vec<Vec<u8>> {
        let Ok(entries) = fs::read_dir(dir) else {
            return Vec::new();
        };
        entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_file())
            .filter_map(|entry| fs::read(entry.path()).ok())
            .collect()
    }
}

impl CertificateStore for FolderCertificateStore {
    fn trust_anchors(&self) -> Vec<Vec<u8>> {
        Self::read_dir(&self.trust_dir)
    }

    fn issuers(&self) -> Vec<Vec<u8>> {
        Self::read_dir(&self.issuers_dir)
    }

    fn revocation_lists(&self) -> Vec<Vec<u8>> {
        Self::read_dir(&self.crl_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_returns_fixed_lists() {
        let store = MemoryCertificateStore::new(vec![vec![1]], vec![vec![2]], vec![]);
        assert_eq!(store.trust_anchors(), vec![vec![1]]);
        assert_eq!(store.issuers(), vec![vec![2]]);
        assert!(store.revocation_lists().is_empty());
    }

    #[test]
    fn folder_store_on_missing_directory_returns_empty() {
        let store = FolderCertificateStore::new("/nonexistent/a", "/nonexistent/b", "/nonexistent/c");
        assert!(store.trust_anchors().is_empty());
        assert!(store.issuers().is_empty());
    }
}
