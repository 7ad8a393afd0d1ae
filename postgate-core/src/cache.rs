//! File-backed response cache.
//!
//! Entries are encoded envelopes stored under
//! `<root>/api/<ab>/<cd>/<fingerprint>.json`, where `ab` and `cd` are the
//! first four hex digits of the fingerprint. Freshness comes from the file's
//! modification time; entries are never evicted one by one, only purged as a
//! whole.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::clock::SharedClock;
use crate::envelope::Envelope;

const NAMESPACE: &str = "api";

/// Stable identity of a cacheable request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn new(tenant: &str, endpoint: &str, params: &BTreeMap<String, String>) -> Self {
        // BTreeMap serializes with sorted keys
        let canonical = serde_json::to_string(params).unwrap_or_default();
        let digest = Sha256::digest(format!("{tenant}|{endpoint}|{canonical}").as_bytes());
        Fingerprint(format!("{digest:x}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn relative_path(&self) -> PathBuf {
        let id = self.0.as_str();
        PathBuf::from(NAMESPACE)
            .join(&id[0..2])
            .join(&id[2..4])
            .join(format!("{id}.json"))
    }
}

#[derive(Debug, Clone)]
pub struct ResponseCache {
    root: Option<PathBuf>,
    clock: SharedClock,
}

impl ResponseCache {
    pub fn new(root: Option<PathBuf>, clock: SharedClock) -> Self {
        Self { root, clock }
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    /// Opens the slot for `fingerprint`.
    ///
    /// The slot is disabled unless the endpoint is cache eligible, `ttl` is
    /// positive, and the cache root is a writable directory. A disabled slot
    /// is always expired, never reads a value and never writes one.
    pub async fn entry(&self, fingerprint: Fingerprint, ttl: u64, eligible: bool) -> CacheEntry {
        let path = match &self.root {
            Some(root) if eligible && ttl > 0 && is_writable_dir(root).await => {
                Some(root.join(fingerprint.relative_path()))
            }
            _ => None,
        };
        CacheEntry {
            fingerprint,
            path,
            ttl,
            clock: self.clock.clone(),
        }
    }

    /// Removes every cached response.
    pub async fn purge_all(&self) -> anyhow::Result<()> {
        let Some(root) = &self.root else {
            return Ok(());
        };
        let namespace = root.join(NAMESPACE);
        match tokio::fs::remove_dir_all(&namespace).await {
            Ok(()) => {
                info!(path = %namespace.display(), "purged response cache");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(anyhow::anyhow!(
                "failed to purge cache at {}: {e}",
                namespace.display()
            )),
        }
    }
}

async fn is_writable_dir(path: &Path) -> bool {
    match tokio::fs::metadata(path).await {
        Ok(meta) => meta.is_dir() && !meta.permissions().readonly(),
        Err(_) => false,
    }
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    fingerprint: Fingerprint,
    path: Option<PathBuf>,
    ttl: u64,
    clock: SharedClock,
}

impl CacheEntry {
    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    pub fn is_enabled(&self) -> bool {
        self.path.is_some()
    }

    pub fn ttl(&self) -> u64 {
        self.ttl
    }

    /// Modification time of the stored entry, if there is one.
    pub async fn last_modified(&self) -> Option<DateTime<Utc>> {
        let path = self.path.as_ref()?;
        let meta = tokio::fs::metadata(path).await.ok()?;
        meta.modified().ok().map(DateTime::<Utc>::from)
    }

    /// Expired iff `mtime + ttl < now`. Missing entries are expired.
    pub async fn is_expired(&self) -> bool {
        match self.last_modified().await {
            Some(modified) => {
                modified.timestamp().saturating_add(self.ttl as i64) < self.clock.timestamp()
            }
            None => true,
        }
    }

    /// The stored envelope, or the cache-miss sentinel.
    pub async fn read(&self) -> Envelope {
        let Some(path) = &self.path else {
            return Envelope::cache_miss();
        };
        if self.is_expired().await {
            return Envelope::cache_miss();
        }
        match tokio::fs::read_to_string(path).await {
            Ok(raw) => Envelope::decode(&raw),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to read cache entry");
                Envelope::cache_miss()
            }
        }
    }

    /// Stores `envelope` unless it came from cache itself or the stored
    /// entry is still fresh. Returns whether anything was written.
    pub async fn write(&self, envelope: &Envelope) -> bool {
        let Some(path) = &self.path else {
            return false;
        };
        if envelope.from_cache || !self.is_expired().await {
            return false;
        }

        let raw = match envelope.encode() {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "failed to encode envelope for cache");
                return false;
            }
        };
        if let Some(parent) = path.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                warn!(path = %parent.display(), error = %e, "failed to create cache directory");
                return false;
            }
        }
        match tokio::fs::write(path, raw).await {
            Ok(()) => {
                debug!(fingerprint = %self.fingerprint.as_str(), "stored response in cache");
                true
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to write cache entry");
                false
            }
        }
    }
}
