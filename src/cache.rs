//! In-memory result cache for identical requests.
//!
//! Encoding is the expensive part of a request. The endpoint is
//! deterministic, so a request whose input bytes and options are
//! byte-for-byte identical to an earlier one can be answered with the
//! earlier response envelope.
//!
//! ## Cache keys
//!
//! The cache is **content-addressed**: the key is the SHA-256 of the upload
//! (length-prefixed, so no two input/options splits collide) followed by the
//! raw `options` JSON. Two clients sending the same image with the same
//! pipeline share one entry.
//!
//! ## Eviction
//!
//! Entries live in a [`moka`] cache bounded two ways: by `cache.entries`
//! responses and by `cache.size` bytes of response bodies, whichever is
//! reached first. A body larger than `cache.size` is never stored. Either
//! bound at zero disables the cache: every lookup misses and nothing is
//! stored. Only successful responses are cached.

use crate::config::CacheConfig;
use bytes::Bytes;
use moka::future::Cache;
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// SHA-256 of a request's content, returned as a hex string.
///
/// `input` is `None` for create-spec requests.
pub fn cache_key(input: Option<&[u8]>, options: &[u8]) -> String {
    let mut hasher = Sha256::new();
    match input {
        Some(bytes) => {
            hasher.update(b"\x01");
            hasher.update((bytes.len() as u64).to_le_bytes());
            hasher.update(bytes);
        }
        None => {
            hasher.update(b"\x00");
        }
    }
    hasher.update(options);
    format!("{:x}", hasher.finalize())
}

/// Bounded map from request digest to response body.
pub struct ResultCache {
    entries: Option<Cache<String, Bytes>>,
    max_bytes: u64,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ResultCache {
    pub fn new(config: &CacheConfig) -> Self {
        let max_bytes = config.size.bytes();
        let entries = config.is_enabled().then(|| {
            // Every entry weighs at least one slot, so the byte budget also
            // caps the entry count.
            let slot = (max_bytes / config.entries).max(1);
            Cache::builder()
                .max_capacity(max_bytes)
                .weigher(move |_key: &String, body: &Bytes| {
                    let weight = (body.len() as u64).max(slot);
                    u32::try_from(weight).unwrap_or(u32::MAX)
                })
                .build()
        });
        Self {
            entries,
            max_bytes,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.entries.is_some()
    }

    /// Look up a response body, counting the hit or miss.
    pub async fn get(&self, key: &str) -> Option<Bytes> {
        let found = match &self.entries {
            Some(entries) => entries.get(key).await,
            None => None,
        };
        let counter = if found.is_some() {
            &self.hits
        } else {
            &self.misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    /// Store a response body. Bodies over the byte budget are dropped.
    pub async fn insert(&self, key: String, body: Bytes) {
        let Some(entries) = &self.entries else {
            return;
        };
        if body.len() as u64 > self.max_bytes {
            return;
        }
        entries.insert(key, body).await;
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

impl fmt::Debug for ResultCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultCache")
            .field("enabled", &self.is_enabled())
            .field("max_bytes", &self.max_bytes)
            .field("stats", &self.stats())
            .finish()
    }
}

/// Summary of cache performance since startup.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

impl CacheStats {
    pub fn total(&self) -> u64 {
        self.hits + self.misses
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.hits > 0 {
            write!(
                f,
                "{} cached, {} processed ({} total)",
                self.hits,
                self.misses,
                self.total()
            )
        } else {
            write!(f, "{} processed", self.misses)
        }
    }
}
