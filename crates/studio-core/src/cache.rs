//! Compile cache
//!
//! Compilation results keyed by the blake3 fingerprint of the source text.
//! Editors and correction loops often bounce between the same few sources;
//! a hit skips the blocking-pool round trip entirely. Failures are cached
//! too since compilation is deterministic.

use moka::future::Cache;
use std::time::Duration;
use studio_lang::{compile, CompilationResult, CompileError, SourceFingerprint};

/// Counters for cache monitoring
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    /// Number of entries in cache
    pub entry_count: u64,
}

/// Fingerprint-addressed compilation results
#[derive(Debug, Clone)]
pub struct CompileCache {
    inner: Cache<SourceFingerprint, CompilationResult>,
}

impl CompileCache {
    /// Cache holding at most `max_capacity` results
    #[inline]
    #[must_use]
    pub fn new(max_capacity: u64) -> Self {
        Self {
            inner: Cache::new(max_capacity),
        }
    }

    /// Cache whose entries also expire after `ttl`
    #[inline]
    #[must_use]
    pub fn with_ttl(max_capacity: u64, ttl: Duration) -> Self {
        Self {
            inner: Cache::builder().max_capacity(max_capacity).time_to_live(ttl).build(),
        }
    }

    /// Cached result for `source`, compiling it on the blocking pool on a miss
    ///
    /// Concurrent callers for the same source share one compilation.
    pub async fn get_or_compile(&self, source: &str) -> CompilationResult {
        let fingerprint = SourceFingerprint::of(source);
        let owned = source.to_string();
        self.inner
            .get_with(fingerprint, async move {
                tracing::debug!(%fingerprint, "compile cache miss");
                match tokio::task::spawn_blocking(move || compile(&owned)).await {
                    Ok(result) => result,
                    Err(join) => Err(CompileError::internal(format!("compiler task failed: {join}"))),
                }
            })
            .await
    }

    /// Cached result, without compiling
    pub async fn get(&self, source: &str) -> Option<CompilationResult> {
        self.inner.get(&SourceFingerprint::of(source)).await
    }

    /// Drop every entry
    pub fn invalidate_all(&self) {
        self.inner.invalidate_all();
    }

    /// Current statistics
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entry_count: self.inner.entry_count(),
        }
    }
}
