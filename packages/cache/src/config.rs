//! Cache configuration
//!
//! Every option recognized by the entry-management core, as an explicit
//! struct with defaults rather than a dynamic options bag. The buffering
//! threshold lives here too, since both the write path and the read path
//! make the same buffer-or-stream decision.

use std::path::PathBuf;

/// Bodies with a known size strictly below this threshold are collected in
/// memory so the store can memoize them; everything else streams.
pub const MAX_MEMORY_SIZE: u64 = 5 * 1024 * 1024;

/// Configuration recognized by the cache core.
#[derive(Debug, Clone)]
pub struct CacheOptions {
    /// Store location, reflected in the `x-local-cache` response header.
    pub cache_path: PathBuf,
    /// `Some(false)` disables in-memory duplication of small bodies;
    /// `Some(true)` asks the store to memoize; `None` leaves the default.
    pub memoize: Option<bool>,
    /// Digest algorithms requested for content writes.
    pub algorithms: Vec<String>,
    /// Whether the transport decodes compressed bodies automatically. When
    /// true, encoding headers are not persisted because the stored bytes are
    /// already decoded.
    pub compress: bool,
    /// Opaque counter passed through to response construction.
    pub counter: Option<u32>,
}

impl CacheOptions {
    /// Options for a cache rooted at `cache_path`, with defaults for
    /// everything else.
    pub fn new(cache_path: impl Into<PathBuf>) -> Self {
        Self {
            cache_path: cache_path.into(),
            memoize: None,
            algorithms: vec!["sha512".to_string()],
            compress: true,
            counter: None,
        }
    }

    #[must_use]
    pub fn memoize(mut self, memoize: bool) -> Self {
        self.memoize = Some(memoize);
        self
    }

    #[must_use]
    pub fn algorithms(mut self, algorithms: Vec<String>) -> Self {
        self.algorithms = algorithms;
        self
    }

    #[must_use]
    pub fn compress(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    #[must_use]
    pub fn counter(mut self, counter: u32) -> Self {
        self.counter = Some(counter);
        self
    }

    /// True when a body of `size` bytes can be collected in memory: the size
    /// must be known, nonzero, and strictly below [`MAX_MEMORY_SIZE`].
    #[must_use]
    pub fn fits_in_memory(size: Option<u64>) -> bool {
        matches!(size, Some(s) if s > 0 && s < MAX_MEMORY_SIZE)
    }

    /// True when the body should take the buffered path: memoization is not
    /// explicitly disabled and the body fits in memory.
    #[must_use]
    pub fn should_buffer(&self, size: Option<u64>) -> bool {
        self.memoize != Some(false) && Self::fits_in_memory(size)
    }
}

/// Opaque counter attached to built responses via `http::Extensions`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Counter(pub u32);
