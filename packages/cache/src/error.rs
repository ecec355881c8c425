//! Error types for cache entry operations
//!
//! Distinguishes the failure classes that matter to callers: lookup problems
//! collapse to cache misses, store write failures are non-fatal to response
//! delivery, store read failures surface on the body stream, and transport
//! failures during revalidation may or may not propagate depending on policy.

use std::error::Error as StdError;

use crate::store::StoreError;

/// A Result alias where the Err case is `stash_cache::Error`.
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed error type carried as the source of transport failures.
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Errors surfaced by cache entry operations.
///
/// Lookup and store-write failures never appear here: lookups collapse to a
/// cache miss and write failures are logged without failing the response, so
/// the only store failure a caller can observe is a read.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A content read from the store failed while a cached body was being
    /// pulled.
    #[error("cache content read failed")]
    StoreRead(#[source] StoreError),

    /// Stored index metadata could not be turned back into request/response
    /// views.
    #[error("invalid cache metadata: {0}")]
    Metadata(String),

    /// The origin fetch failed at the transport layer.
    #[error("transport error: {0}")]
    Transport(#[source] BoxError),

    /// The operation requires a stored record but this entry has none.
    #[error("cache entry has no stored record")]
    NoRecord,

    /// The operation requires a pending network response but this entry was
    /// built from a stored record.
    #[error("cache entry has no pending network response")]
    NoPendingResponse,
}

impl Error {
    /// True when this error came from the network transport rather than the
    /// cache itself.
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Transport(_))
    }

    /// True when this error came from the persistent store.
    #[must_use]
    pub fn is_store(&self) -> bool {
        matches!(self, Error::StoreRead(_))
    }
}
