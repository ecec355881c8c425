//! Content-addressed store collaborator contract
//!
//! The persistent store is opaque to this core: content is addressed by
//! digest, the index maps cache keys to records, and the store guarantees its
//! own concurrent-access discipline. A store handle is constructed for a
//! given cache path by the caller; the core never passes the path per call.

use std::time::SystemTime;

use bytes::Bytes;
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::metadata::CacheMetadata;

/// Errors raised by the store collaborator.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store i/o failed")]
    Io(#[from] std::io::Error),

    #[error("cache index corrupt: {0}")]
    CorruptIndex(String),

    #[error("no content found for digest {0}")]
    MissingContent(String),

    #[error("integrity verification failed for digest {0}")]
    Integrity(String),

    #[error("{0}")]
    Other(String),
}

/// Persisted unit returned by the store on lookup. Records are superseded by
/// later writes under the same key, never mutated; multiple records may
/// coexist per key (vary variants), with selection happening at lookup time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredRecord {
    /// Index key the record was written under.
    pub key: String,
    /// Content digest; `None` for metadata-only records (301/308).
    #[serde(default)]
    pub integrity: Option<String>,
    /// Body size in bytes; `None` for metadata-only records.
    #[serde(default)]
    pub size: Option<u64>,
    /// Write timestamp.
    pub time: SystemTime,
    /// Projected request/response metadata.
    pub metadata: CacheMetadata,
}

/// Options accompanying a content write or index insert.
#[derive(Debug, Clone, Default)]
pub struct PutOptions {
    /// Digest algorithms to compute for the content.
    pub algorithms: Vec<String>,
    /// Metadata persisted with the index record.
    pub metadata: Option<CacheMetadata>,
    /// Expected body size, when known.
    pub size: Option<u64>,
    /// Whether the store should duplicate the content into its in-memory
    /// cache layer.
    pub memoize: Option<bool>,
}

/// Result of a completed content write.
#[derive(Debug, Clone)]
pub struct PutOutcome {
    pub integrity: String,
    pub size: u64,
    pub time: SystemTime,
}

/// Equivalence test between two candidate records, used by index compaction
/// to collapse near-duplicate writes into one record per vary dimension.
pub type RecordMatcher = Box<dyn Fn(&StoredRecord, &StoredRecord) -> bool + Send + Sync>;

/// An in-flight streaming content write. Dropping a writer without calling
/// [`StoreWrite::finish`] must never finalize a record.
pub trait StoreWrite: Send {
    /// Append one chunk.
    fn write(&mut self, chunk: Bytes) -> BoxFuture<'_, Result<(), StoreError>>;

    /// Complete the write, verify integrity, and insert the index record.
    fn finish(self: Box<Self>) -> BoxFuture<'static, Result<PutOutcome, StoreError>>;

    /// Discard any partially written content.
    fn abort(self: Box<Self>) -> BoxFuture<'static, ()>;
}

/// The content-addressed store.
pub trait Store: Send + Sync {
    /// Return the deduplicated set of records under `key`, in store order,
    /// using `matcher` to decide equivalence.
    fn compact(
        &self,
        key: &str,
        matcher: RecordMatcher,
    ) -> BoxFuture<'_, Result<Vec<StoredRecord>, StoreError>>;

    /// Buffered write: one call with the whole payload.
    fn put(
        &self,
        key: &str,
        body: Bytes,
        opts: PutOptions,
    ) -> BoxFuture<'_, Result<PutOutcome, StoreError>>;

    /// Streaming write.
    fn put_stream(
        &self,
        key: &str,
        opts: PutOptions,
    ) -> BoxFuture<'_, Result<Box<dyn StoreWrite>, StoreError>>;

    /// Insert a metadata-only index record (no content digest) or refresh the
    /// metadata of an existing one.
    fn index_insert(
        &self,
        key: &str,
        integrity: Option<&str>,
        opts: PutOptions,
    ) -> BoxFuture<'_, Result<(), StoreError>>;

    /// Buffered read by content digest.
    fn get(&self, integrity: &str, memoize: bool) -> BoxFuture<'_, Result<Bytes, StoreError>>;

    /// Streaming read by content digest.
    fn get_stream(
        &self,
        integrity: &str,
        memoize: bool,
    ) -> BoxFuture<'_, Result<BoxStream<'static, Result<Bytes, StoreError>>, StoreError>>;
}
