//! # stash-cache
//!
//! Entry management for an HTTP cache layered over an opaque
//! content-addressed store. Given an inbound request and a store handle, this
//! crate decides whether a stored response may satisfy the request, serves
//! cached bytes without re-buffering them entirely in memory when avoidable,
//! writes fresh responses into the store concurrently with streaming them to
//! the caller, and drives conditional revalidation against the origin when a
//! stored entry is stale.
//!
//! The persistent store ([`Store`]), the network transport ([`Remote`]), and
//! the freshness decision engine ([`CachePolicy`]) are collaborators supplied
//! by the caller; this crate owns the state machine between them.
//!
//! ## Flow
//!
//! - [`find`] returns the best [`CacheEntry`] for a request, or `None`.
//! - [`CacheEntry::respond`] serves from the store, deferring the disk read
//!   until the body is first pulled.
//! - [`CacheEntry::revalidate`] issues a conditional request and either
//!   refreshes the index, serves stale, or stores the new representation.
//! - [`CacheEntry::for_response`] + [`CacheEntry::store`] write a fresh
//!   response through to the store while the caller streams it.
//!
//! Every response leaving this crate carries `x-local-cache-*` headers
//! describing its provenance; see [`headers`].

#![deny(unsafe_code)]
#![warn(clippy::all)]

pub mod body;
pub mod config;
pub mod entry;
pub mod error;
pub mod headers;
pub mod http_date;
pub mod key;
pub mod lookup;
pub mod metadata;
mod pipeline;
pub mod policy;
pub mod remote;
pub mod store;

pub use body::CacheBody;
pub use config::{CacheOptions, Counter, MAX_MEMORY_SIZE};
pub use entry::CacheEntry;
pub use error::{BoxError, Error, Result};
pub use key::cache_key;
pub use lookup::find;
pub use metadata::CacheMetadata;
pub use policy::{CachePolicy, PolicyProvider, ResponseHead};
pub use remote::Remote;
pub use store::{
    PutOptions, PutOutcome, RecordMatcher, Store, StoreError, StoreWrite, StoredRecord,
};
