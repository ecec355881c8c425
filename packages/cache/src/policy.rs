//! Freshness policy collaborator contract
//!
//! The RFC cache-control/expires/etag interpretation lives outside this core.
//! This module defines the decision surface the core consumes: can a stored
//! response satisfy a request, is a response storable at all, what headers
//! does a cache-served response carry, and how does conditional revalidation
//! get judged.

use std::sync::Arc;

use http::{HeaderMap, Request, StatusCode};

use crate::config::CacheOptions;

/// Status + headers view of a response, as handed to policy decisions and
/// rebuilt from stored metadata.
#[derive(Debug, Clone)]
pub struct ResponseHead {
    pub status: StatusCode,
    pub headers: HeaderMap,
}

impl ResponseHead {
    #[must_use]
    pub fn new(status: StatusCode, headers: HeaderMap) -> Self {
        Self { status, headers }
    }
}

/// Freshness/revalidation decisions for one request/response pair. Built at
/// most once per cache entry and immutable thereafter.
pub trait CachePolicy: Send + Sync {
    /// May the response this policy was built from satisfy `request`?
    fn satisfies(&self, request: &Request<()>) -> bool;

    /// May the response be written to the cache at all?
    fn storable(&self) -> bool;

    /// Does the origin forbid serving stale content when revalidation fails?
    fn must_revalidate(&self) -> bool;

    /// Headers for a cache-served response, with freshness-dependent fields
    /// such as `age` recomputed.
    fn response_headers(&self) -> HeaderMap;

    /// Conditional headers (`if-none-match`, `if-modified-since`, ...) for a
    /// revalidation of `request`.
    fn revalidation_headers(&self, request: &Request<()>) -> HeaderMap;

    /// Did `response` confirm the cached entry unchanged? Typically a 304,
    /// but validator mismatches may reject even those.
    fn revalidated(&self, request: &Request<()>, response: &ResponseHead) -> bool;
}

/// Factory for [`CachePolicy`] instances, owned by the caller.
pub trait PolicyProvider: Send + Sync {
    fn build(
        &self,
        request: &Request<()>,
        response: &ResponseHead,
        options: &CacheOptions,
    ) -> Arc<dyn CachePolicy>;
}
