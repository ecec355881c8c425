//! Cache entry
//!
//! The central object binding a stored record (or a just-fetched response) to
//! reconstructed request/response views and a freshness policy. An entry owns
//! three operations: `store` writes a fresh response through to the cache
//! while streaming it to the caller, `respond` serves a response built
//! entirely from the stored record, and `revalidate` drives a conditional
//! exchange with the origin.
//!
//! The request, response head, and policy views are computed at most once per
//! entry and immutable afterwards; re-deriving them would break the
//! single-policy-instance invariant.

use std::sync::Arc;

use http::{header, HeaderMap, HeaderValue, Method, Request, Response, StatusCode};
use once_cell::sync::OnceCell;

use crate::body::CacheBody;
use crate::config::{CacheOptions, Counter};
use crate::error::{Error, Result};
use crate::headers::{attach_cache_headers, attach_store_headers, X_LOCAL_CACHE_STATUS};
use crate::key::cache_key;
use crate::metadata::CacheMetadata;
use crate::pipeline::{self, WriteMode};
use crate::policy::{CachePolicy, PolicyProvider, ResponseHead};
use crate::remote::Remote;
use crate::store::{PutOptions, Store, StoredRecord};

/// A per-request-lifetime wrapper around at most one stored record, or a
/// fresh request/response pair on its way into the store.
pub struct CacheEntry {
    key: String,
    record: Option<StoredRecord>,
    store: Arc<dyn Store>,
    policies: Arc<dyn PolicyProvider>,
    options: CacheOptions,
    request: OnceCell<Request<()>>,
    response: OnceCell<ResponseHead>,
    policy: OnceCell<Arc<dyn CachePolicy>>,
    network: Option<Response<CacheBody>>,
}

impl CacheEntry {
    /// Entry backed by a record returned from the store index.
    #[must_use]
    pub fn from_record(
        record: StoredRecord,
        store: Arc<dyn Store>,
        policies: Arc<dyn PolicyProvider>,
        options: CacheOptions,
    ) -> Self {
        Self {
            key: record.key.clone(),
            record: Some(record),
            store,
            policies,
            options,
            request: OnceCell::new(),
            response: OnceCell::new(),
            policy: OnceCell::new(),
            network: None,
        }
    }

    /// Entry wrapping a just-fetched response, prior to [`CacheEntry::store`].
    #[must_use]
    pub fn for_response(
        request: &Request<()>,
        response: Response<CacheBody>,
        store: Arc<dyn Store>,
        policies: Arc<dyn PolicyProvider>,
        options: CacheOptions,
    ) -> Self {
        let key = cache_key(request);
        let head = ResponseHead::new(response.status(), response.headers().clone());
        let request_cell = OnceCell::with_value(clone_request(request));
        let response_cell = OnceCell::with_value(head);
        Self {
            key,
            record: None,
            store,
            policies,
            options,
            request: request_cell,
            response: response_cell,
            policy: OnceCell::new(),
            network: Some(response),
        }
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    #[must_use]
    pub fn record(&self) -> Option<&StoredRecord> {
        self.record.as_ref()
    }

    /// The request this entry answers for: the original request on the store
    /// path, or one reconstructed from index metadata (method forced to GET)
    /// on the hit path.
    pub fn request(&self) -> Result<&Request<()>> {
        self.request.get_or_try_init(|| {
            let record = self.record.as_ref().ok_or(Error::NoRecord)?;
            record.metadata.rebuild_request()
        })
    }

    /// The stored response head: status from metadata (default 200), headers
    /// from the projection plus a synthesized content-length.
    pub fn response_head(&self) -> Result<&ResponseHead> {
        self.response.get_or_try_init(|| {
            let record = self.record.as_ref().ok_or(Error::NoRecord)?;
            record.metadata.rebuild_response_head(record.size)
        })
    }

    /// The freshness policy for this entry, built once.
    pub fn policy(&self) -> Result<&Arc<dyn CachePolicy>> {
        self.policy.get_or_try_init(|| {
            let request = self.request()?;
            let response = self.response_head()?;
            Ok(self.policies.build(request, response, &self.options))
        })
    }

    /// Wrap the pending network response so that, as the caller streams the
    /// body, the same bytes are durably written to the store.
    ///
    /// Storability is decided before any body byte is read: non-GET methods,
    /// statuses outside {200, 301, 308}, and policy refusals all return the
    /// response unmodified with `x-local-cache-status: skip`. Write failures
    /// are non-fatal: the response is still delivered and the failure is
    /// surfaced as a `tracing` warning.
    pub async fn store(mut self, status: &str) -> Result<Response<CacheBody>> {
        let mut response = self.network.take().ok_or(Error::NoPendingResponse)?;

        let method_ok = self.request()?.method() == Method::GET;
        let status_ok = matches!(
            response.status(),
            StatusCode::OK | StatusCode::MOVED_PERMANENTLY | StatusCode::PERMANENT_REDIRECT
        );
        if !(method_ok && status_ok && self.policy()?.storable()) {
            response
                .headers_mut()
                .insert(X_LOCAL_CACHE_STATUS, HeaderValue::from_static("skip"));
            return Ok(response);
        }

        let size = content_length(response.headers());
        let mode = if self.options.should_buffer(size) {
            WriteMode::Buffer
        } else {
            WriteMode::Stream
        };

        let (mut parts, body) = response.into_parts();
        let head = ResponseHead::new(parts.status, parts.headers.clone());
        let metadata = CacheMetadata::from_exchange(self.request()?, &head, &self.options);

        let body = if parts.status == StatusCode::OK {
            let opts = PutOptions {
                algorithms: self.options.algorithms.clone(),
                metadata: Some(metadata),
                size,
                memoize: self.options.memoize,
            };
            pipeline::write_through(
                Arc::clone(&self.store),
                self.key.clone(),
                opts,
                mode,
                body,
            )
        } else {
            // redirects persist as metadata-only index records, no body
            let opts = PutOptions {
                algorithms: Vec::new(),
                metadata: Some(metadata),
                size: None,
                memoize: self.options.memoize,
            };
            if let Err(err) = self.store.index_insert(&self.key, None, opts).await {
                tracing::warn!(
                    target: "stash_cache::entry",
                    key = %self.key,
                    error = %err,
                    "redirect index insert failed; response delivered uncached"
                );
            }
            body
        };

        attach_store_headers(&mut parts.headers, &self.options, &self.key, mode.as_str(), status);
        if let Some(counter) = self.options.counter {
            parts.extensions.insert(Counter(counter));
        }
        Ok(Response::from_parts(parts, body))
    }

    /// Produce a response built entirely from the stored record. The store
    /// read is deferred until the consumer first pulls the body; a body
    /// dropped unread never touches the store, and a read failure surfaces on
    /// the body stream rather than here.
    pub fn respond(&self, method: &Method, status: &str) -> Result<Response<CacheBody>> {
        let record = self.record.as_ref().ok_or(Error::NoRecord)?;
        let head = self.response_head()?;

        let redirect = matches!(
            head.status,
            StatusCode::MOVED_PERMANENTLY | StatusCode::PERMANENT_REDIRECT
        );
        let body_bearing = method != Method::HEAD && !redirect;
        // the policy header projection applies only when a body is served;
        // HEAD and redirect responses come straight from the stored view
        let mut headers = if body_bearing {
            self.policy()?.response_headers()
        } else {
            head.headers.clone()
        };
        let mode = if self.options.should_buffer(record.size) {
            WriteMode::Buffer
        } else {
            WriteMode::Stream
        };
        attach_cache_headers(
            &mut headers,
            &self.options,
            &self.key,
            record.integrity.as_deref(),
            mode.as_str(),
            status,
            record.time,
        );

        let body = if body_bearing {
            let integrity = record.integrity.clone().ok_or_else(|| {
                Error::Metadata("stored record has no content digest".to_string())
            })?;
            lazy_store_read(
                Arc::clone(&self.store),
                integrity,
                self.options.memoize.unwrap_or(false),
                mode,
            )
        } else {
            CacheBody::empty()
        };

        let mut response = Response::new(body);
        *response.status_mut() = head.status;
        *response.headers_mut() = headers;
        if let Some(counter) = self.options.counter {
            response.extensions_mut().insert(Counter(counter));
        }
        Ok(response)
    }

    /// Issue a conditional request against the origin and interpret the
    /// outcome: serve stale on transport failure (unless the policy forbids
    /// it), refresh the index metadata on a confirmed match, or store the new
    /// representation when the origin returned one.
    pub async fn revalidate(
        self,
        request: &Request<()>,
        remote: &dyn Remote,
    ) -> Result<Response<CacheBody>> {
        // conditional headers always win over caller-supplied ones
        let mut conditional = clone_request(request);
        for (name, value) in self.policy()?.revalidation_headers(request).iter() {
            conditional.headers_mut().insert(name.clone(), value.clone());
        }

        let network = match remote.fetch(clone_request(&conditional)).await {
            Ok(network) => network,
            Err(err) => {
                if self.policy()?.must_revalidate() {
                    // stale content must never be served when the origin
                    // policy forbids it
                    return Err(err);
                }
                tracing::debug!(
                    target: "stash_cache::entry",
                    key = %self.key,
                    error = %err,
                    "origin unreachable; serving stale entry"
                );
                return self.respond(request.method(), "stale");
            }
        };

        let head = ResponseHead::new(network.status(), network.headers().clone());
        if self.policy()?.revalidated(&conditional, &head) {
            // metadata-only refresh: only the date moves forward, the body
            // and its digest are untouched
            let record = self.record.as_ref().ok_or(Error::NoRecord)?;
            let mut metadata = record.metadata.clone();
            if let Some(date) = head
                .headers
                .get(header::DATE)
                .and_then(|value| value.to_str().ok())
            {
                metadata
                    .res_headers
                    .insert("date".to_string(), date.to_string());
            }

            let opts = PutOptions {
                algorithms: Vec::new(),
                metadata: Some(metadata.clone()),
                size: record.size,
                memoize: self.options.memoize,
            };
            if let Err(err) = self
                .store
                .index_insert(&self.key, record.integrity.as_deref(), opts)
                .await
            {
                tracing::warn!(
                    target: "stash_cache::entry",
                    key = %self.key,
                    error = %err,
                    "index refresh failed after revalidation; serving cached entry anyway"
                );
                return self.respond(request.method(), "revalidated");
            }

            let mut refreshed = record.clone();
            refreshed.metadata = metadata;
            let refreshed = CacheEntry::from_record(
                refreshed,
                Arc::clone(&self.store),
                Arc::clone(&self.policies),
                self.options.clone(),
            );
            return refreshed.respond(request.method(), "revalidated");
        }

        // modified: rebuild from the original request so conditional headers
        // never leak into the new index record
        CacheEntry::for_response(
            request,
            network,
            Arc::clone(&self.store),
            Arc::clone(&self.policies),
            self.options.clone(),
        )
        .store("updated")
        .await
    }
}

impl std::fmt::Debug for CacheEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheEntry")
            .field("key", &self.key)
            .field("record", &self.record)
            .field("pending_response", &self.network.is_some())
            .finish()
    }
}

/// Body whose store read (buffered or streaming, by write mode) starts on the
/// consumer's first pull.
fn lazy_store_read(
    store: Arc<dyn Store>,
    integrity: String,
    memoize: bool,
    mode: WriteMode,
) -> CacheBody {
    use futures::StreamExt;

    CacheBody::lazy(Box::new(move || {
        Box::pin(async move {
            match mode {
                WriteMode::Buffer => {
                    let bytes = store
                        .get(&integrity, memoize)
                        .await
                        .map_err(Error::StoreRead)?;
                    Ok(futures::stream::once(async move { Ok(bytes) }).boxed())
                }
                WriteMode::Stream => {
                    let stream = store
                        .get_stream(&integrity, memoize)
                        .await
                        .map_err(Error::StoreRead)?;
                    Ok(stream.map(|item| item.map_err(Error::StoreRead)).boxed())
                }
            }
        })
    }))
}

fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .parse::<u64>()
        .ok()
        .filter(|length| *length > 0)
}

pub(crate) fn clone_request(request: &Request<()>) -> Request<()> {
    let mut cloned = Request::new(());
    *cloned.method_mut() = request.method().clone();
    *cloned.uri_mut() = request.uri().clone();
    *cloned.headers_mut() = request.headers().clone();
    cloned
}
