//! In-memory Store/Policy/Remote doubles for integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use bytes::{Bytes, BytesMut};
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use futures::StreamExt;
use http::{HeaderMap, HeaderName, HeaderValue, Request, Response, StatusCode};

use stash_cache::{
    CacheBody, CacheMetadata, CacheOptions, CachePolicy, Error, PolicyProvider, PutOptions,
    PutOutcome, RecordMatcher, Remote, ResponseHead, Store, StoreError, StoreWrite, StoredRecord,
};

#[derive(Default)]
pub struct MemStoreInner {
    pub records: Mutex<Vec<StoredRecord>>,
    pub content: Mutex<HashMap<String, Bytes>>,
    pub next_digest: AtomicUsize,
    pub puts: AtomicUsize,
    pub stream_puts: AtomicUsize,
    pub reads: AtomicUsize,
    pub aborts: AtomicUsize,
    pub fail_compact: AtomicBool,
    pub fail_put: AtomicBool,
    pub fail_stream_write: AtomicBool,
    pub fail_index_insert: AtomicBool,
    pub fail_get: AtomicBool,
}

impl MemStoreInner {
    fn insert_full(&self, key: String, body: Bytes, opts: PutOptions) -> PutOutcome {
        let integrity = format!("sha512-mem{}", self.next_digest.fetch_add(1, Ordering::SeqCst));
        let size = body.len() as u64;
        let time = SystemTime::now();
        self.content.lock().unwrap().insert(integrity.clone(), body);
        self.records.lock().unwrap().push(StoredRecord {
            key,
            integrity: Some(integrity.clone()),
            size: Some(size),
            time,
            metadata: opts.metadata.expect("content put carries metadata"),
        });
        PutOutcome { integrity, size, time }
    }
}

/// Content-addressed store backed by vectors and hash maps, with seedable
/// failures and operation counters.
#[derive(Clone, Default)]
pub struct MemStore {
    pub inner: Arc<MemStoreInner>,
}

impl MemStore {
    pub fn handle(&self) -> Arc<dyn Store> {
        Arc::new(self.clone())
    }

    pub fn records(&self) -> Vec<StoredRecord> {
        self.inner.records.lock().unwrap().clone()
    }

    pub fn puts(&self) -> usize {
        self.inner.puts.load(Ordering::SeqCst)
    }

    pub fn stream_puts(&self) -> usize {
        self.inner.stream_puts.load(Ordering::SeqCst)
    }

    pub fn reads(&self) -> usize {
        self.inner.reads.load(Ordering::SeqCst)
    }

    pub fn aborts(&self) -> usize {
        self.inner.aborts.load(Ordering::SeqCst)
    }

    pub fn fail_compact(&self) {
        self.inner.fail_compact.store(true, Ordering::SeqCst);
    }

    pub fn fail_put(&self) {
        self.inner.fail_put.store(true, Ordering::SeqCst);
    }

    pub fn fail_stream_write(&self) {
        self.inner.fail_stream_write.store(true, Ordering::SeqCst);
    }

    pub fn fail_index_insert(&self) {
        self.inner.fail_index_insert.store(true, Ordering::SeqCst);
    }

    pub fn fail_get(&self) {
        self.inner.fail_get.store(true, Ordering::SeqCst);
    }

    /// Seed a stored 200 record with content, as if a previous store
    /// completed.
    pub fn seed(&self, key: &str, metadata: CacheMetadata, body: &[u8]) -> StoredRecord {
        self.inner.insert_full(
            key.to_string(),
            Bytes::copy_from_slice(body),
            PutOptions {
                metadata: Some(metadata),
                ..PutOptions::default()
            },
        );
        self.records().last().cloned().expect("seed inserted a record")
    }
}

struct MemWrite {
    inner: Arc<MemStoreInner>,
    key: String,
    opts: PutOptions,
    collected: BytesMut,
}

impl StoreWrite for MemWrite {
    fn write(&mut self, chunk: Bytes) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(async move {
            if self.inner.fail_stream_write.load(Ordering::SeqCst) {
                return Err(StoreError::Other("seeded stream write failure".into()));
            }
            self.collected.extend_from_slice(&chunk);
            Ok(())
        })
    }

    fn finish(self: Box<Self>) -> BoxFuture<'static, Result<PutOutcome, StoreError>> {
        Box::pin(async move {
            self.inner.stream_puts.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .inner
                .insert_full(self.key, self.collected.freeze(), self.opts))
        })
    }

    fn abort(self: Box<Self>) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            self.inner.aborts.fetch_add(1, Ordering::SeqCst);
        })
    }
}

impl Store for MemStore {
    fn compact(
        &self,
        key: &str,
        matcher: RecordMatcher,
    ) -> BoxFuture<'_, Result<Vec<StoredRecord>, StoreError>> {
        let key = key.to_string();
        let inner = Arc::clone(&self.inner);
        Box::pin(async move {
            if inner.fail_compact.load(Ordering::SeqCst) {
                return Err(StoreError::CorruptIndex("seeded compact failure".into()));
            }
            let records = inner.records.lock().unwrap();
            let mut unique: Vec<StoredRecord> = Vec::new();
            for record in records.iter().filter(|record| record.key == key) {
                if !unique.iter().any(|kept| matcher(kept, record)) {
                    unique.push(record.clone());
                }
            }
            Ok(unique)
        })
    }

    fn put(
        &self,
        key: &str,
        body: Bytes,
        opts: PutOptions,
    ) -> BoxFuture<'_, Result<PutOutcome, StoreError>> {
        let key = key.to_string();
        let inner = Arc::clone(&self.inner);
        Box::pin(async move {
            if inner.fail_put.load(Ordering::SeqCst) {
                return Err(StoreError::Other("seeded put failure".into()));
            }
            inner.puts.fetch_add(1, Ordering::SeqCst);
            Ok(inner.insert_full(key, body, opts))
        })
    }

    fn put_stream(
        &self,
        key: &str,
        opts: PutOptions,
    ) -> BoxFuture<'_, Result<Box<dyn StoreWrite>, StoreError>> {
        let key = key.to_string();
        let inner = Arc::clone(&self.inner);
        Box::pin(async move {
            Ok(Box::new(MemWrite {
                inner,
                key,
                opts,
                collected: BytesMut::new(),
            }) as Box<dyn StoreWrite>)
        })
    }

    fn index_insert(
        &self,
        key: &str,
        integrity: Option<&str>,
        opts: PutOptions,
    ) -> BoxFuture<'_, Result<(), StoreError>> {
        let key = key.to_string();
        let integrity = integrity.map(str::to_string);
        let inner = Arc::clone(&self.inner);
        Box::pin(async move {
            if inner.fail_index_insert.load(Ordering::SeqCst) {
                return Err(StoreError::Other("seeded index insert failure".into()));
            }
            inner.records.lock().unwrap().push(StoredRecord {
                key,
                integrity,
                size: opts.size,
                time: SystemTime::now(),
                metadata: opts.metadata.expect("index insert carries metadata"),
            });
            Ok(())
        })
    }

    fn get(&self, integrity: &str, _memoize: bool) -> BoxFuture<'_, Result<Bytes, StoreError>> {
        let integrity = integrity.to_string();
        let inner = Arc::clone(&self.inner);
        Box::pin(async move {
            if inner.fail_get.load(Ordering::SeqCst) {
                return Err(StoreError::Other("seeded get failure".into()));
            }
            inner.reads.fetch_add(1, Ordering::SeqCst);
            inner
                .content
                .lock()
                .unwrap()
                .get(&integrity)
                .cloned()
                .ok_or(StoreError::MissingContent(integrity))
        })
    }

    fn get_stream(
        &self,
        integrity: &str,
        _memoize: bool,
    ) -> BoxFuture<'_, Result<BoxStream<'static, Result<Bytes, StoreError>>, StoreError>> {
        let integrity = integrity.to_string();
        let inner = Arc::clone(&self.inner);
        Box::pin(async move {
            if inner.fail_get.load(Ordering::SeqCst) {
                return Err(StoreError::Other("seeded get failure".into()));
            }
            inner.reads.fetch_add(1, Ordering::SeqCst);
            let bytes = inner
                .content
                .lock()
                .unwrap()
                .get(&integrity)
                .cloned()
                .ok_or(StoreError::MissingContent(integrity))?;
            let mid = bytes.len() / 2;
            let chunks = vec![Ok(bytes.slice(..mid)), Ok(bytes.slice(mid..))];
            Ok(futures::stream::iter(chunks).boxed())
        })
    }
}

/// Vary-aware stub policy: a stored response satisfies a request when every
/// header named by its `vary` matches, `vary: *` satisfies nothing, and
/// revalidation is confirmed by a 304.
pub struct StubPolicy {
    request_headers: HeaderMap,
    response: ResponseHead,
    storable: bool,
    must_revalidate: bool,
}

impl CachePolicy for StubPolicy {
    fn satisfies(&self, request: &Request<()>) -> bool {
        match self
            .response
            .headers
            .get("vary")
            .and_then(|value| value.to_str().ok())
        {
            Some("*") => false,
            Some(vary) => vary
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .all(|name| self.request_headers.get(name) == request.headers().get(name)),
            None => true,
        }
    }

    fn storable(&self) -> bool {
        self.storable
    }

    fn must_revalidate(&self) -> bool {
        self.must_revalidate
    }

    fn response_headers(&self) -> HeaderMap {
        let mut headers = self.response.headers.clone();
        headers.insert("age", HeaderValue::from_static("0"));
        headers
    }

    fn revalidation_headers(&self, _request: &Request<()>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(etag) = self.response.headers.get("etag") {
            headers.insert("if-none-match", etag.clone());
        }
        if let Some(last_modified) = self.response.headers.get("last-modified") {
            headers.insert("if-modified-since", last_modified.clone());
        }
        headers
    }

    fn revalidated(&self, _request: &Request<()>, response: &ResponseHead) -> bool {
        response.status == StatusCode::NOT_MODIFIED
    }
}

pub struct StubPolicies {
    pub storable: bool,
    pub must_revalidate: bool,
}

impl Default for StubPolicies {
    fn default() -> Self {
        Self {
            storable: true,
            must_revalidate: false,
        }
    }
}

impl StubPolicies {
    pub fn handle(self) -> Arc<dyn PolicyProvider> {
        Arc::new(self)
    }
}

impl PolicyProvider for StubPolicies {
    fn build(
        &self,
        request: &Request<()>,
        response: &ResponseHead,
        _options: &CacheOptions,
    ) -> Arc<dyn CachePolicy> {
        Arc::new(StubPolicy {
            request_headers: request.headers().clone(),
            response: response.clone(),
            storable: self.storable,
            must_revalidate: self.must_revalidate,
        })
    }
}

pub enum RemoteOutcome {
    Fail(String),
    Respond {
        status: u16,
        headers: Vec<(String, String)>,
        body: Bytes,
    },
}

/// Remote double that records the headers of every request it sees.
pub struct StubRemote {
    outcome: RemoteOutcome,
    pub seen: Mutex<Vec<HeaderMap>>,
}

impl StubRemote {
    pub fn new(outcome: RemoteOutcome) -> Self {
        Self {
            outcome,
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self::new(RemoteOutcome::Fail(message.to_string()))
    }

    pub fn not_modified(date: &str) -> Self {
        Self::new(RemoteOutcome::Respond {
            status: 304,
            headers: vec![("date".to_string(), date.to_string())],
            body: Bytes::new(),
        })
    }

    pub fn seen_headers(&self) -> Vec<HeaderMap> {
        self.seen.lock().unwrap().clone()
    }
}

impl Remote for StubRemote {
    fn fetch(&self, request: Request<()>) -> BoxFuture<'_, Result<Response<CacheBody>, Error>> {
        Box::pin(async move {
            self.seen.lock().unwrap().push(request.headers().clone());
            match &self.outcome {
                RemoteOutcome::Fail(message) => Err(Error::Transport(message.clone().into())),
                RemoteOutcome::Respond {
                    status,
                    headers,
                    body,
                } => {
                    let mut response = Response::new(CacheBody::full(body.clone()));
                    *response.status_mut() =
                        StatusCode::from_u16(*status).expect("valid stub status");
                    for (name, value) in headers {
                        response.headers_mut().insert(
                            name.parse::<HeaderName>().expect("valid stub header name"),
                            value.parse::<HeaderValue>().expect("valid stub header value"),
                        );
                    }
                    Ok(response)
                }
            }
        })
    }
}

pub fn get_request(uri: &str, headers: &[(&str, &str)]) -> Request<()> {
    let mut request = Request::new(());
    *request.uri_mut() = uri.parse().expect("valid test uri");
    for (name, value) in headers {
        request.headers_mut().insert(
            name.parse::<HeaderName>().expect("valid test header name"),
            value.parse::<HeaderValue>().expect("valid test header value"),
        );
    }
    request
}

pub fn response_with(
    status: u16,
    headers: &[(&str, &str)],
    body: CacheBody,
) -> Response<CacheBody> {
    let mut response = Response::new(body);
    *response.status_mut() = StatusCode::from_u16(status).expect("valid test status");
    for (name, value) in headers {
        response.headers_mut().insert(
            name.parse::<HeaderName>().expect("valid test header name"),
            value.parse::<HeaderValue>().expect("valid test header value"),
        );
    }
    response
}

pub fn options() -> CacheOptions {
    CacheOptions::new("/tmp/stash-cache-test")
}
