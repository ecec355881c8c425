//! Store pipeline adapter
//!
//! Wires a response body through a write-through pump so the caller and the
//! store receive the same bytes. The pump runs as its own task and feeds the
//! caller over a bounded channel, which couples backpressure in both
//! directions: a slow caller stalls the pump, and on the streamed path a slow
//! store write stalls forwarding. Downstream end-of-stream never happens
//! before the store write has settled.

use std::sync::Arc;

use bytes::BytesMut;
use futures::StreamExt;
use tokio::sync::mpsc;

use crate::body::CacheBody;
use crate::store::{PutOptions, Store};

/// Bound on in-flight chunks between the pump and the caller.
const CHANNEL_CAPACITY: usize = 8;

/// Which write path a body takes, reflected in `x-local-cache-mode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WriteMode {
    Buffer,
    Stream,
}

impl WriteMode {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            WriteMode::Buffer => "buffer",
            WriteMode::Stream => "stream",
        }
    }
}

/// Splice a store write into `upstream`, returning the body handed to the
/// caller. All storability decisions have already been made; this only moves
/// bytes.
pub(crate) fn write_through(
    store: Arc<dyn Store>,
    key: String,
    opts: PutOptions,
    mode: WriteMode,
    upstream: CacheBody,
) -> CacheBody {
    let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
    tokio::spawn(async move {
        match mode {
            WriteMode::Buffer => pump_buffered(store, key, opts, upstream, tx).await,
            WriteMode::Stream => pump_streamed(store, key, opts, upstream, tx).await,
        }
    });
    CacheBody::channel(rx)
}

/// Collect the whole payload while forwarding it, then perform one buffered
/// put. The channel sender is held until the put settles, so the caller's
/// end-of-stream waits on the write.
async fn pump_buffered(
    store: Arc<dyn Store>,
    key: String,
    opts: PutOptions,
    mut upstream: CacheBody,
    tx: mpsc::Sender<Result<bytes::Bytes, crate::error::Error>>,
) {
    let mut collected = BytesMut::with_capacity(opts.size.unwrap_or(0) as usize);
    while let Some(item) = upstream.next().await {
        match item {
            Ok(chunk) => {
                collected.extend_from_slice(&chunk);
                if tx.send(Ok(chunk)).await.is_err() {
                    // caller went away before end-of-stream; nothing has been
                    // written yet, so there is no partial record to clean up
                    return;
                }
            }
            Err(err) => {
                tracing::warn!(
                    target: "stash_cache::pipeline",
                    key = %key,
                    error = %err,
                    "response body failed before the cache write started"
                );
                let _ = tx.send(Err(err)).await;
                return;
            }
        }
    }

    if let Err(err) = store.put(&key, collected.freeze(), opts).await {
        tracing::warn!(
            target: "stash_cache::pipeline",
            key = %key,
            error = %err,
            "cache write failed; response delivered uncached"
        );
    }
}

/// Duplicate each chunk into a streaming store write before forwarding it.
/// Upstream errors and caller cancellation both abort the in-flight write so
/// a truncated record is never finalized.
async fn pump_streamed(
    store: Arc<dyn Store>,
    key: String,
    opts: PutOptions,
    mut upstream: CacheBody,
    tx: mpsc::Sender<Result<bytes::Bytes, crate::error::Error>>,
) {
    let mut writer = match store.put_stream(&key, opts).await {
        Ok(writer) => Some(writer),
        Err(err) => {
            tracing::warn!(
                target: "stash_cache::pipeline",
                key = %key,
                error = %err,
                "could not open cache write stream; response delivered uncached"
            );
            None
        }
    };

    while let Some(item) = upstream.next().await {
        match item {
            Ok(chunk) => {
                let mut write_failed = false;
                if let Some(writer) = writer.as_mut() {
                    if let Err(err) = writer.write(chunk.clone()).await {
                        tracing::warn!(
                            target: "stash_cache::pipeline",
                            key = %key,
                            error = %err,
                            "cache write failed mid-stream; response delivered uncached"
                        );
                        write_failed = true;
                    }
                }
                if write_failed {
                    if let Some(writer) = writer.take() {
                        writer.abort().await;
                    }
                }
                if tx.send(Ok(chunk)).await.is_err() {
                    // caller cancelled; tear down the store-side duplicate
                    if let Some(writer) = writer.take() {
                        writer.abort().await;
                    }
                    return;
                }
            }
            Err(err) => {
                if let Some(writer) = writer.take() {
                    writer.abort().await;
                }
                tracing::warn!(
                    target: "stash_cache::pipeline",
                    key = %key,
                    error = %err,
                    "response body failed mid-stream; cache write aborted"
                );
                let _ = tx.send(Err(err)).await;
                return;
            }
        }
    }

    if let Some(writer) = writer.take() {
        if let Err(err) = writer.finish().await {
            tracing::warn!(
                target: "stash_cache::pipeline",
                key = %key,
                error = %err,
                "cache write failed; response delivered uncached"
            );
        }
    }
}
