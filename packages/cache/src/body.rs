//! Response body representations
//!
//! A cache-flavored body is one of: nothing, a single buffered payload, a
//! channel fed by a write-through pump, an arbitrary byte stream, or a lazy
//! store read that is not started until the consumer first polls. The lazy
//! variant is what lets `respond()` hand out a response whose disk read is
//! skipped entirely when the body is dropped unread.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;

use crate::error::Error;

/// Deferred producer of a byte stream; invoked on the body's first poll.
pub(crate) type LazyInit = Box<
    dyn FnOnce() -> BoxFuture<'static, Result<BoxStream<'static, Result<Bytes, Error>>, Error>>
        + Send,
>;

enum Inner {
    Empty,
    Full(Option<Bytes>),
    Channel(mpsc::Receiver<Result<Bytes, Error>>),
    Stream(BoxStream<'static, Result<Bytes, Error>>),
    Lazy(LazyState),
}

enum LazyState {
    Idle(Option<LazyInit>),
    Opening(BoxFuture<'static, Result<BoxStream<'static, Result<Bytes, Error>>, Error>>),
    Streaming(BoxStream<'static, Result<Bytes, Error>>),
    Done,
}

/// Body of a response produced by the cache core.
pub struct CacheBody {
    inner: Inner,
}

impl CacheBody {
    /// A body with no bytes.
    #[must_use]
    pub fn empty() -> Self {
        Self { inner: Inner::Empty }
    }

    /// A fully buffered body.
    #[must_use]
    pub fn full(bytes: Bytes) -> Self {
        Self {
            inner: Inner::Full(Some(bytes)),
        }
    }

    /// A body fed through a bounded channel.
    pub(crate) fn channel(receiver: mpsc::Receiver<Result<Bytes, Error>>) -> Self {
        Self {
            inner: Inner::Channel(receiver),
        }
    }

    /// A body backed by an arbitrary byte stream.
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, Error>> + Send + 'static,
    {
        Self {
            inner: Inner::Stream(stream.boxed()),
        }
    }

    /// A body whose underlying stream is acquired on first poll. If the body
    /// is dropped without ever being polled, `init` never runs.
    pub(crate) fn lazy(init: LazyInit) -> Self {
        Self {
            inner: Inner::Lazy(LazyState::Idle(Some(init))),
        }
    }

    /// Drain the body into one buffer. A stream error aborts the collection
    /// and surfaces as the result.
    pub async fn collect(mut self) -> Result<Bytes, Error> {
        let mut collected = BytesMut::new();
        while let Some(chunk) = self.next().await {
            collected.extend_from_slice(&chunk?);
        }
        Ok(collected.freeze())
    }
}

impl Stream for CacheBody {
    type Item = Result<Bytes, Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        match &mut this.inner {
            Inner::Empty => Poll::Ready(None),
            Inner::Full(bytes) => Poll::Ready(bytes.take().map(Ok)),
            Inner::Channel(receiver) => receiver.poll_recv(cx),
            Inner::Stream(stream) => stream.poll_next_unpin(cx),
            Inner::Lazy(state) => loop {
                match state {
                    LazyState::Idle(init) => match init.take() {
                        Some(init) => *state = LazyState::Opening(init()),
                        None => {
                            *state = LazyState::Done;
                        }
                    },
                    LazyState::Opening(opening) => match futures::ready!(opening.as_mut().poll(cx)) {
                        Ok(stream) => *state = LazyState::Streaming(stream),
                        Err(err) => {
                            *state = LazyState::Done;
                            return Poll::Ready(Some(Err(err)));
                        }
                    },
                    LazyState::Streaming(stream) => return stream.poll_next_unpin(cx),
                    LazyState::Done => return Poll::Ready(None),
                }
            },
        }
    }
}

impl std::fmt::Debug for CacheBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match &self.inner {
            Inner::Empty => "Empty",
            Inner::Full(_) => "Full",
            Inner::Channel(_) => "Channel",
            Inner::Stream(_) => "Stream",
            Inner::Lazy(_) => "Lazy",
        };
        f.debug_struct("CacheBody").field("kind", &kind).finish()
    }
}
