//! Network transport collaborator contract

use futures::future::BoxFuture;
use http::{Request, Response};

use crate::body::CacheBody;
use crate::error::Error;

/// Performs the actual origin exchange. Transport failures are reported as
/// [`Error::Transport`] and propagate with their identity intact.
pub trait Remote: Send + Sync {
    fn fetch(&self, request: Request<()>) -> BoxFuture<'_, Result<Response<CacheBody>, Error>>;
}
