//! Cache key derivation
//!
//! A deterministic string key per logical request: method plus normalized
//! URL. Identical logical requests must map to identical keys, so the URL is
//! run through a parser that lowercases the host, strips default ports, and
//! drops fragments before it lands in the key.

use http::{Request, Uri};
use url::Url;

/// Namespace prefix so cache keys never collide with other index users.
const KEY_PREFIX: &str = "stash-cache:request";

/// Derive the store index key for a request.
pub fn cache_key<B>(request: &Request<B>) -> String {
    format!(
        "{}:{}:{}",
        KEY_PREFIX,
        request.method(),
        normalize_url(request.uri())
    )
}

fn normalize_url(uri: &Uri) -> String {
    match Url::parse(&uri.to_string()) {
        Ok(mut url) => {
            url.set_fragment(None);
            url.to_string()
        }
        // relative or otherwise unparseable URIs key on their literal form
        Err(_) => uri.to_string(),
    }
}
