//! Boundary response headers
//!
//! Every response leaving this core carries `x-local-cache-*` headers
//! describing where the bytes came from and how they moved. These headers
//! are set only here, never by collaborators. Path and key values are
//! percent-encoded because they may contain characters that are not valid in
//! a header value.

use std::time::SystemTime;

use http::{HeaderMap, HeaderName, HeaderValue};

use crate::config::CacheOptions;
use crate::http_date;

pub const X_LOCAL_CACHE: &str = "x-local-cache";
pub const X_LOCAL_CACHE_HASH: &str = "x-local-cache-hash";
pub const X_LOCAL_CACHE_KEY: &str = "x-local-cache-key";
pub const X_LOCAL_CACHE_MODE: &str = "x-local-cache-mode";
pub const X_LOCAL_CACHE_STATUS: &str = "x-local-cache-status";
pub const X_LOCAL_CACHE_TIME: &str = "x-local-cache-time";

fn set(headers: &mut HeaderMap, name: &'static str, value: &str) {
    if let Ok(value) = HeaderValue::from_str(value) {
        headers.insert(HeaderName::from_static(name), value);
    }
}

fn set_encoded(headers: &mut HeaderMap, name: &'static str, raw: &str) {
    set(headers, name, &urlencoding::encode(raw));
}

/// Headers attached when a fresh response is written through to the store.
/// No hash header here: the digest is unknown until the write completes,
/// after the response has started streaming.
pub(crate) fn attach_store_headers(
    headers: &mut HeaderMap,
    options: &CacheOptions,
    key: &str,
    mode: &str,
    status: &str,
) {
    set_encoded(headers, X_LOCAL_CACHE, &options.cache_path.to_string_lossy());
    set_encoded(headers, X_LOCAL_CACHE_KEY, key);
    set(headers, X_LOCAL_CACHE_MODE, mode);
    set(headers, X_LOCAL_CACHE_STATUS, status);
    set(headers, X_LOCAL_CACHE_TIME, &http_date::iso8601(SystemTime::now()));
}

/// Headers attached when a response is served from the store. The time header
/// reports the record's original write time as an HTTP date.
pub(crate) fn attach_cache_headers(
    headers: &mut HeaderMap,
    options: &CacheOptions,
    key: &str,
    integrity: Option<&str>,
    mode: &str,
    status: &str,
    time: SystemTime,
) {
    set_encoded(headers, X_LOCAL_CACHE, &options.cache_path.to_string_lossy());
    if let Some(integrity) = integrity {
        set_encoded(headers, X_LOCAL_CACHE_HASH, integrity);
    }
    set_encoded(headers, X_LOCAL_CACHE_KEY, key);
    set(headers, X_LOCAL_CACHE_MODE, mode);
    set(headers, X_LOCAL_CACHE_STATUS, status);
    set(headers, X_LOCAL_CACHE_TIME, &http_date::fmt_http_date(time));
}
