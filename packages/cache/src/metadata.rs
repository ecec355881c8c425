//! Header/metadata projection
//!
//! Derives the minimal, stable request/response metadata written into the
//! store index, and rebuilds request/response views from it on the way back
//! out. The allow-lists are constants rather than configuration: their
//! contents encode HTTP-correctness requirements (for example omitting `age`,
//! which would make every freshness recomputation see the response as older
//! than it is and declare it perpetually stale).

use std::collections::HashMap;

use http::{header, HeaderMap, HeaderName, HeaderValue, Method, Request, StatusCode};
use serde::{Deserialize, Serialize};

use crate::config::CacheOptions;
use crate::error::Error;
use crate::policy::ResponseHead;

/// Request headers copied into the index for every stored exchange.
const KEEP_REQUEST_HEADERS: [&str; 5] = [
    "accept-charset",
    "accept-encoding",
    "accept-language",
    "accept",
    "cache-control",
];

/// Response headers copied into the index. `age` is deliberately absent.
const KEEP_RESPONSE_HEADERS: [&str; 11] = [
    "cache-control",
    "content-encoding",
    "content-language",
    "content-type",
    "date",
    "etag",
    "expires",
    "last-modified",
    "location",
    "pragma",
    "vary",
];

/// The metadata object persisted alongside each index record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheMetadata {
    /// Full request URL.
    pub url: String,
    /// Response status; omitted for plain 200, recorded for 301/308.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    /// Projected request headers.
    #[serde(default)]
    pub req_headers: HashMap<String, String>,
    /// Projected response headers.
    #[serde(default)]
    pub res_headers: HashMap<String, String>,
}

impl CacheMetadata {
    /// Project a request/response exchange into the exact metadata written to
    /// the index.
    pub fn from_exchange<B>(
        request: &Request<B>,
        response: &ResponseHead,
        options: &CacheOptions,
    ) -> Self {
        let mut metadata = CacheMetadata {
            url: request.uri().to_string(),
            status: explicit_status(response.status),
            req_headers: HashMap::new(),
            res_headers: HashMap::new(),
        };

        for name in KEEP_REQUEST_HEADERS {
            // when the transport decodes bodies automatically, the stored
            // bytes no longer match what accept-encoding negotiated
            if name == "accept-encoding" && options.compress {
                continue;
            }
            if let Some(value) = header_str(request.headers(), name) {
                metadata.req_headers.insert(name.to_string(), value.to_string());
            }
        }

        // a host header that matches the URL host is redundant noise
        if let Some(host) = header_str(request.headers(), "host") {
            let host_name = host.split(':').next().unwrap_or(host);
            let url_host = request.uri().host().unwrap_or("");
            if !host_name.eq_ignore_ascii_case(url_host) {
                metadata.req_headers.insert("host".to_string(), host.to_string());
            }
        }

        if let Some(vary) = header_str(&response.headers, "vary") {
            // freshness can never be proven with wildcard vary, so storing
            // the request headers would only bloat the index
            if vary.trim() != "*" {
                for name in vary.split(',') {
                    let name = name.trim().to_ascii_lowercase();
                    // content negotiation for encoding is handled separately
                    if name.is_empty() || name == "accept-encoding" {
                        continue;
                    }
                    if let Some(value) = header_str(request.headers(), &name) {
                        metadata.req_headers.insert(name, value.to_string());
                    }
                }
            }
        }

        for name in KEEP_RESPONSE_HEADERS {
            if name == "content-encoding" && options.compress {
                continue;
            }
            if let Some(value) = header_str(&response.headers, name) {
                metadata.res_headers.insert(name.to_string(), value.to_string());
            }
        }

        metadata
    }

    /// Rebuild the request this record was stored under. The method is forced
    /// to GET: only GET exchanges are ever written to the store.
    pub fn rebuild_request(&self) -> Result<Request<()>, Error> {
        let mut request = Request::new(());
        *request.method_mut() = Method::GET;
        *request.uri_mut() = self
            .url
            .parse()
            .map_err(|_| Error::Metadata(format!("unparseable stored url: {}", self.url)))?;
        *request.headers_mut() = rebuild_headers(&self.req_headers)?;
        Ok(request)
    }

    /// Rebuild the stored response head: status from the metadata (default
    /// 200), headers from the projection plus a content-length synthesized
    /// from the record's size.
    pub fn rebuild_response_head(&self, size: Option<u64>) -> Result<ResponseHead, Error> {
        let status = match self.status {
            Some(code) => StatusCode::from_u16(code)
                .map_err(|_| Error::Metadata(format!("invalid stored status: {code}")))?,
            None => StatusCode::OK,
        };
        let mut headers = rebuild_headers(&self.res_headers)?;
        if let Some(size) = size {
            if let Ok(value) = HeaderValue::from_str(&size.to_string()) {
                headers.insert(header::CONTENT_LENGTH, value);
            }
        }
        Ok(ResponseHead::new(status, headers))
    }
}

fn explicit_status(status: StatusCode) -> Option<u16> {
    (status != StatusCode::OK).then(|| status.as_u16())
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

fn rebuild_headers(stored: &HashMap<String, String>) -> Result<HeaderMap, Error> {
    let mut headers = HeaderMap::with_capacity(stored.len());
    for (name, value) in stored {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| Error::Metadata(format!("invalid stored header name: {name}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|_| Error::Metadata(format!("invalid stored header value for {name}")))?;
        headers.insert(name, value);
    }
    Ok(headers)
}
