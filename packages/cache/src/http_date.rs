//! HTTP date formatting utilities
//!
//! Cache-served responses report the record's original write time in RFC 7231
//! IMF-fixdate form, while freshly stored responses stamp the current time in
//! ISO-8601.

use std::time::SystemTime;

use chrono::{DateTime, SecondsFormat, Utc};

/// Format a timestamp as an RFC 7231 IMF-fixdate, e.g.
/// `Sun, 06 Nov 1994 08:49:37 GMT`.
pub fn fmt_http_date(time: SystemTime) -> String {
    let time: DateTime<Utc> = time.into();
    time.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Format a timestamp as ISO-8601 / RFC 3339 with millisecond precision,
/// e.g. `1994-11-06T08:49:37.000Z`.
pub fn iso8601(time: SystemTime) -> String {
    let time: DateTime<Utc> = time.into();
    time.to_rfc3339_opts(SecondsFormat::Millis, true)
}
