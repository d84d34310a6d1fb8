use axum::http::HeaderMap;
use chrono::{DateTime, Timelike, Utc};

/// Cache validators for the file being served, derived from the store's
/// metadata for the current version. Never cached across requests.
#[derive(Clone, Debug)]
pub struct CachingContext {
    /// Fixity digest of the file, unquoted lowercase hex.
    pub etag: String,
    /// Instant of the most recent version that changed the file.
    pub last_modified: DateTime<Utc>,
}

/// The conditional and range headers the planner consults.
#[derive(Clone, Debug, Default)]
pub struct RequestConditions {
    pub if_none_match: Option<String>,
    pub if_modified_since: Option<String>,
    pub range: Option<String>,
}

impl RequestConditions {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let text = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned)
        };
        Self {
            if_none_match: text("if-none-match"),
            if_modified_since: text("if-modified-since"),
            range: text("range"),
        }
    }
}

/// How to answer a content request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Plan {
    /// Send the whole file.
    Full,
    /// Send the inclusive byte span `[start, end]`.
    Partial { start: u64, end: u64 },
    /// The client's cached copy is still valid.
    NotModified,
    /// The range cannot be satisfied for a file of this size.
    Unsatisfiable,
}

/// Decide how to answer a content request. Pure; no I/O.
///
/// Precedence, first decision wins:
/// 1. `If-None-Match` equal (quotes stripped) to the current ETag.
/// 2. `If-Modified-Since` at or after the seconds-truncated last-modified
///    instant. An unparseable value is ignored.
/// 3. A `Range` header: a valid in-bounds span, or unsatisfiable.
/// 4. Full response.
///
/// A conditional header that is present but does not decide falls through to
/// the next clause.
pub fn plan(conditions: &RequestConditions, file_size: u64, caching: &CachingContext) -> Plan {
    if let Some(tag) = non_empty(conditions.if_none_match.as_deref()) {
        if tag.trim().trim_matches('"') == caching.etag {
            return Plan::NotModified;
        }
    }
    if let Some(since) = non_empty(conditions.if_modified_since.as_deref()) {
        if let Ok(threshold) = DateTime::parse_from_rfc2822(since) {
            let stored = truncate_to_seconds(caching.last_modified);
            if stored <= threshold.with_timezone(&Utc) {
                return Plan::NotModified;
            }
        }
    }
    if let Some(range) = non_empty(conditions.range.as_deref()) {
        return match parse_byte_range(range, file_size) {
            Some((start, end)) => Plan::Partial { start, end },
            None => Plan::Unsatisfiable,
        };
    }
    Plan::Full
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|s| !s.trim().is_empty())
}

fn truncate_to_seconds(t: DateTime<Utc>) -> DateTime<Utc> {
    t.with_nanosecond(0).unwrap_or(t)
}

/// Parse a `Range` header into an inclusive byte span.
///
/// Only the `bytes` unit and a single range are accepted; a comma-separated
/// list is rejected outright. Forms: `bytes=A-B`, `bytes=A-` (to end of
/// file), `bytes=-N` (last N bytes). Returns `None` when the header is
/// malformed or the span falls outside `[0, file_size)`.
fn parse_byte_range(header: &str, file_size: u64) -> Option<(u64, u64)> {
    let spec = header.trim().strip_prefix("bytes=")?;
    if spec.contains(',') {
        return None;
    }
    let (first, second) = spec.split_once('-')?;
    let (first, second) = (first.trim(), second.trim());

    let (start, end) = if first.is_empty() {
        // Suffix form: the last N bytes.
        let n: u64 = second.parse().ok()?;
        (file_size.checked_sub(n)?, file_size.checked_sub(1)?)
    } else {
        let start: u64 = first.parse().ok()?;
        let end: u64 = if second.is_empty() {
            file_size.checked_sub(1)?
        } else {
            second.parse().ok()?
        };
        (start, end)
    };

    if start >= file_size || end >= file_size {
        return None;
    }
    Some((start, end))
}

/// Format an instant as an RFC-1123 HTTP date (`Last-Modified` and friends).
pub fn http_date(t: DateTime<Utc>) -> String {
    t.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}
