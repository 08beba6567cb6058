//! Wire timestamp parsing.
//!
//! The remote backend emits ISO-8601 timestamps produced by Python's
//! `datetime.isoformat()`, which omits the timezone offset for naive
//! datetimes. Parsing is tolerant: RFC 3339 first, then a naive datetime
//! assumed to be UTC, then the current time as a last resort.

use chrono::{DateTime, NaiveDateTime, Utc};

/// Parse a wire timestamp string, falling back to `now` when unparseable.
#[must_use]
pub fn parse_wire_timestamp(raw: &str) -> DateTime<Utc> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return ts.with_timezone(&Utc);
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return naive.and_utc();
    }
    tracing::warn!(raw = %raw, "unparseable wire timestamp, substituting now");
    Utc::now()
}

/// Format a timestamp the way the wire expects it (RFC 3339).
#[must_use]
pub fn format_wire_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
