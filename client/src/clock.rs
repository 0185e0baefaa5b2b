//! Clock reconciliation for server-issued deadlines.
//!
//! The server stamps deadlines on its own clock. A deadline is translated to
//! the local clock by the offset between local time and the server timestamp
//! carried in the same message, so the countdown shown is independent of
//! how far the two clocks disagree.

use chrono::{DateTime, NaiveDateTime};
use serde_json::Value;
use shared::number_from;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Numeric legacy expiries above this are absolute epoch milliseconds;
/// anything at or below it is already a relative number of seconds.
pub const LEGACY_ABSOLUTE_THRESHOLD: f64 = 1e12;

/// Current wall-clock time in epoch milliseconds.
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis() as i64
}

/// Parses epoch milliseconds from a number, a numeric string, or a date
/// string (RFC 3339, RFC 2822, or ISO 8601 without offset, read as UTC).
pub fn parse_timestamp(value: &Value) -> Option<i64> {
    if let Some(number) = number_from(value) {
        return Some(number as i64);
    }
    match value {
        Value::String(s) => parse_date(s),
        _ => None,
    }
}

fn parse_date(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.timestamp_millis());
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt.timestamp_millis());
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc().timestamp_millis())
}

/// Clamps a relative seconds value to a non-negative whole number of seconds.
pub fn clamp_seconds(seconds: f64) -> u32 {
    if !seconds.is_finite() || seconds <= 0.0 {
        return 0;
    }
    seconds.ceil().min(u32::MAX as f64) as u32
}

fn ceil_seconds(millis: i64) -> u32 {
    if millis <= 0 {
        return 0;
    }
    let secs = millis.saturating_add(999) / 1000;
    secs.min(u32::MAX as i64) as u32
}

/// A server deadline expressed on the local clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    local_expiry_ms: i64,
}

impl Deadline {
    /// Translates `expiry_ms` (server clock) using the offset observed when
    /// `server_now_ms` was received at `local_now_ms`.
    pub fn from_server(expiry_ms: i64, server_now_ms: i64, local_now_ms: i64) -> Self {
        let client_offset = local_now_ms.saturating_sub(server_now_ms);
        Self {
            local_expiry_ms: expiry_ms.saturating_add(client_offset),
        }
    }

    pub fn after_seconds(seconds: u32, local_now_ms: i64) -> Self {
        Self {
            local_expiry_ms: local_now_ms.saturating_add(seconds as i64 * 1000),
        }
    }

    pub fn remaining_at(&self, local_now_ms: i64) -> u32 {
        ceil_seconds(self.local_expiry_ms.saturating_sub(local_now_ms))
    }
}

/// Seconds remaining until `expiry`, corrected for client/server skew.
///
/// Falls back to `fallback_secs` (clamped to zero) when either timestamp is
/// missing or unparseable.
pub fn reconcile(
    expiry: Option<&Value>,
    server_now: Option<&Value>,
    fallback_secs: f64,
    local_now_ms: i64,
) -> u32 {
    match (
        expiry.and_then(parse_timestamp),
        server_now.and_then(parse_timestamp),
    ) {
        (Some(expiry), Some(server_now)) => {
            Deadline::from_server(expiry, server_now, local_now_ms).remaining_at(local_now_ms)
        }
        _ => clamp_seconds(fallback_secs),
    }
}

/// Older event shapes carry a single expiry value: either an absolute
/// timestamp (distinguished by magnitude) or relative seconds, or a date
/// string. Absolute values are compared against the local clock directly.
pub fn legacy_remaining(value: &Value, local_now_ms: i64) -> u32 {
    if let Some(number) = number_from(value) {
        return if number > LEGACY_ABSOLUTE_THRESHOLD {
            ceil_seconds((number as i64).saturating_sub(local_now_ms))
        } else {
            clamp_seconds(number)
        };
    }
    match value {
        Value::String(s) => parse_date(s)
            .map(|expiry| ceil_seconds(expiry.saturating_sub(local_now_ms)))
            .unwrap_or(0),
        _ => 0,
    }
}

/// Picks the best available source for a countdown carried by an event:
/// skew-corrected expiry, then the relative value, then the legacy expiry
/// shape. `None` when the event carries nothing usable.
pub fn remaining_from_event(
    expiry: Option<&Value>,
    server_now: Option<&Value>,
    remaining: Option<&Value>,
    local_now_ms: i64,
) -> Option<u32> {
    let relative = remaining.and_then(number_from);
    let expiry_parsed = expiry.and_then(parse_timestamp);
    let server_parsed = server_now.and_then(parse_timestamp);

    if expiry_parsed.is_some() && server_parsed.is_some() {
        return Some(reconcile(
            expiry,
            server_now,
            relative.unwrap_or(0.0),
            local_now_ms,
        ));
    }
    if let Some(relative) = relative {
        return Some(clamp_seconds(relative));
    }
    expiry.map(|value| legacy_remaining(value, local_now_ms))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SERVER_NOW: i64 = 1_700_000_000_000;

    #[test]
    fn test_reconcile_without_skew() {
        let remaining = reconcile(
            Some(&json!(SERVER_NOW + 30_000)),
            Some(&json!(SERVER_NOW)),
            0.0,
            SERVER_NOW,
        );
        assert_eq!(remaining, 30);
    }

    #[test]
    fn test_reconcile_is_independent_of_clock_offset() {
        let expiry = SERVER_NOW + 12_345;
        let bound = ((expiry - SERVER_NOW) as f64 / 1000.0).ceil() as u32 + 1;

        for offset in [
            -86_400_000i64,
            -3_600_000,
            -1_500,
            -1,
            0,
            1,
            999,
            45_000,
            3_600_000,
            86_400_000,
        ] {
            let local_now = SERVER_NOW + offset;
            let remaining = reconcile(
                Some(&json!(expiry)),
                Some(&json!(SERVER_NOW)),
                0.0,
                local_now,
            );
            assert!(remaining <= bound, "offset {} gave {}", offset, remaining);
            assert_eq!(remaining, 13);
        }
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let expiry = json!(SERVER_NOW + 7_100);
        let server_now = json!(SERVER_NOW);
        let first = reconcile(Some(&expiry), Some(&server_now), 5.0, SERVER_NOW + 250);
        let second = reconcile(Some(&expiry), Some(&server_now), 5.0, SERVER_NOW + 250);
        assert_eq!(first, second);
    }

    #[test]
    fn test_reconcile_past_expiry_clamps_to_zero() {
        let remaining = reconcile(
            Some(&json!(SERVER_NOW - 5_000)),
            Some(&json!(SERVER_NOW)),
            10.0,
            SERVER_NOW,
        );
        assert_eq!(remaining, 0);
    }

    #[test]
    fn test_reconcile_falls_back_on_unparseable_timestamps() {
        assert_eq!(
            reconcile(Some(&json!("soon")), Some(&json!(SERVER_NOW)), 12.2, 0),
            13
        );
        assert_eq!(reconcile(None, Some(&json!(SERVER_NOW)), -4.0, 0), 0);
        assert_eq!(reconcile(Some(&json!(SERVER_NOW)), None, f64::NAN, 0), 0);
    }

    #[test]
    fn test_reconcile_accepts_date_strings() {
        let remaining = reconcile(
            Some(&json!("2024-01-01T00:00:20Z")),
            Some(&json!("2024-01-01T00:00:00Z")),
            0.0,
            SERVER_NOW,
        );
        assert_eq!(remaining, 20);

        let naive = reconcile(
            Some(&json!("2024-01-01T00:00:10.500")),
            Some(&json!("2024-01-01T00:00:00")),
            0.0,
            SERVER_NOW,
        );
        assert_eq!(naive, 11);
    }

    #[test]
    fn test_legacy_magnitude_heuristic() {
        let now = SERVER_NOW;
        assert_eq!(legacy_remaining(&json!(25), now), 25);
        assert_eq!(legacy_remaining(&json!(24.2), now), 25);
        assert_eq!(legacy_remaining(&json!(-3), now), 0);
        assert_eq!(legacy_remaining(&json!(now + 9_000), now), 9);
        assert_eq!(legacy_remaining(&json!(now - 9_000), now), 0);
        // At the threshold the value is still read as relative seconds.
        assert_eq!(
            legacy_remaining(&json!(LEGACY_ABSOLUTE_THRESHOLD), now),
            u32::MAX
        );
    }

    #[test]
    fn test_legacy_date_string() {
        let expiry = DateTime::parse_from_rfc3339("2024-01-01T00:01:00Z")
            .unwrap()
            .timestamp_millis();
        let now = expiry - 42_000;
        assert_eq!(legacy_remaining(&json!("2024-01-01T00:01:00Z"), now), 42);
        assert_eq!(legacy_remaining(&json!("garbage"), now), 0);
        assert_eq!(legacy_remaining(&json!(null), now), 0);
    }

    #[test]
    fn test_remaining_from_event_source_priority() {
        let expiry = json!(SERVER_NOW + 20_000);
        let server = json!(SERVER_NOW);
        assert_eq!(
            remaining_from_event(Some(&expiry), Some(&server), Some(&json!(3)), SERVER_NOW),
            Some(20)
        );
        assert_eq!(
            remaining_from_event(Some(&expiry), None, Some(&json!(3)), SERVER_NOW),
            Some(3)
        );
        assert_eq!(
            remaining_from_event(Some(&expiry), None, None, SERVER_NOW),
            Some(20)
        );
        assert_eq!(remaining_from_event(None, None, None, SERVER_NOW), None);
    }

    #[test]
    fn test_deadline_requery() {
        let deadline = Deadline::from_server(SERVER_NOW + 10_000, SERVER_NOW, 500);
        assert_eq!(deadline.remaining_at(500), 10);
        assert_eq!(deadline.remaining_at(4_500), 6);
        assert_eq!(deadline.remaining_at(20_000), 0);
        assert_eq!(Deadline::after_seconds(5, 0).remaining_at(1), 5);
    }
}
