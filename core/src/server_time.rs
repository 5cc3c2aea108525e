//! Server clock skew derived from response headers.
//!
//! # Design
//! The offset is captured from the first response that carries a usable
//! `Date` header and frozen for the lifetime of the tracker. Concurrent
//! capturers race on a `OnceLock`; whichever lands first wins and later
//! writes are dropped. The tracker is an ordinary value owned by the request
//! handler, so tests build independent instances.

use std::sync::OnceLock;

use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};
use http::header::{AGE, DATE};
use http::HeaderMap;

#[derive(Debug, Default)]
pub struct ServerTimeTracker {
    offset: OnceLock<TimeDelta>,
}

impl ServerTimeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Capture the offset from `Date`/`Age` headers against the local clock.
    ///
    /// Returns true only if this call captured the offset.
    pub fn update_from_headers(&self, headers: &HeaderMap) -> bool {
        self.update_from_headers_at(headers, Utc::now())
    }

    pub fn update_from_headers_at(&self, headers: &HeaderMap, local_now: DateTime<Utc>) -> bool {
        if self.is_captured() {
            return false;
        }
        let date = headers.get(DATE).and_then(|v| v.to_str().ok());
        let age = headers.get(AGE).and_then(|v| v.to_str().ok());
        self.update_from_values_at(date, age, local_now)
    }

    /// Same as `update_from_headers_at`, for callers holding raw header text.
    pub fn update_from_values_at(&self, date: Option<&str>, age: Option<&str>, local_now: DateTime<Utc>) -> bool {
        if self.is_captured() {
            return false;
        }
        let Some(mut server_now) = date.and_then(parse_http_date) else {
            return false;
        };

        if let Some(age) = age
            .and_then(|a| a.trim().parse::<i64>().ok())
            .and_then(TimeDelta::try_seconds)
        {
            if let Some(adjusted) = server_now.checked_add_signed(age) {
                server_now = adjusted;
            }
        }

        let offset = server_now - local_now;
        let captured = self.offset.set(offset).is_ok();
        if captured {
            tracing::debug!(offset_ms = offset.num_milliseconds(), "captured server time offset");
        }
        captured
    }

    pub fn is_captured(&self) -> bool {
        self.offset.get().is_some()
    }

    pub fn offset(&self) -> Option<TimeDelta> {
        self.offset.get().copied()
    }

    /// Local time corrected by the captured offset, or local time if none.
    pub fn current_server_time_utc(&self) -> DateTime<Utc> {
        self.server_time_at(Utc::now())
    }

    pub fn server_time_at(&self, local_now: DateTime<Utc>) -> DateTime<Utc> {
        match self.offset() {
            Some(offset) => local_now + offset,
            None => local_now,
        }
    }
}

/// Parse an HTTP `Date` value (IMF-fixdate, RFC 2822, asctime or RFC 3339).
pub fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(value) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%a %b %e %H:%M:%S %Y")
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::TimeZone;
    use http::HeaderValue;

    use super::*;

    fn headers(date: &str, age: Option<&str>) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(DATE, HeaderValue::from_str(date).unwrap());
        if let Some(age) = age {
            h.insert(AGE, HeaderValue::from_str(age).unwrap());
        }
        h
    }

    fn local() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2013, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn uncaptured_tracker_reports_local_time() {
        let tracker = ServerTimeTracker::new();
        assert!(tracker.offset().is_none());
        assert_eq!(tracker.server_time_at(local()), local());
    }

    #[test]
    fn date_and_age_are_combined() {
        let tracker = ServerTimeTracker::new();
        let captured = tracker.update_from_headers_at(&headers("Sat, 01 Jun 2013 12:01:00 GMT", Some("5")), local());
        assert!(captured);
        assert_eq!(tracker.offset(), Some(TimeDelta::seconds(65)));
        assert_eq!(
            tracker.server_time_at(local()),
            Utc.with_ymd_and_hms(2013, 6, 1, 12, 1, 5).unwrap()
        );
    }

    #[test]
    fn server_behind_local_gives_negative_offset() {
        let tracker = ServerTimeTracker::new();
        tracker.update_from_headers_at(&headers("Sat, 01 Jun 2013 11:59:30 GMT", None), local());
        assert_eq!(tracker.offset(), Some(TimeDelta::seconds(-30)));
    }

    #[test]
    fn unparseable_age_is_ignored() {
        let tracker = ServerTimeTracker::new();
        tracker.update_from_headers_at(&headers("Sat, 01 Jun 2013 12:00:10 GMT", Some("soon")), local());
        assert_eq!(tracker.offset(), Some(TimeDelta::seconds(10)));
    }

    #[test]
    fn missing_or_bad_date_leaves_tracker_open() {
        let tracker = ServerTimeTracker::new();
        assert!(!tracker.update_from_headers_at(&HeaderMap::new(), local()));
        assert!(!tracker.update_from_headers_at(&headers("yesterday-ish", Some("5")), local()));
        assert!(!tracker.is_captured());

        assert!(tracker.update_from_headers_at(&headers("Sat, 01 Jun 2013 12:00:01 GMT", None), local()));
        assert_eq!(tracker.offset(), Some(TimeDelta::seconds(1)));
    }

    #[test]
    fn offset_is_frozen_after_first_capture() {
        let tracker = ServerTimeTracker::new();
        tracker.update_from_headers_at(&headers("Sat, 01 Jun 2013 12:00:20 GMT", None), local());
        let later = tracker.update_from_headers_at(&headers("Sat, 01 Jun 2013 13:00:00 GMT", Some("100")), local());
        assert!(!later);
        assert_eq!(tracker.offset(), Some(TimeDelta::seconds(20)));
    }

    #[test]
    fn concurrent_capture_keeps_exactly_one_value() {
        let tracker = Arc::new(ServerTimeTracker::new());
        let dates = [
            "Sat, 01 Jun 2013 12:00:01 GMT",
            "Sat, 01 Jun 2013 12:00:02 GMT",
            "Sat, 01 Jun 2013 12:00:03 GMT",
            "Sat, 01 Jun 2013 12:00:04 GMT",
        ];
        let handles: Vec<_> = dates
            .iter()
            .map(|date| {
                let tracker = tracker.clone();
                let h = headers(date, None);
                std::thread::spawn(move || tracker.update_from_headers_at(&h, local()))
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|captured| *captured)
            .count();

        assert_eq!(winners, 1);
        let offset = tracker.offset().unwrap().num_seconds();
        assert!((1..=4).contains(&offset));
    }

    #[test]
    fn parses_other_http_date_shapes() {
        let expected = Utc.with_ymd_and_hms(1994, 11, 6, 8, 49, 37).unwrap();
        assert_eq!(parse_http_date("Sun, 06 Nov 1994 08:49:37 GMT"), Some(expected));
        assert_eq!(parse_http_date("Sun Nov  6 08:49:37 1994"), Some(expected));
        assert_eq!(parse_http_date("1994-11-06T08:49:37Z"), Some(expected));
        assert_eq!(parse_http_date(""), None);
    }
}
