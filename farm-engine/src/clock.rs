//! Server clock and arrival-time parsing
//!
//! All timeline arithmetic runs on the game server's clock. Listings show
//! arrivals as server-local text ("today at 12:00:05:123", "on 24.10. at
//! 08:00:00"), which only become absolute once a current server date is known.

use crate::config::{TimeKeywords, WorldConfig};
use crate::RemoteClock;
use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};
use regex::Regex;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::OnceLock;
use tracing::debug;

/// Local clock corrected by the offset observed in server responses
#[derive(Debug, Default)]
pub struct ServerClock {
    offset_seconds: AtomicI64,
}

impl ServerClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Learn the server offset from an RFC 2822 `Date` header.
    ///
    /// Returns false when the header cannot be parsed.
    pub fn observe_date_header(&self, value: &str) -> bool {
        match DateTime::parse_from_rfc2822(value.trim()) {
            Ok(server) => {
                let offset = server.timestamp() - Utc::now().timestamp();
                let previous = self.offset_seconds.swap(offset, Ordering::Relaxed);
                if previous != offset {
                    debug!(offset, "server clock offset updated");
                }
                true
            }
            Err(_) => false,
        }
    }

    pub fn offset_seconds(&self) -> i64 {
        self.offset_seconds.load(Ordering::Relaxed)
    }
}

impl RemoteClock for ServerClock {
    fn now(&self) -> i64 {
        Utc::now().timestamp() + self.offset_seconds()
    }
}

/// A clock that never moves
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub i64);

impl RemoteClock for FixedClock {
    fn now(&self) -> i64 {
        self.0
    }
}

fn time_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(\d{1,2}):(\d{2}):(\d{2})(?::\d{1,3})?").expect("static time pattern")
    })
}

fn date_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(\d{1,2})\.(\d{1,2})\.(\d{2,4})?").expect("static date pattern")
    })
}

/// Turns server-local arrival text into Unix seconds
#[derive(Debug, Clone)]
pub struct ArrivalParser {
    keywords: TimeKeywords,
    offset: FixedOffset,
}

impl ArrivalParser {
    pub fn new(keywords: TimeKeywords, utc_offset_hours: i32) -> Self {
        let offset = FixedOffset::east_opt(utc_offset_hours * 3600)
            .unwrap_or_else(|| FixedOffset::east_opt(0).expect("zero offset"));
        Self { keywords, offset }
    }

    pub fn for_world(world: &WorldConfig) -> Self {
        Self::new(world.time_keywords.clone(), world.utc_offset_hours)
    }

    /// Resolve `text` against the server time `now`.
    ///
    /// Milliseconds are dropped. Absolute dates without a year belong to the
    /// current year unless that would put them more than half a year in the
    /// past, in which case they belong to the next one.
    pub fn parse(&self, text: &str, now: i64) -> Option<i64> {
        let lowered = text.to_lowercase();
        let caps = time_pattern().captures(&lowered)?;
        let time = NaiveTime::from_hms_opt(
            caps[1].parse().ok()?,
            caps[2].parse().ok()?,
            caps[3].parse().ok()?,
        )?;

        let today = DateTime::from_timestamp(now, 0)?
            .with_timezone(&self.offset)
            .date_naive();

        let date = if contains_any(&lowered, &self.keywords.tomorrow) {
            today.succ_opt()?
        } else if contains_any(&lowered, &self.keywords.yesterday) {
            today.pred_opt()?
        } else if contains_any(&lowered, &self.keywords.today) {
            today
        } else {
            self.absolute_date(&lowered, today)?
        };

        let local = date.and_time(time);
        let resolved = self.offset.from_local_datetime(&local).single()?;
        Some(resolved.timestamp())
    }

    fn absolute_date(&self, text: &str, today: NaiveDate) -> Option<NaiveDate> {
        let caps = date_pattern().captures(text)?;
        let day: u32 = caps[1].parse().ok()?;
        let month: u32 = caps[2].parse().ok()?;

        match caps.get(3) {
            Some(year) => {
                let mut year: i32 = year.as_str().parse().ok()?;
                if year < 100 {
                    year += 2000;
                }
                NaiveDate::from_ymd_opt(year, month, day)
            }
            None => {
                let this_year = NaiveDate::from_ymd_opt(today.year(), month, day)?;
                if today - this_year > Duration::days(182) {
                    NaiveDate::from_ymd_opt(today.year() + 1, month, day)
                } else {
                    Some(this_year)
                }
            }
        }
    }
}

fn contains_any(text: &str, words: &[String]) -> bool {
    words.iter().any(|w| !w.is_empty() && text.contains(&w.to_lowercase()))
}
