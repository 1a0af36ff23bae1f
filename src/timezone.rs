//! Timezone handling for calendar events and queries.
//!
//! All stored timestamps are UTC; everything shown to or compared for the
//! user is in their selected IANA zone. `offset_modifier` produces the
//! SQLite shift string used to bucket UTC rows into the user's civil day.

use chrono::{DateTime, NaiveDateTime, Offset, TimeZone, Utc};
use chrono_tz::Tz;
use thiserror::Error;

pub const STORAGE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Error)]
pub enum TimezoneError {
    #[error("unknown timezone '{0}'")]
    UnknownTimezone(String),
    #[error("unparseable timestamp '{0}'")]
    InvalidTimestamp(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimezoneManager {
    user_timezone: Tz,
}

impl Default for TimezoneManager {
    fn default() -> Self {
        Self {
            user_timezone: Tz::UTC,
        }
    }
}

impl TimezoneManager {
    /// Falls back to UTC (with a warning) when the name is unrecognized.
    pub fn new(timezone_str: Option<&str>) -> Self {
        match timezone_str {
            Some(name) => Self::parse(name).unwrap_or_else(|_| {
                tracing::warn!(timezone = name, "unknown timezone, using UTC");
                Self::default()
            }),
            None => Self::default(),
        }
    }

    pub fn parse(name: &str) -> Result<Self, TimezoneError> {
        name.parse::<Tz>()
            .map(|tz| Self { user_timezone: tz })
            .map_err(|_| TimezoneError::UnknownTimezone(name.to_string()))
    }

    /// Returns false and keeps the previous zone when the name is invalid.
    pub fn set_timezone(&mut self, name: &str) -> bool {
        match Self::parse(name) {
            Ok(next) => {
                *self = next;
                true
            }
            Err(_) => false,
        }
    }

    pub fn name(&self) -> &'static str {
        self.user_timezone.name()
    }

    pub fn tz(&self) -> Tz {
        self.user_timezone
    }

    pub fn to_user_tz(&self, dt: DateTime<Utc>) -> DateTime<Tz> {
        dt.with_timezone(&self.user_timezone)
    }

    /// Reinterprets a zone-naive timestamp as UTC, then projects it into
    /// the user zone.
    pub fn naive_utc_to_user(&self, naive: NaiveDateTime) -> DateTime<Tz> {
        Utc.from_utc_datetime(&naive).with_timezone(&self.user_timezone)
    }

    /// Attaches the user zone to a naive wall-clock time. Ambiguous times
    /// (DST fall-back) resolve to the earliest valid instant; nonexistent
    /// times (spring-forward gap) are reinterpreted through UTC.
    pub fn localize(&self, naive: NaiveDateTime) -> DateTime<Tz> {
        match self.user_timezone.from_local_datetime(&naive).earliest() {
            Some(dt) => dt,
            None => Utc.from_utc_datetime(&naive).with_timezone(&self.user_timezone),
        }
    }

    /// Reinterprets a zone-naive timestamp as user-zone wall clock and
    /// projects it to UTC.
    pub fn to_utc(&self, naive: NaiveDateTime) -> DateTime<Utc> {
        self.localize(naive).with_timezone(&Utc)
    }

    pub fn now_in_user_tz(&self) -> DateTime<Tz> {
        Utc::now().with_timezone(&self.user_timezone)
    }

    /// Canonical sortable cache key: `YYYY-MM-DD HH:MM:SS` in UTC.
    pub fn format_for_storage<T: TimeZone>(&self, dt: &DateTime<T>) -> String {
        dt.with_timezone(&Utc).format(STORAGE_FORMAT).to_string()
    }

    /// Inverse of `format_for_storage`, yielding a user-zone instant. Also
    /// accepts ISO-8601 timestamps (with or without offset) for rows
    /// written by older builds.
    pub fn parse_from_storage(&self, raw: &str) -> Result<DateTime<Tz>, TimezoneError> {
        let naive = NaiveDateTime::parse_from_str(raw, STORAGE_FORMAT)
            .or_else(|_| DateTime::parse_from_rfc3339(raw).map(|dt| dt.naive_utc()))
            .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S"))
            .map_err(|_| TimezoneError::InvalidTimestamp(raw.to_string()))?;
        Ok(self.naive_utc_to_user(naive))
    }

    pub fn utc_offset_seconds(&self) -> i32 {
        self.now_in_user_tz().offset().fix().local_minus_utc()
    }

    /// SQLite shift constant for the zone's offset at the current moment,
    /// e.g. `-5 hours` or `+5 hours, +30 minutes`. Computed once per call,
    /// not per row: bulk date-bucketing queries spanning a DST transition
    /// misclassify events near the boundary. Known approximation.
    pub fn offset_modifier(&self) -> String {
        let offset_secs = self.utc_offset_seconds();
        let sign = if offset_secs < 0 { '-' } else { '+' };
        let total = offset_secs.unsigned_abs();
        let hours = total / 3600;
        let minutes = (total % 3600) / 60;
        if minutes == 0 {
            format!("{sign}{hours} hours")
        } else {
            format!("{sign}{hours} hours, {sign}{minutes} minutes")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn naive(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, 0)
            .unwrap()
    }

    #[test]
    fn invalid_timezone_keeps_previous_zone() {
        let mut tz = TimezoneManager::new(Some("America/New_York"));
        assert!(!tz.set_timezone("Mars/Olympus_Mons"));
        assert_eq!(tz.name(), "America/New_York");
        assert!(tz.set_timezone("Europe/London"));
        assert_eq!(tz.name(), "Europe/London");
    }

    #[test]
    fn unknown_initial_timezone_defaults_to_utc() {
        let tz = TimezoneManager::new(Some("Not/A_Zone"));
        assert_eq!(tz.name(), "UTC");
    }

    #[test]
    fn utc_round_trip_across_zones() {
        for name in ["UTC", "America/New_York", "Asia/Kolkata", "Australia/Sydney"] {
            let tz = TimezoneManager::new(Some(name));
            let instant = Utc.with_ymd_and_hms(2024, 3, 11, 3, 0, 0).unwrap();
            let local = tz.to_user_tz(instant);
            assert_eq!(local.with_timezone(&Utc), instant, "zone {name}");
        }
    }

    #[test]
    fn localize_then_to_utc_preserves_wall_clock() {
        let tz = TimezoneManager::new(Some("America/New_York"));
        let wall = naive(2024, 6, 1, 9, 30);
        let utc = tz.to_utc(wall);
        assert_eq!(tz.to_user_tz(utc).naive_local(), wall);
    }

    #[test]
    fn storage_round_trip() {
        let tz = TimezoneManager::new(Some("Asia/Kolkata"));
        let local = tz.localize(naive(2024, 3, 11, 12, 0));
        let stored = tz.format_for_storage(&local);
        // 12:00 IST is 06:30 UTC.
        assert_eq!(stored, "2024-03-11 06:30:00");
        let back = tz.parse_from_storage(&stored).unwrap();
        assert_eq!(back, local);
    }

    #[test]
    fn parse_from_storage_accepts_iso_with_offset() {
        let tz = TimezoneManager::default();
        let parsed = tz.parse_from_storage("2024-03-11T03:00:00+00:00").unwrap();
        assert_eq!(
            parsed.with_timezone(&Utc),
            Utc.with_ymd_and_hms(2024, 3, 11, 3, 0, 0).unwrap()
        );
        assert!(tz.parse_from_storage("yesterday-ish").is_err());
    }

    #[test]
    fn offset_modifier_formats_half_hour_zones() {
        assert_eq!(
            TimezoneManager::new(Some("Asia/Kolkata")).offset_modifier(),
            "+5 hours, +30 minutes"
        );
        assert_eq!(TimezoneManager::default().offset_modifier(), "+0 hours");
    }
}
