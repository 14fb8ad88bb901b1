//! Stay window calculation.
//!
//! A booking only carries calendar dates. Access opens at the check-in time on
//! the arrival date and closes at the check-out time on the departure date,
//! both in the property's local offset.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, Offset, TimeZone, Utc};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum StayWindowError {
    #[error("invalid date: {0}")]
    InvalidDate(String),
}

/// Check-in/check-out policy of the property
#[derive(Debug, Clone, Copy)]
pub struct StayPolicy {
    pub check_in: NaiveTime,
    pub check_out: NaiveTime,
    pub utc_offset: FixedOffset,
}

impl StayPolicy {
    pub fn new(utc_offset: FixedOffset) -> Self {
        Self {
            check_in: NaiveTime::from_hms_opt(15, 45, 0).unwrap_or_default(),
            check_out: NaiveTime::from_hms_opt(12, 0, 0).unwrap_or_default(),
            utc_offset,
        }
    }

    pub fn window(&self, arrival: NaiveDate, departure: NaiveDate) -> Result<StayWindow, StayWindowError> {
        if departure < arrival {
            return Err(StayWindowError::InvalidDate(format!(
                "departure {departure} precedes arrival {arrival}"
            )));
        }
        Ok(StayWindow {
            opens_at: self.instant(arrival, self.check_in)?,
            closes_at: self.instant(departure, self.check_out)?,
        })
    }

    fn instant(&self, date: NaiveDate, time: NaiveTime) -> Result<DateTime<Utc>, StayWindowError> {
        self.utc_offset
            .from_local_datetime(&date.and_time(time))
            .single()
            .map(|dt| dt.with_timezone(&Utc))
            .ok_or_else(|| StayWindowError::InvalidDate(format!("{date} {time}")))
    }
}

impl Default for StayPolicy {
    fn default() -> Self {
        Self::new(Utc.fix())
    }
}

/// Interval in which a booking token may be issued; both ends inclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StayWindow {
    pub opens_at: DateTime<Utc>,
    pub closes_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowPosition {
    TooEarly,
    Open,
    TooLate,
}

impl StayWindow {
    pub fn position(&self, now: DateTime<Utc>) -> WindowPosition {
        if now < self.opens_at {
            WindowPosition::TooEarly
        } else if now > self.closes_at {
            WindowPosition::TooLate
        } else {
            WindowPosition::Open
        }
    }

    /// Whole seconds left until access closes; never negative
    pub fn remaining_seconds(&self, now: DateTime<Utc>) -> i64 {
        let millis = (self.closes_at - now).num_milliseconds().max(0);
        millis / 1000
    }
}

/// Parse a booking date as delivered by the booking channel:
/// `YYYY-MM-DD`, `DD/MM/YYYY`, or an RFC 3339 timestamp (date part kept).
pub fn parse_booking_date(raw: &str) -> Result<NaiveDate, StayWindowError> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(date);
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%d/%m/%Y") {
        return Ok(date);
    }
    if let Ok(datetime) = DateTime::parse_from_rfc3339(raw) {
        return Ok(datetime.date_naive());
    }
    Err(StayWindowError::InvalidDate(raw.to_string()))
}
