//! Booking ingest from the n8n booking-channel workflow.
//!
//! Payloads arrive flat or wrapped in `data`, with field names that vary by
//! channel, and dates as `DD/MM/YYYY` or ISO.

use serde_json::Value;

use crate::database::models::Booking;
use crate::error::ApiError;
use crate::services::stay_window::parse_booking_date;

const REFERENCE_KEYS: &[&str] = &["Booking_Reference_Number", "bookingReference", "booking_reference_number"];
// "aravial" is a misspelling some channel exports still send
const ARRIVAL_KEYS: &[&str] = &["Arrival", "arrival", "aravial"];
const DEPARTURE_KEYS: &[&str] = &["Departure", "departure"];
const ACCOMMODATION_KEYS: &[&str] = &["Accommodation", "accommodation"];

fn field<'a>(body: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| body.get(*key))
        .find(|value| match value {
            Value::Null => false,
            Value::String(s) => !s.trim().is_empty(),
            _ => true,
        })
}

fn as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        other => other.to_string(),
    }
}

/// Validate an ingest payload into a booking
pub fn parse_booking_payload(body: &Value) -> Result<Booking, ApiError> {
    let body = match body.get("data") {
        Some(inner @ Value::Object(_)) => inner,
        _ => body,
    };

    let reference = field(body, REFERENCE_KEYS)
        .ok_or_else(|| ApiError::validation("MISSING_BOOKING_REFERENCE", "Booking reference is required"))?;
    let arrival = field(body, ARRIVAL_KEYS)
        .ok_or_else(|| ApiError::validation("MISSING_ARRIVAL", "Arrival date is required"))?;
    let departure = field(body, DEPARTURE_KEYS)
        .ok_or_else(|| ApiError::validation("MISSING_DEPARTURE", "Departure date is required"))?;
    let accommodation = field(body, ACCOMMODATION_KEYS)
        .ok_or_else(|| ApiError::validation("MISSING_ACCOMMODATION", "Accommodation is required"))?;

    let (arrival_raw, departure_raw) = (as_text(arrival), as_text(departure));
    let invalid_dates = || {
        ApiError::validation(
            "INVALID_DATE_FORMAT",
            format!(
                "Invalid date format. Expected DD/MM/YYYY or ISO format (arrival: {arrival_raw}, departure: {departure_raw})."
            ),
        )
    };
    let arrival = parse_booking_date(&arrival_raw).map_err(|_| invalid_dates())?;
    let departure = parse_booking_date(&departure_raw).map_err(|_| invalid_dates())?;
    if departure < arrival {
        return Err(invalid_dates());
    }

    let reference = match reference {
        Value::Number(n) => n.as_i64(),
        other => as_text(other).parse().ok(),
    }
    .ok_or_else(|| ApiError::validation("INVALID_BOOKING_REFERENCE", "Invalid booking reference format"))?;

    Ok(Booking {
        reference,
        arrival,
        departure,
        accommodation: as_text(accommodation),
    })
}
