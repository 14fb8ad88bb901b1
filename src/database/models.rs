// Database Models
//
// Tokio-postgres compatible records for bookings, guests, service requests and units.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_postgres::Row;
use uuid::Uuid;

/// Trait for converting from tokio-postgres Row
pub trait FromRow {
    fn from_row(row: &Row) -> Result<Self, tokio_postgres::Error>
    where
        Self: Sized;
}

// ============================================================================
// BOOKINGS & GUESTS
// ============================================================================

/// A reservation as delivered by the booking channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub reference: i64,
    pub arrival: NaiveDate,
    pub departure: NaiveDate,
    /// Free-text label, usually "<development> R<number>"
    pub accommodation: String,
}

impl FromRow for Booking {
    fn from_row(row: &Row) -> Result<Self, tokio_postgres::Error> {
        Ok(Self {
            reference: row.try_get("booking_reference")?,
            arrival: row.try_get("arrival")?,
            departure: row.try_get("departure")?,
            accommodation: row.try_get("accommodation")?,
        })
    }
}

/// Result of an ingest write
#[derive(Debug, Clone)]
pub struct BookingUpsert {
    pub booking: Booking,
    pub created: bool,
}

/// Sign-in history for the holder of a booking reference
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Guest {
    pub reference: i64,
    pub first_sign_up: DateTime<Utc>,
    pub last_sign_in: DateTime<Utc>,
    pub sign_in_count: i32,
    /// Audit mirror of the latest issued token; the signature is authoritative
    pub current_token: String,
    pub token_expires_at: DateTime<Utc>,
}

impl FromRow for Guest {
    fn from_row(row: &Row) -> Result<Self, tokio_postgres::Error> {
        Ok(Self {
            reference: row.try_get("booking_reference")?,
            first_sign_up: row.try_get("first_sign_up")?,
            last_sign_in: row.try_get("last_sign_in")?,
            sign_in_count: row.try_get("sign_in_count")?,
            current_token: row.try_get("current_token")?,
            token_expires_at: row.try_get("token_expires_at")?,
        })
    }
}

/// One successful authentication, applied to the guest record as an upsert
#[derive(Debug, Clone)]
pub struct GuestSignIn {
    pub reference: i64,
    pub token: String,
    pub token_expires_at: DateTime<Utc>,
    pub signed_in_at: DateTime<Utc>,
}

// ============================================================================
// SERVICE REQUESTS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestType {
    #[serde(alias = "extending")]
    Extension,
    Cleaning,
    Maintenance,
}

impl RequestType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Extension => "extension",
            Self::Cleaning => "cleaning",
            Self::Maintenance => "maintenance",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "extension" | "extending" => Some(Self::Extension),
            "cleaning" => Some(Self::Cleaning),
            "maintenance" => Some(Self::Maintenance),
            _ => None,
        }
    }
}

/// Guest-submitted ticket before it is stored
#[derive(Debug, Clone, Default)]
pub struct NewServiceRequest {
    pub reference: i64,
    pub request_type: Option<RequestType>,
    pub category: Option<String>,
    pub room_number: Option<String>,
    pub guest_name: Option<String>,
    pub phone: Option<String>,
    pub check_in: Option<String>,
    pub check_out: Option<String>,
    pub note: Option<String>,
}

/// Stored ticket, annotated later with the CRM relay outcome
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRequest {
    pub id: Uuid,
    #[serde(rename = "Reference_Number")]
    pub reference: i64,
    #[serde(rename = "type")]
    pub request_type: Option<RequestType>,
    pub category: Option<String>,
    #[serde(rename = "roomnumber")]
    pub room_number: Option<String>,
    pub guest_name: Option<String>,
    pub phone: Option<String>,
    pub check_in: Option<String>,
    pub check_out: Option<String>,
    pub note: Option<String>,
    pub crm_sent: Option<bool>,
    pub crm_response: Option<Value>,
    pub created_at: DateTime<Utc>,
}

impl ServiceRequest {
    pub fn from_new(id: Uuid, new: NewServiceRequest, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            reference: new.reference,
            request_type: new.request_type,
            category: new.category,
            room_number: new.room_number,
            guest_name: new.guest_name,
            phone: new.phone,
            check_in: new.check_in,
            check_out: new.check_out,
            note: new.note,
            crm_sent: None,
            crm_response: None,
            created_at,
        }
    }
}

impl FromRow for ServiceRequest {
    fn from_row(row: &Row) -> Result<Self, tokio_postgres::Error> {
        let request_type: Option<String> = row.try_get("request_type")?;
        Ok(Self {
            id: row.try_get("id")?,
            reference: row.try_get("booking_reference")?,
            request_type: request_type.as_deref().and_then(RequestType::parse),
            category: row.try_get("request_category")?,
            room_number: row.try_get("room_number")?,
            guest_name: row.try_get("guest_name")?,
            phone: row.try_get("phone")?,
            check_in: row.try_get("check_in")?,
            check_out: row.try_get("check_out")?,
            note: row.try_get("note")?,
            crm_sent: row.try_get("crm_sent")?,
            crm_response: row.try_get("crm_response")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

// ============================================================================
// UNITS
// ============================================================================

/// Physical unit as listed in the operations sheet
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Unit {
    /// Unit code, e.g. "R217"
    pub reference: String,
    pub development: Option<String>,
    pub units: Option<String>,
    pub number_of_bedrooms: Option<i32>,
    pub floor: Option<String>,
    pub neighborhood: Option<String>,
    pub tourism_license: Option<String>,
    pub parking: Option<String>,
    pub location: Option<String>,
}

impl FromRow for Unit {
    fn from_row(row: &Row) -> Result<Self, tokio_postgres::Error> {
        Ok(Self {
            reference: row.try_get("reference")?,
            development: row.try_get("development")?,
            units: row.try_get("units")?,
            number_of_bedrooms: row.try_get("number_of_bedrooms")?,
            floor: row.try_get("floor")?,
            neighborhood: row.try_get("neighborhood")?,
            tourism_license: row.try_get("tourism_license")?,
            parking: row.try_get("parking")?,
            location: row.try_get("location")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_type_accepts_legacy_spelling() {
        let parsed: RequestType = serde_json::from_str("\"extending\"").unwrap();
        assert_eq!(parsed, RequestType::Extension);
        assert_eq!(RequestType::parse("extending"), Some(RequestType::Extension));
        assert_eq!(RequestType::parse("laundry"), None);
    }

    #[test]
    fn service_request_serializes_legacy_field_names() {
        let new = NewServiceRequest {
            reference: 123456,
            request_type: Some(RequestType::Cleaning),
            room_number: Some("Studio 205".into()),
            ..Default::default()
        };
        let request = ServiceRequest::from_new(Uuid::nil(), new, Utc::now());
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["Reference_Number"], 123456);
        assert_eq!(json["roomnumber"], "Studio 205");
        assert_eq!(json["type"], "cleaning");
        assert!(json["crmSent"].is_null());
    }
}
