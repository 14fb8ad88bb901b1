//! Authentication Models
//!
//! Request/response payloads for guest authentication and the session data
//! injected into protected handlers.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::auth::jwt::BookingClaims;

/// Verified guest identity extracted from a bearer token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingSession {
    pub reference: i64,
    pub arrival: NaiveDate,
    pub departure: NaiveDate,
    pub accommodation: String,
    pub expires_at: i64,
}

impl From<BookingClaims> for BookingSession {
    fn from(claims: BookingClaims) -> Self {
        Self {
            reference: claims.booking_reference,
            arrival: claims.arrival_date,
            departure: claims.departure_date,
            accommodation: claims.accommodation,
            expires_at: claims.exp,
        }
    }
}

/// Authentication request payload; the reference may arrive as number or string
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticateRequest {
    #[serde(default)]
    pub booking_reference: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct BookingSummary {
    pub reference: i64,
    pub arrival: NaiveDate,
    pub departure: NaiveDate,
    pub accommodation: String,
}

/// Token response after successful authentication
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticateResponse {
    pub success: bool,
    pub message: String,
    pub token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub booking: BookingSummary,
    pub access_valid_until: String,
}

impl AuthenticateResponse {
    pub fn new(token: String, expires_in: i64, booking: BookingSummary, valid_until: DateTime<Utc>) -> Self {
        Self {
            success: true,
            message: format!(
                "Welcome! You're successfully signed in. Access valid until {} at {} UTC.",
                valid_until.format("%Y-%m-%d"),
                valid_until.format("%H:%M"),
            ),
            token,
            token_type: "Bearer".to_string(),
            expires_in,
            booking,
            access_valid_until: valid_until.to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}
