//! # API Errors
//!
//! Every handler failure is an [`ApiError`]. The response body always carries a
//! machine-readable `code` next to the human `error` message so clients can branch
//! without parsing prose.

use axum::{
    Json,
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, FixedOffset, SecondsFormat, Utc};
use serde_json::{Map, Value, json};

use crate::auth::jwt::TokenError;
use crate::services::unit_lock::UnitLockError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Booking reference is required")]
    MissingReference,

    #[error("Invalid booking reference. Please check your booking confirmation.")]
    InvalidReference,

    /// Opening instant at the property's offset
    #[error(
        "Your access begins on {} at {}. Please check in after this time.",
        .opens_at.format("%Y-%m-%d"),
        .opens_at.format("%-I:%M %p")
    )]
    TooEarly { opens_at: DateTime<FixedOffset> },

    #[error("Your booking period has ended. If you need assistance, please contact support.")]
    TooLate { closes_at: DateTime<Utc> },

    #[error("Authorization token required")]
    Unauthenticated,

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Booking reference mismatch")]
    ReferenceMismatch,

    #[error("Invalid booking reference format")]
    InvalidReferenceFormat,

    #[error("Booking not found")]
    BookingNotFound,

    #[error("Accommodation is required")]
    MissingAccommodation,

    #[error("Invalid accommodation format. Could not extract unit number.")]
    InvalidAccommodationFormat,

    #[error("Unit not found")]
    UnitNotFound,

    /// Field-level validation failure with its own stable code.
    #[error("{message}")]
    Validation { code: &'static str, message: String },

    #[error("Invalid request payload: {0}")]
    InvalidPayload(String),

    #[error(transparent)]
    Webhook(#[from] UnitLockError),

    #[error("Token signing failed")]
    Token(#[from] TokenError),

    #[error("An error occurred while processing the request. Please try again.")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn validation(code: &'static str, message: impl Into<String>) -> Self {
        Self::Validation { code, message: message.into() }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::MissingReference
            | Self::InvalidReferenceFormat
            | Self::MissingAccommodation
            | Self::InvalidAccommodationFormat
            | Self::Validation { .. }
            | Self::InvalidPayload(_) => StatusCode::BAD_REQUEST,
            Self::InvalidReference | Self::BookingNotFound | Self::UnitNotFound => StatusCode::NOT_FOUND,
            Self::TooEarly { .. } | Self::TooLate { .. } | Self::ReferenceMismatch => StatusCode::FORBIDDEN,
            Self::Unauthenticated | Self::InvalidToken => StatusCode::UNAUTHORIZED,
            Self::Webhook(err) => err.status(),
            Self::Token(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingReference => "MISSING_REFERENCE",
            Self::InvalidReference => "INVALID_REFERENCE",
            Self::TooEarly { .. } => "TOO_EARLY",
            Self::TooLate { .. } => "TOO_LATE",
            Self::Unauthenticated => "UNAUTHORIZED",
            Self::InvalidToken => "INVALID_TOKEN",
            Self::ReferenceMismatch => "REFERENCE_MISMATCH",
            Self::InvalidReferenceFormat => "INVALID_REFERENCE_FORMAT",
            Self::BookingNotFound => "BOOKING_NOT_FOUND",
            Self::MissingAccommodation => "MISSING_ACCOMMODATION",
            Self::InvalidAccommodationFormat => "INVALID_ACCOMMODATION_FORMAT",
            Self::UnitNotFound => "UNIT_NOT_FOUND",
            Self::Validation { code, .. } => *code,
            Self::InvalidPayload(_) => "INVALID_PAYLOAD",
            Self::Webhook(err) => err.code(),
            Self::Token(_) | Self::Internal(_) => "SERVER_ERROR",
        }
    }

    fn extra_fields(&self) -> Map<String, Value> {
        let mut extra = Map::new();
        match self {
            Self::TooEarly { opens_at } => {
                let opens_at = opens_at.with_timezone(&Utc);
                extra.insert("arrivalTime".into(), json!(opens_at.to_rfc3339_opts(SecondsFormat::Millis, true)));
            }
            Self::TooLate { closes_at } => {
                extra.insert("departureTime".into(), json!(closes_at.to_rfc3339_opts(SecondsFormat::Millis, true)));
            }
            Self::Webhook(err) => {
                if let Some(details) = err.details() {
                    extra.insert("details".into(), json!(details));
                }
            }
            _ => {}
        }
        extra
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::InvalidPayload(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::InvalidPayload(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            Self::Internal(err) => tracing::error!(error = ?err, "internal error"),
            Self::Token(err) => tracing::error!(error = %err, "token error"),
            _ => tracing::debug!(code = self.code(), %status, "request rejected"),
        }

        let mut body = Map::new();
        body.insert("error".into(), json!(self.to_string()));
        body.insert("code".into(), json!(self.code()));
        body.extend(self.extra_fields());

        (status, Json(Value::Object(body))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    async fn body_of(err: ApiError) -> (StatusCode, Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn too_early_echoes_opening_instant() {
        let opens_at = Utc.with_ymd_and_hms(2024, 12, 22, 15, 45, 0).unwrap().fixed_offset();
        let (status, body) = body_of(ApiError::TooEarly { opens_at }).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["code"], "TOO_EARLY");
        assert_eq!(body["arrivalTime"], "2024-12-22T15:45:00.000Z");
        assert!(body["error"].as_str().unwrap().contains("2024-12-22"));
    }

    #[tokio::test]
    async fn too_early_message_uses_property_local_date() {
        let property = FixedOffset::west_opt(10 * 3600).unwrap();
        let opens_at = property.with_ymd_and_hms(2024, 12, 22, 15, 45, 0).unwrap();
        let (_, body) = body_of(ApiError::TooEarly { opens_at }).await;

        assert_eq!(body["arrivalTime"], "2024-12-23T01:45:00.000Z");
        let message = body["error"].as_str().unwrap();
        assert!(message.contains("2024-12-22 at 3:45 PM"), "{message}");
    }

    #[tokio::test]
    async fn internal_errors_hide_details() {
        let (status, body) = body_of(ApiError::Internal(anyhow::anyhow!("connection refused"))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["code"], "SERVER_ERROR");
        assert!(!body["error"].as_str().unwrap().contains("refused"));
    }

    #[test]
    fn validation_errors_keep_their_code() {
        let err = ApiError::validation("MISSING_ARRIVAL", "Arrival date is required");
        assert_eq!(err.code(), "MISSING_ARRIVAL");
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }
}
