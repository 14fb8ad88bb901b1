//! Booking ingest for the n8n booking-channel workflow

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode},
};
use serde::Serialize;
use serde_json::Value;

use crate::database::models::Booking;
use crate::error::ApiError;
use crate::server::AppState;
use crate::services::booking_ingest::parse_booking_payload;

#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub success: bool,
    pub message: &'static str,
    pub data: Booking,
}

/// `POST /bookings/create-from-n8n`
///
/// Requires the configured ingest key in `x-api-key`. Answers 201 for a new
/// booking and 200 when an existing reference was updated.
pub async fn create_from_n8n(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<(StatusCode, Json<IngestResponse>), ApiError> {
    let presented = headers.get("x-api-key").and_then(|v| v.to_str().ok());
    match (state.ingest_api_key.as_deref(), presented) {
        (Some(expected), Some(presented)) if expected == presented => {}
        _ => {
            tracing::warn!("booking ingest rejected: missing or wrong x-api-key");
            return Err(ApiError::Unauthenticated);
        }
    }

    let Json(body) = payload?;
    let booking = parse_booking_payload(&body)?;
    let upsert = state.store.upsert_booking(booking).await?;

    tracing::info!(
        reference = upsert.booking.reference,
        created = upsert.created,
        "booking ingested"
    );

    let (status, message) = if upsert.created {
        (StatusCode::CREATED, "Booking created successfully")
    } else {
        (StatusCode::OK, "Booking updated successfully")
    };
    Ok((status, Json(IngestResponse { success: true, message, data: upsert.booking })))
}
