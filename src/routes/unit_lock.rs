//! Door codes for the guest's unit, fetched from the automation webhook

use axum::{
    Extension, Json,
    body::Bytes,
    extract::{Query, State, rejection::QueryRejection},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::auth::{guard, models::BookingSession};
use crate::error::ApiError;
use crate::server::AppState;
use crate::services::unit_lock::{UnitLockData, extract_unit_code};

#[derive(Debug, Default, Deserialize)]
pub struct UnitLockBody {
    #[serde(default)]
    pub reference: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct UnitLockQuery {
    pub reference: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UnitLockEnvelope {
    pub data: UnitLockData,
}

/// `POST /unit-lock`; the body and its `reference` are both optional
pub async fn unit_lock_post(
    State(state): State<AppState>,
    Extension(session): Extension<BookingSession>,
    body: Bytes,
) -> Result<Json<UnitLockEnvelope>, ApiError> {
    let body = parse_body(&body)?;
    unlock(&state, &session, body.reference).await
}

/// `GET /unit-lock?reference=`
pub async fn unit_lock_get(
    State(state): State<AppState>,
    Extension(session): Extension<BookingSession>,
    query: Result<Query<UnitLockQuery>, QueryRejection>,
) -> Result<Json<UnitLockEnvelope>, ApiError> {
    let Query(query) = query?;
    unlock(&state, &session, query.reference.map(Value::String)).await
}

async fn unlock(
    state: &AppState,
    session: &BookingSession,
    supplied: Option<Value>,
) -> Result<Json<UnitLockEnvelope>, ApiError> {
    let reference = resolve_reference(session, supplied)?;

    let booking = state
        .store
        .find_booking_by_reference(reference)
        .await?
        .ok_or_else(|| {
            tracing::warn!(reference, "unit lock requested for missing booking");
            ApiError::BookingNotFound
        })?;

    if booking.accommodation.trim().is_empty() {
        return Err(ApiError::MissingAccommodation);
    }
    let unit_code = extract_unit_code(&booking.accommodation)?;

    let data = state.unit_lock.fetch(reference, &unit_code, state.clock.now()).await?;
    Ok(Json(UnitLockEnvelope { data }))
}

fn parse_body(raw: &[u8]) -> Result<UnitLockBody, ApiError> {
    if raw.iter().all(u8::is_ascii_whitespace) {
        return Ok(UnitLockBody::default());
    }
    serde_json::from_slice(raw).map_err(|e| ApiError::InvalidPayload(e.to_string()))
}

/// A supplied reference must be numeric before it is compared with the token's
fn resolve_reference(session: &BookingSession, mut supplied: Option<Value>) -> Result<i64, ApiError> {
    if let Some(requested) = supplied.as_ref().and_then(guard::normalize_reference) {
        if requested.parse::<i64>().is_err() {
            return Err(ApiError::InvalidReferenceFormat);
        }
    }
    guard::enforce(session, &mut supplied)
}
