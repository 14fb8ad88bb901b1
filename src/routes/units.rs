//! Unit records looked up by the code embedded in an accommodation label

use axum::{
    Extension, Json,
    extract::{Query, State, rejection::QueryRejection},
};
use serde::{Deserialize, Serialize};

use crate::auth::models::BookingSession;
use crate::database::models::Unit;
use crate::error::ApiError;
use crate::server::AppState;
use crate::services::unit_lock::extract_unit_code;

#[derive(Debug, Deserialize)]
pub struct AccommodationQuery {
    pub accommodation: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UnitEnvelope {
    pub data: Unit,
}

/// `GET /units/by-accommodation?accommodation=`
///
/// Falls back to the accommodation bound into the guest token.
pub async fn by_accommodation(
    State(state): State<AppState>,
    Extension(session): Extension<BookingSession>,
    query: Result<Query<AccommodationQuery>, QueryRejection>,
) -> Result<Json<UnitEnvelope>, ApiError> {
    let Query(query) = query?;
    let accommodation = query
        .accommodation
        .filter(|a| !a.trim().is_empty())
        .unwrap_or(session.accommodation);
    if accommodation.trim().is_empty() {
        return Err(ApiError::MissingAccommodation);
    }

    let unit_code = extract_unit_code(&accommodation)?;
    let unit = state
        .store
        .find_unit_by_reference(&unit_code)
        .await?
        .ok_or_else(|| {
            tracing::info!(unit_code = %unit_code, "no unit record for code");
            ApiError::UnitNotFound
        })?;

    Ok(Json(UnitEnvelope { data: unit }))
}
