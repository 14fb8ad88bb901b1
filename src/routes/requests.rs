//! Guest service requests (extension, cleaning, maintenance)

use axum::{Extension, Json, extract::{State, rejection::JsonRejection}, http::StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::auth::{guard, models::BookingSession};
use crate::database::models::{NewServiceRequest, RequestType, ServiceRequest};
use crate::error::ApiError;
use crate::server::AppState;
use crate::services::crm_relay::request_type_from_crm;

#[derive(Debug, Deserialize)]
pub struct CreateRequestBody {
    #[serde(default)]
    pub data: RequestFields,
}

/// Request fields as the guest app sends them
#[derive(Debug, Default, Deserialize)]
pub struct RequestFields {
    #[serde(rename = "Reference_Number", default)]
    pub reference_number: Option<Value>,
    #[serde(rename = "type", default)]
    pub request_type: Option<String>,
    /// CRM request type, used when `type` is absent
    #[serde(default)]
    pub requesttype: Option<String>,
    #[serde(alias = "category", default)]
    pub requestcategory: Option<String>,
    #[serde(default)]
    pub roomnumber: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(alias = "Phone_Number", default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub datechekin: Option<String>,
    #[serde(default)]
    pub datechekout: Option<String>,
    #[serde(alias = "details", default)]
    pub note: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RequestEnvelope {
    pub data: ServiceRequest,
}

/// `POST /requests`
///
/// Stores the request under the token's booking and hands it to the CRM relay
/// in the background. The response does not wait for the CRM.
pub async fn create_request(
    State(state): State<AppState>,
    Extension(session): Extension<BookingSession>,
    payload: Result<Json<CreateRequestBody>, JsonRejection>,
) -> Result<(StatusCode, Json<RequestEnvelope>), ApiError> {
    let Json(CreateRequestBody { data: mut fields }) = payload?;

    let reference = guard::enforce(&session, &mut fields.reference_number)?;

    let request_type = match fields.request_type.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        Some(raw) => Some(RequestType::parse(raw).ok_or_else(|| {
            ApiError::validation(
                "INVALID_REQUEST_TYPE",
                format!("Unknown request type '{raw}'. Expected extension, cleaning or maintenance."),
            )
        })?),
        None => fields.requesttype.as_deref().and_then(request_type_from_crm),
    };

    let room_number = match fields.roomnumber.filter(|r| !r.trim().is_empty()) {
        Some(room) => Some(room),
        None => room_from_booking(&state, reference).await,
    };

    let created = state
        .store
        .create_request(NewServiceRequest {
            reference,
            request_type,
            category: fields.requestcategory,
            room_number,
            guest_name: fields.name,
            phone: fields.phone,
            check_in: fields.datechekin,
            check_out: fields.datechekout,
            note: fields.note,
        })
        .await?;

    tracing::info!(
        request_id = %created.id,
        reference,
        request_type = created.request_type.map(|t| t.as_str()),
        "service request created"
    );

    state.crm.clone().spawn_forward(state.store.clone(), created.clone());

    Ok((StatusCode::CREATED, Json(RequestEnvelope { data: created })))
}

async fn room_from_booking(state: &AppState, reference: i64) -> Option<String> {
    match state.store.find_booking_by_reference(reference).await {
        Ok(booking) => booking.map(|b| b.accommodation).filter(|a| !a.trim().is_empty()),
        Err(e) => {
            tracing::warn!(reference, error = %e, "could not look up booking for room number");
            None
        }
    }
}
