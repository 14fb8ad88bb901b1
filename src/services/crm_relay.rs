//! CRM relay.
//!
//! Forwards a stored guest request to the Arqaam CRM once, then writes the
//! outcome back onto the request. Nothing here can fail the guest's call: the
//! relay runs detached and every error ends up in the log and on the record.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;
use serde::Serialize;
use serde_json::{Value, json};
use url::Url;

use crate::database::models::{RequestType, ServiceRequest};
use crate::database::store::BookingStore;
use crate::services::stay_window::StayPolicy;

// Vocabulary expected by the CRM.
const TYPE_EXTENSION: &str = "طلب تمديد";
const TYPE_CLEANING: &str = "نظافة";
const TYPE_MAINTENANCE: &str = "صيانة";

const CATEGORY_GUEST_REQUESTS: &str = "طلبات النزلاء";
const CATEGORY_STUDIO_CLEANING: &str = "تنظيف ستوديو";
const CATEGORY_ONE_BEDROOM_CLEANING: &str = "تنظيف شقة 1 غرفة";
const CATEGORY_TWO_BEDROOM_CLEANING: &str = "تنظيف شقة 2 غرفة";
const CATEGORY_THREE_BEDROOM_CLEANING: &str = "تنظيف شقة 3 غرف";
const CATEGORY_MAINTENANCE: &str = "صيانة";

/// Stand-in the CRM expects when a date is not applicable
const DATE_SENTINEL: &str = "null";

/// Body posted to the CRM
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CrmPayload {
    pub key: String,
    pub name: String,
    pub phone: String,
    pub requesttype: String,
    pub requestcategory: String,
    pub roomnumber: String,
    pub datechekout: String,
    pub datechekin: String,
    pub note: String,
}

pub fn crm_request_type(request_type: Option<RequestType>) -> &'static str {
    match request_type {
        Some(RequestType::Extension) => TYPE_EXTENSION,
        Some(RequestType::Cleaning) => TYPE_CLEANING,
        Some(RequestType::Maintenance) | None => TYPE_MAINTENANCE,
    }
}

/// Reads a request type given either by name or in the CRM's own vocabulary
pub fn request_type_from_crm(value: &str) -> Option<RequestType> {
    match value.trim() {
        TYPE_EXTENSION => Some(RequestType::Extension),
        TYPE_CLEANING => Some(RequestType::Cleaning),
        TYPE_MAINTENANCE => Some(RequestType::Maintenance),
        other => RequestType::parse(other),
    }
}

/// Category for a request that did not name one.
///
/// Cleaning requests are sized from bedroom hints in the note, in either
/// language; everything else falls back to the default of its type.
pub fn infer_category(request_type: Option<RequestType>, note: &str) -> &'static str {
    match request_type {
        Some(RequestType::Extension) => CATEGORY_GUEST_REQUESTS,
        Some(RequestType::Cleaning) => {
            let note = note.to_lowercase();
            let hints: [(&[&str], &'static str); 4] = [
                (&["ستوديو", "studio"], CATEGORY_STUDIO_CLEANING),
                (&["1 غرفة", "1 bedroom"], CATEGORY_ONE_BEDROOM_CLEANING),
                (&["2 غرفة", "2 bedroom"], CATEGORY_TWO_BEDROOM_CLEANING),
                (&["3 غرف", "3 bedroom"], CATEGORY_THREE_BEDROOM_CLEANING),
            ];
            hints
                .iter()
                .find(|(needles, _)| needles.iter().any(|n| note.contains(n)))
                .map(|(_, category)| *category)
                .unwrap_or(CATEGORY_STUDIO_CLEANING)
        }
        Some(RequestType::Maintenance) | None => CATEGORY_MAINTENANCE,
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

pub struct CrmRelay {
    client: Client,
    api_url: Url,
    api_key: String,
    policy: StayPolicy,
}

impl CrmRelay {
    pub fn new(api_url: Url, api_key: String, timeout: Duration, policy: StayPolicy) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create CRM HTTP client")?;

        Ok(Self { client, api_url, api_key, policy })
    }

    /// Shape a stored request into the CRM's format
    pub fn build_payload(&self, request: &ServiceRequest) -> CrmPayload {
        let requesttype = crm_request_type(request.request_type);
        let note = non_blank(&request.note).unwrap_or_default().to_string();
        let requestcategory = non_blank(&request.category)
            .map(str::to_string)
            .unwrap_or_else(|| infer_category(request.request_type, &note).to_string());

        let mut datechekin = non_blank(&request.check_in).unwrap_or(DATE_SENTINEL).to_string();
        let mut datechekout = non_blank(&request.check_out).unwrap_or(DATE_SENTINEL).to_string();

        // Extensions must carry a time of day
        if request.request_type == Some(RequestType::Extension) {
            if datechekin != DATE_SENTINEL && !datechekin.contains(' ') {
                datechekin = format!("{datechekin} {}", self.policy.check_in.format("%H:%M:%S"));
            }
            if datechekout != DATE_SENTINEL && !datechekout.contains(' ') {
                datechekout = format!("{datechekout} {}", self.policy.check_out.format("%H:%M:%S"));
            }
        }

        CrmPayload {
            key: self.api_key.clone(),
            name: non_blank(&request.guest_name).unwrap_or("Guest").to_string(),
            phone: non_blank(&request.phone).unwrap_or_default().to_string(),
            requesttype: requesttype.to_string(),
            requestcategory,
            roomnumber: non_blank(&request.room_number).unwrap_or_default().to_string(),
            datechekout,
            datechekin,
            note,
        }
    }

    /// Send the request to the CRM and record the outcome. Never fails.
    pub async fn forward(&self, store: &dyn BookingStore, request: &ServiceRequest) {
        let payload = self.build_payload(request);
        tracing::info!(
            request_id = %request.id,
            reference = request.reference,
            requesttype = %payload.requesttype,
            requestcategory = %payload.requestcategory,
            "forwarding request to CRM"
        );

        let (sent, response) = match self.send(&payload).await {
            Ok((status, body)) => {
                if status.is_success() {
                    tracing::info!(request_id = %request.id, %status, "CRM accepted request");
                } else {
                    tracing::warn!(request_id = %request.id, %status, "CRM answered with an error status");
                }
                (status.is_success(), body)
            }
            Err(e) => {
                tracing::error!(request_id = %request.id, error = %e, "CRM relay failed");
                (false, json!({ "error": e.to_string() }))
            }
        };

        if let Err(e) = store.record_crm_outcome(request.id, sent, response).await {
            tracing::error!(request_id = %request.id, error = %e, "failed to record CRM outcome");
        }
    }

    /// Run [`forward`](Self::forward) in the background
    pub fn spawn_forward(self: Arc<Self>, store: Arc<dyn BookingStore>, request: ServiceRequest) {
        tokio::spawn(async move {
            self.forward(store.as_ref(), &request).await;
        });
    }

    async fn send(&self, payload: &CrmPayload) -> Result<(reqwest::StatusCode, Value)> {
        let response = self
            .client
            .post(self.api_url.clone())
            .json(payload)
            .send()
            .await
            .context("CRM request failed")?;

        let status = response.status();
        let is_json = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.contains("application/json"));

        let text = response.text().await.context("Failed to read CRM response")?;
        let body = if is_json {
            serde_json::from_str(&text).unwrap_or_else(|_| json!({ "status": status.as_u16(), "text": text }))
        } else {
            json!({ "status": status.as_u16(), "text": text })
        };
        Ok((status, body))
    }
}
