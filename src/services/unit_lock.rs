//! Unit-lock relay.
//!
//! Resolves a booking's unit code, asks the n8n automation webhook for the
//! unit's door codes and folds whatever row shape comes back into a fixed
//! four-field result. Single attempt, bounded by a timeout.

use std::time::Duration;

use anyhow::Context;
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde::Serialize;
use serde_json::{Map, Value};
use url::Url;

use crate::auth::jwt::WebhookTokenSigner;
use crate::error::ApiError;

static UNIT_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)R(\d+)").expect("unit code pattern is valid"));

/// Pull the unit code out of an accommodation label, e.g. "Alaredh R234" -> "R234"
pub fn extract_unit_code(accommodation: &str) -> Result<String, ApiError> {
    UNIT_CODE
        .captures(accommodation)
        .and_then(|caps| caps.get(1))
        .map(|digits| format!("R{}", digits.as_str()))
        .ok_or(ApiError::InvalidAccommodationFormat)
}

#[derive(Debug, thiserror::Error)]
pub enum UnitLockError {
    #[error("n8n webhook is not registered or the workflow is not active (status {status})")]
    NotRegistered { status: u16, hint: Option<String> },

    #[error("Webhook request timeout")]
    Timeout,

    #[error("Could not reach the unit-lock webhook: {0}")]
    Connection(String),

    #[error("Webhook returned status {status}")]
    Upstream { status: u16, body: String },
}

impl UnitLockError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotRegistered { .. } => "WEBHOOK_NOT_REGISTERED",
            Self::Timeout => "WEBHOOK_TIMEOUT",
            Self::Connection(_) => "WEBHOOK_CONNECTION_ERROR",
            Self::Upstream { .. } => "WEBHOOK_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Timeout => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::BAD_GATEWAY,
        }
    }

    pub fn details(&self) -> Option<String> {
        match self {
            Self::NotRegistered { hint, .. } => hint.clone(),
            Self::Upstream { body, .. } if !body.is_empty() => Some(format!("n8n response: {body}")),
            _ => None,
        }
    }
}

/// Door codes for a unit, as returned to the guest
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitLockData {
    pub unit: Option<String>,
    pub development: Option<String>,
    pub building_password: Option<String>,
    pub apartment_password: Option<String>,
}

/// Response shapes the webhook is known to produce
#[derive(Debug, Clone, PartialEq)]
pub enum WebhookResponse {
    /// `[ {row}, ... ]`
    Rows(Vec<Value>),
    /// `{ "row_number": n, ...columns }`
    NumberedRow(Map<String, Value>),
    /// `{ "data": [ {row}, ... ] }`
    Wrapped(Vec<Value>),
    /// `{ ...columns }`
    Flat(Map<String, Value>),
    Unrecognized(Value),
}

impl WebhookResponse {
    pub fn classify(value: Value) -> Self {
        match value {
            Value::Array(rows) if !rows.is_empty() => Self::Rows(rows),
            Value::Object(map) if map.contains_key("row_number") || map.contains_key("rowNumber") => {
                Self::NumberedRow(map)
            }
            Value::Object(mut map) if matches!(map.get("data"), Some(Value::Array(rows)) if !rows.is_empty()) => {
                match map.remove("data") {
                    Some(Value::Array(rows)) => Self::Wrapped(rows),
                    _ => Self::Unrecognized(Value::Object(map)),
                }
            }
            Value::Object(map) => Self::Flat(map),
            other => Self::Unrecognized(other),
        }
    }

    /// Columns: col_2 unit code, col_4 development, col_5 sub-unit,
    /// col_6 building password, col_7 apartment password.
    pub fn normalize(self) -> UnitLockData {
        let row = match self {
            Self::Rows(mut rows) | Self::Wrapped(mut rows) => match rows.swap_remove(0) {
                Value::Object(map) => map,
                _ => return UnitLockData::default(),
            },
            Self::NumberedRow(map) | Self::Flat(map) => map,
            Self::Unrecognized(_) => return UnitLockData::default(),
        };

        let column = |key: &str| match row.get(key) {
            Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };

        let unit = match (column("col_2"), column("col_5")) {
            (Some(unit), Some(sub_unit)) => Some(format!("{unit}/{sub_unit}")),
            (unit, sub_unit) => sub_unit.or(unit),
        };

        UnitLockData {
            unit,
            development: column("col_4"),
            building_password: column("col_6"),
            apartment_password: column("col_7"),
        }
    }
}

pub struct UnitLockRelay {
    client: Client,
    webhook_url: Url,
    signer: WebhookTokenSigner,
}

impl UnitLockRelay {
    pub fn new(webhook_url: Url, signer: WebhookTokenSigner, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create webhook HTTP client")?;

        Ok(Self { client, webhook_url, signer })
    }

    pub async fn fetch(&self, reference: i64, unit_code: &str, now: DateTime<Utc>) -> Result<UnitLockData, ApiError> {
        let token = self.signer.sign(reference, now)?;

        tracing::info!(reference, unit_code, url = %self.webhook_url, "calling unit-lock webhook");
        let response = self
            .client
            .post(self.webhook_url.clone())
            .bearer_auth(token)
            .form(&[("col_2", unit_code)])
            .send()
            .await
            .map_err(|e| {
                tracing::error!(reference, error = %e, "unit-lock webhook call failed");
                if e.is_timeout() {
                    UnitLockError::Timeout
                } else {
                    UnitLockError::Connection(e.to_string())
                }
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                UnitLockError::Timeout
            } else {
                UnitLockError::Connection(e.to_string())
            }
        })?;

        if !status.is_success() {
            let err = self.classify_failure(status.as_u16(), body);
            tracing::error!(reference, status = status.as_u16(), code = err.code(), "unit-lock webhook rejected call");
            return Err(err.into());
        }

        let parsed = serde_json::from_str::<Value>(&body).unwrap_or(Value::String(body));
        let shape = WebhookResponse::classify(parsed);
        if let WebhookResponse::Unrecognized(raw) = &shape {
            tracing::warn!(reference, response = %raw, "unexpected unit-lock webhook response");
        }
        Ok(shape.normalize())
    }

    fn classify_failure(&self, status: u16, body: String) -> UnitLockError {
        if status == 404 && (body.contains("not registered") || body.contains("webhook")) {
            let path = self.webhook_url.path();
            let hint = (path.contains("/webhook/") && !path.contains("/webhook-test/")).then(|| {
                format!(
                    "Check that the n8n workflow is active. Test webhooks live under '/webhook-test/', \
                     the configured path is '{path}'."
                )
            });
            UnitLockError::NotRegistered { status, hint }
        } else {
            UnitLockError::Upstream { status, body }
        }
    }
}
