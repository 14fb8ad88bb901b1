//! Reference guard
//!
//! A guest may only act on the booking their token is bound to. Any reference
//! supplied in a request must match the token's; a missing one is filled in
//! from the token.

use serde_json::Value;

use crate::auth::models::BookingSession;
use crate::error::ApiError;

/// Textual form used for comparison. Null and blank strings count as absent.
pub fn normalize_reference(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Number(n) => Some(match n.as_f64() {
            Some(f) if n.is_f64() && f.fract() == 0.0 && f.abs() < i64::MAX as f64 => (f as i64).to_string(),
            _ => n.to_string(),
        }),
        other => Some(other.to_string()),
    }
}

/// Enforce the guard on a payload's reference slot.
///
/// Returns the effective reference, and back-fills `supplied` with the token's
/// reference when the caller left it out.
pub fn enforce(session: &BookingSession, supplied: &mut Option<Value>) -> Result<i64, ApiError> {
    let token_reference = session.reference.to_string();

    match supplied.as_ref().and_then(normalize_reference) {
        Some(requested) if requested != token_reference => {
            tracing::warn!(
                token_reference = session.reference,
                requested = %requested,
                "booking reference mismatch"
            );
            Err(ApiError::ReferenceMismatch)
        }
        Some(_) => Ok(session.reference),
        None => {
            *supplied = Some(Value::from(session.reference));
            Ok(session.reference)
        }
    }
}
