//! Authentication gate.
//!
//! Turns a booking reference into a guest token, provided the current instant
//! falls inside the booking's stay window, and records the sign-in.

use anyhow::anyhow;
use serde_json::Value;

use crate::auth::jwt::{BookingGrant, IssuedToken, JwtService};
use crate::database::models::{Booking, GuestSignIn};
use crate::database::store::BookingStore;
use crate::error::ApiError;
use crate::services::clock::Clock;
use crate::services::stay_window::{StayPolicy, StayWindow, WindowPosition};

/// Everything the caller needs to answer a successful sign-in
#[derive(Debug)]
pub struct AuthSuccess {
    pub issued: IssuedToken,
    pub booking: Booking,
    pub window: StayWindow,
}

pub struct AuthenticationGate<'a> {
    pub store: &'a dyn BookingStore,
    pub tokens: &'a JwtService,
    pub clock: &'a dyn Clock,
    pub policy: StayPolicy,
}

impl AuthenticationGate<'_> {
    pub async fn authenticate(&self, reference: Option<&Value>) -> Result<AuthSuccess, ApiError> {
        let reference = parse_reference(reference)?;

        let booking = self
            .store
            .find_booking_by_reference(reference)
            .await?
            .ok_or_else(|| {
                tracing::info!(reference, "authentication for unknown booking reference");
                ApiError::InvalidReference
            })?;

        let window = self
            .policy
            .window(booking.arrival, booking.departure)
            .map_err(|e| ApiError::Internal(anyhow!("booking {reference} has unusable dates: {e}")))?;

        let now = self.clock.now();
        match window.position(now) {
            WindowPosition::TooEarly => {
                tracing::info!(reference, opens_at = %window.opens_at, "authentication before check-in");
                return Err(ApiError::TooEarly {
                    opens_at: window.opens_at.with_timezone(&self.policy.utc_offset),
                });
            }
            WindowPosition::TooLate => {
                tracing::info!(reference, closes_at = %window.closes_at, "authentication after check-out");
                return Err(ApiError::TooLate { closes_at: window.closes_at });
            }
            WindowPosition::Open => {}
        }

        let grant = BookingGrant {
            reference: booking.reference,
            arrival: booking.arrival,
            departure: booking.departure,
            accommodation: &booking.accommodation,
        };
        let issued = self.tokens.issue(&grant, now, window.remaining_seconds(now))?;

        let guest = self
            .store
            .upsert_guest(GuestSignIn {
                reference,
                token: issued.token.clone(),
                token_expires_at: window.closes_at,
                signed_in_at: now,
            })
            .await?;

        tracing::info!(
            reference,
            sign_in_count = guest.sign_in_count,
            valid_until = %window.closes_at,
            "guest signed in"
        );

        Ok(AuthSuccess { issued, booking, window })
    }
}

/// Accepts a reference as a JSON number or a numeric string.
///
/// Anything that cannot name a booking is reported as an unknown reference.
pub fn parse_reference(value: Option<&Value>) -> Result<i64, ApiError> {
    match value {
        None | Some(Value::Null) => Err(ApiError::MissingReference),
        Some(Value::String(s)) if s.trim().is_empty() => Err(ApiError::MissingReference),
        Some(Value::String(s)) => s.trim().parse().map_err(|_| ApiError::InvalidReference),
        Some(Value::Number(n)) => n.as_i64().ok_or(ApiError::InvalidReference),
        Some(_) => Err(ApiError::InvalidReference),
    }
}
