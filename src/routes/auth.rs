//! Guest authentication by booking reference

use axum::{Json, extract::{State, rejection::JsonRejection}};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};

use crate::auth::models::{AuthenticateRequest, AuthenticateResponse, BookingSummary};
use crate::error::ApiError;
use crate::server::AppState;
use crate::services::authentication::AuthenticationGate;

/// `POST /auth/authenticate` and `POST /bookings/authenticate`
///
/// Issues a guest token for a booking whose stay window contains the current
/// instant. The token is returned in the body and also set as the
/// `access_token` cookie.
pub async fn authenticate(
    State(state): State<AppState>,
    jar: CookieJar,
    payload: Result<Json<AuthenticateRequest>, JsonRejection>,
) -> Result<(CookieJar, Json<AuthenticateResponse>), ApiError> {
    let Json(payload) = payload?;

    let gate = AuthenticationGate {
        store: state.store.as_ref(),
        tokens: state.jwt.as_ref(),
        clock: state.clock.as_ref(),
        policy: state.policy,
    };
    let success = gate.authenticate(payload.booking_reference.as_ref()).await?;

    let cookie = Cookie::build(("access_token", success.issued.token.clone()))
        .http_only(true)
        .secure(true)
        .same_site(SameSite::None)
        .path("/")
        .max_age(time::Duration::seconds(success.issued.expires_in))
        .build();

    let booking = BookingSummary {
        reference: success.booking.reference,
        arrival: success.booking.arrival,
        departure: success.booking.departure,
        accommodation: success.booking.accommodation,
    };

    Ok((
        jar.add(cookie),
        Json(AuthenticateResponse::new(
            success.issued.token,
            success.issued.expires_in,
            booking,
            success.window.closes_at,
        )),
    ))
}
