//! Authentication Middleware
//!
//! Axum middleware that verifies the guest bearer token once and hands the
//! decoded [`BookingSession`] to the protected handlers.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;

use crate::auth::{jwt::JwtService, models::BookingSession};
use crate::error::ApiError;

/// Authentication middleware that validates guest tokens and injects the session
pub struct AuthMiddleware;

impl AuthMiddleware {
    /// Middleware function for validating guest tokens
    pub async fn validate_token(
        State(jwt_service): State<Arc<JwtService>>,
        jar: CookieJar,
        mut req: Request,
        next: Next,
    ) -> Result<Response, ApiError> {
        let token = bearer_token(&req)
            .or_else(|| jar.get("access_token").map(|c| c.value().to_string()))
            .ok_or_else(|| {
                tracing::warn!(uri = %req.uri(), "missing Authorization header and access_token cookie");
                ApiError::Unauthenticated
            })?;

        let claims = jwt_service.validate_token(&token).map_err(|e| {
            tracing::warn!(uri = %req.uri(), error = %e, "guest token rejected");
            ApiError::InvalidToken
        })?;

        let session = BookingSession::from(claims);
        tracing::debug!(reference = session.reference, expires_at = session.expires_at, "guest session verified");

        req.extensions_mut().insert(session);
        Ok(next.run(req).await)
    }
}

fn bearer_token(req: &Request) -> Option<String> {
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
}
