//! JWT Token Service
//!
//! Issues and validates the booking-bound guest token, and signs the short-lived
//! service token used to call the unit-lock automation webhook. The two use
//! different secrets and audiences so neither can stand in for the other.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

const ISSUER: &str = "guest-access-server";
const GUEST_AUDIENCE: &str = "guest-access";
const WEBHOOK_AUDIENCE: &str = "unit-lock-webhook";

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("signing secret is not configured")]
    MisconfiguredSecret,

    #[error("failed to encode token: {0}")]
    Encode(#[source] jsonwebtoken::errors::Error),

    #[error("token rejected: {0}")]
    Invalid(#[source] jsonwebtoken::errors::Error),
}

/// Claims carried by a guest token
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BookingClaims {
    pub booking_reference: i64,
    pub arrival_date: NaiveDate,
    pub departure_date: NaiveDate,
    pub accommodation: String,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
    pub aud: String,
}

/// Booking fields bound into a guest token
#[derive(Debug, Clone)]
pub struct BookingGrant<'a> {
    pub reference: i64,
    pub arrival: NaiveDate,
    pub departure: NaiveDate,
    pub accommodation: &'a str,
}

/// A freshly signed guest token
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    /// Seconds from issuance to expiry, floored
    pub expires_in: i64,
    pub expires_at: DateTime<Utc>,
}

/// JWT service for guest tokens
#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtService {
    /// Create a new JWT service with the provided secret
    pub fn new(secret: &str) -> Result<Self, TokenError> {
        if secret.trim().is_empty() {
            return Err(TokenError::MisconfiguredSecret);
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[ISSUER]);
        validation.set_audience(&[GUEST_AUDIENCE]);
        validation.leeway = 0;

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        })
    }

    /// Sign a guest token that lives for `ttl_seconds` from `now`.
    ///
    /// The lifetime is fixed here; verification only consults the embedded `exp`.
    pub fn issue(
        &self,
        grant: &BookingGrant<'_>,
        now: DateTime<Utc>,
        ttl_seconds: i64,
    ) -> Result<IssuedToken, TokenError> {
        let iat = now.timestamp();
        let exp = iat + ttl_seconds;

        let claims = BookingClaims {
            booking_reference: grant.reference,
            arrival_date: grant.arrival,
            departure_date: grant.departure,
            accommodation: grant.accommodation.to_string(),
            iat,
            exp,
            iss: ISSUER.to_string(),
            aud: GUEST_AUDIENCE.to_string(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(TokenError::Encode)?;

        Ok(IssuedToken {
            token,
            expires_in: ttl_seconds,
            expires_at: now + Duration::seconds(ttl_seconds),
        })
    }

    /// Validate signature, issuer, audience and expiry, returning the claims
    pub fn validate_token(&self, token: &str) -> Result<BookingClaims, TokenError> {
        decode::<BookingClaims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(TokenError::Invalid)
    }

    /// Decode without checking expiry, for asserting on historical tokens
    #[cfg(test)]
    pub fn peek_claims(&self, token: &str) -> Result<BookingClaims, TokenError> {
        let mut validation = self.validation.clone();
        validation.validate_exp = false;
        decode::<BookingClaims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(TokenError::Invalid)
    }
}

/// Claims presented to the unit-lock webhook
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookClaims {
    pub booking_reference: String,
    pub iat: i64,
    pub exp: i64,
    pub aud: String,
}

/// Signs one-hour service tokens for the automation webhook
#[derive(Clone)]
pub struct WebhookTokenSigner {
    encoding_key: EncodingKey,
    ttl: Duration,
}

impl WebhookTokenSigner {
    pub fn new(secret: &str) -> Result<Self, TokenError> {
        if secret.trim().is_empty() {
            return Err(TokenError::MisconfiguredSecret);
        }
        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            ttl: Duration::hours(1),
        })
    }

    pub fn sign(&self, reference: i64, now: DateTime<Utc>) -> Result<String, TokenError> {
        let claims = WebhookClaims {
            booking_reference: reference.to_string(),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
            aud: WEBHOOK_AUDIENCE.to_string(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key).map_err(TokenError::Encode)
    }
}
