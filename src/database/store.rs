//! Booking store port.
//!
//! Handlers and services only see this trait; Postgres and the in-memory
//! store are interchangeable behind it.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use crate::database::models::{
    Booking, BookingUpsert, Guest, GuestSignIn, NewServiceRequest, ServiceRequest, Unit,
};

#[async_trait]
pub trait BookingStore: Send + Sync {
    async fn find_booking_by_reference(&self, reference: i64) -> Result<Option<Booking>>;

    /// Insert a booking or replace the one with the same reference.
    async fn upsert_booking(&self, booking: Booking) -> Result<BookingUpsert>;

    /// Record a sign-in: creates the guest on first use, otherwise bumps
    /// `sign_in_count` by one and replaces the token mirror.
    async fn upsert_guest(&self, sign_in: GuestSignIn) -> Result<Guest>;

    #[cfg(test)]
    async fn find_guest(&self, reference: i64) -> Result<Option<Guest>>;

    async fn create_request(&self, request: NewServiceRequest) -> Result<ServiceRequest>;

    #[cfg(test)]
    async fn find_request(&self, id: Uuid) -> Result<Option<ServiceRequest>>;

    /// Annotate a request with the CRM relay outcome.
    async fn record_crm_outcome(&self, id: Uuid, sent: bool, response: Value) -> Result<()>;

    async fn find_unit_by_reference(&self, reference: &str) -> Result<Option<Unit>>;

    async fn health_check(&self) -> Result<()>;
}
