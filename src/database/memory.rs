// In-memory booking store
//
// Backs the test suite and the `STORE_BACKEND=memory` development mode.

use std::collections::HashMap;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use serde_json::Value;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::database::models::{
    Booking, BookingUpsert, Guest, GuestSignIn, NewServiceRequest, ServiceRequest, Unit,
};
use crate::database::store::BookingStore;

#[derive(Debug, Default)]
pub struct InMemoryStore {
    bookings: RwLock<HashMap<i64, Booking>>,
    guests: RwLock<HashMap<i64, Guest>>,
    requests: RwLock<HashMap<Uuid, ServiceRequest>>,
    units: RwLock<HashMap<String, Unit>>,
}

impl InMemoryStore {
    pub fn with_bookings(bookings: impl IntoIterator<Item = Booking>) -> Self {
        Self {
            bookings: RwLock::new(bookings.into_iter().map(|b| (b.reference, b)).collect()),
            ..Self::default()
        }
    }

    pub async fn insert_unit(&self, unit: Unit) {
        self.units.write().await.insert(unit.reference.clone(), unit);
    }

    /// Sample reservations used for local development and demos.
    ///
    /// 544433 and 123456 were current stays, 789012 a future one and 345678 a
    /// past one, relative to December 2024.
    pub async fn seeded() -> Self {
        let date = |y, m, d| NaiveDate::from_ymd_opt(y, m, d).unwrap_or_default();
        let store = Self::with_bookings([
            Booking {
                reference: 544433,
                arrival: date(2024, 12, 20),
                departure: date(2024, 12, 25),
                accommodation: "Apartment 101".into(),
            },
            Booking {
                reference: 123456,
                arrival: date(2024, 12, 18),
                departure: date(2024, 12, 22),
                accommodation: "Studio 205".into(),
            },
            Booking {
                reference: 789012,
                arrival: date(2024, 12, 22),
                departure: date(2024, 12, 28),
                accommodation: "Penthouse 301".into(),
            },
            Booking {
                reference: 345678,
                arrival: date(2024, 12, 10),
                departure: date(2024, 12, 15),
                accommodation: "Suite 150".into(),
            },
        ]);
        store
            .insert_unit(Unit {
                reference: "R217".into(),
                development: Some("Alaredh".into()),
                units: Some("D5".into()),
                number_of_bedrooms: Some(2),
                floor: Some("2".into()),
                neighborhood: Some("Alaredh".into()),
                tourism_license: None,
                parking: Some("Yes".into()),
                location: None,
            })
            .await;
        store
    }
}

#[async_trait]
impl BookingStore for InMemoryStore {
    async fn find_booking_by_reference(&self, reference: i64) -> Result<Option<Booking>> {
        Ok(self.bookings.read().await.get(&reference).cloned())
    }

    async fn upsert_booking(&self, booking: Booking) -> Result<BookingUpsert> {
        let mut bookings = self.bookings.write().await;
        let created = bookings.insert(booking.reference, booking.clone()).is_none();
        Ok(BookingUpsert { booking, created })
    }

    async fn upsert_guest(&self, sign_in: GuestSignIn) -> Result<Guest> {
        let mut guests = self.guests.write().await;
        let guest = guests
            .entry(sign_in.reference)
            .and_modify(|guest| {
                guest.sign_in_count += 1;
                guest.last_sign_in = sign_in.signed_in_at;
                guest.current_token = sign_in.token.clone();
                guest.token_expires_at = sign_in.token_expires_at;
            })
            .or_insert_with(|| Guest {
                reference: sign_in.reference,
                first_sign_up: sign_in.signed_in_at,
                last_sign_in: sign_in.signed_in_at,
                sign_in_count: 1,
                current_token: sign_in.token.clone(),
                token_expires_at: sign_in.token_expires_at,
            });
        Ok(guest.clone())
    }

    #[cfg(test)]
    async fn find_guest(&self, reference: i64) -> Result<Option<Guest>> {
        Ok(self.guests.read().await.get(&reference).cloned())
    }

    async fn create_request(&self, request: NewServiceRequest) -> Result<ServiceRequest> {
        let stored = ServiceRequest::from_new(Uuid::new_v4(), request, Utc::now());
        self.requests.write().await.insert(stored.id, stored.clone());
        Ok(stored)
    }

    #[cfg(test)]
    async fn find_request(&self, id: Uuid) -> Result<Option<ServiceRequest>> {
        Ok(self.requests.read().await.get(&id).cloned())
    }

    async fn record_crm_outcome(&self, id: Uuid, sent: bool, response: Value) -> Result<()> {
        let mut requests = self.requests.write().await;
        let request = requests.get_mut(&id).ok_or_else(|| anyhow!("request {id} not found"))?;
        request.crm_sent = Some(sent);
        request.crm_response = Some(response);
        Ok(())
    }

    async fn find_unit_by_reference(&self, reference: &str) -> Result<Option<Unit>> {
        Ok(self.units.read().await.get(reference).cloned())
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}
