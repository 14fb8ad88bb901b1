//! # Services Module
//!
//! Business logic behind the routes: the stay window and sign-in gate, booking
//! ingest, and the two outbound relays (CRM and unit-lock webhook).

pub mod authentication;
pub mod booking_ingest;
pub mod clock;
pub mod crm_relay;
pub mod stay_window;
pub mod unit_lock;
