// # Routes Module
//
// HTTP handlers, one submodule per API area. Routers are assembled in
// `server.rs`; handlers behind the guest token receive a `BookingSession`
// extension from the auth middleware.

/// Liveness and readiness checks
pub mod health;

/// Guest sign-in by booking reference
pub mod auth;

/// Booking ingest from the booking-channel workflow
pub mod bookings;

/// Guest service requests relayed to the CRM
pub mod requests;

/// Door codes via the automation webhook
pub mod unit_lock;

/// Unit records by accommodation
pub mod units;
