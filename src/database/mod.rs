//! # Database Module
//!
//! Booking store port plus its Postgres (tokio-postgres + deadpool) and
//! in-memory implementations. Schema lives in embedded refinery migrations.

pub mod connection;
pub mod memory;
pub mod migrations;
pub mod models;
pub mod store;

pub use connection::{DatabaseConfig, DatabaseConnection};
pub use memory::InMemoryStore;
pub use store::BookingStore;
