//! # Guest Access Server
//!
//! HTTP API for short-stay guests, built with Rust, Axum and Tokio. A guest
//! signs in with their booking reference while their stay is current and gets
//! a token bound to that booking, which unlocks:
//! - service requests (extension, cleaning, maintenance) relayed to the CRM
//! - door codes for their unit from the unit-lock automation webhook
//! - the unit record behind their accommodation
//!
//! ## Architecture
//! - `server`: application state and router assembly
//! - `config`: environment configuration, validated once at startup
//! - `auth`: guest tokens, the bearer middleware and the reference guard
//! - `services`: stay window, sign-in gate, booking ingest and the relays
//! - `database`: the booking store trait with Postgres and in-memory backends
//! - `routes`: HTTP handlers
//!
//! ## Environment Setup
//! Copy `.env.example` to `.env` and fill in the secrets:
//! ```bash
//! cp .env.example .env
//! ```
//!
//! ## Running the Server
//! ```bash
//! cargo run
//! curl http://localhost:3000/ping
//! ```

mod auth;
mod config;
mod database;
mod error;
mod routes;
mod server;
mod services;
#[cfg(test)]
mod test_support;

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Application entry point.
///
/// Loads `.env`, initializes logging, validates configuration and serves until
/// the process is terminated. Missing secrets stop startup with an error.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_target(false).compact())
        .init();

    tracing::info!("🏁 Starting guest access server...");
    tracing::info!("📦 Package: {} v{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
    tracing::info!("🏗️  Build profile: {}", if cfg!(debug_assertions) { "debug" } else { "release" });

    let config = config::Config::from_env()?;
    let store = match config.store {
        config::StoreConfig::Postgres { .. } => "postgres",
        config::StoreConfig::Memory => "memory",
    };
    tracing::info!(host = %config.server.host, port = config.server.port, store, "configuration loaded");

    server::start(config).await
}
