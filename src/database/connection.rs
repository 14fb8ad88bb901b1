// Database Connection Management
//
// PostgreSQL connection pooling using tokio-postgres and deadpool, plus the
// Postgres implementation of the booking store.
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::Utc;
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use native_tls::TlsConnector;
use postgres_native_tls::MakeTlsConnector;
use serde_json::Value;
use uuid::Uuid;

use crate::database::migrations;
use crate::database::models::{
    Booking, BookingUpsert, FromRow, Guest, GuestSignIn, NewServiceRequest, ServiceRequest, Unit,
};
use crate::database::store::BookingStore;

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub dbname: String,
    pub max_size: usize,
    pub timeouts: deadpool_postgres::Timeouts,
}

impl DatabaseConfig {
    /// Create configuration from a postgres connection string
    pub fn from_url(database_url: &str, max_size: usize) -> Result<Self> {
        let config = tokio_postgres::Config::from_str(database_url)
            .context("Failed to parse DATABASE_URL")?;

        Ok(Self {
            host: config
                .get_hosts()
                .first()
                .map(|h| match h {
                    tokio_postgres::config::Host::Tcp(s) => s.clone(),
                    tokio_postgres::config::Host::Unix(s) => s.to_string_lossy().to_string(),
                })
                .unwrap_or_else(|| "localhost".to_string()),
            port: config.get_ports().first().copied().unwrap_or(5432),
            user: config.get_user().map(|u| u.to_string()).unwrap_or_default(),
            password: config
                .get_password()
                .map(|p| String::from_utf8_lossy(p).to_string())
                .unwrap_or_default(),
            dbname: config.get_dbname().map(|d| d.to_string()).unwrap_or_default(),
            max_size,
            timeouts: deadpool_postgres::Timeouts {
                wait: Some(Duration::from_secs(30)),
                create: Some(Duration::from_secs(30)),
                recycle: Some(Duration::from_secs(30)),
            },
        })
    }
}

/// Database connection wrapper
#[derive(Debug, Clone)]
pub struct DatabaseConnection {
    pool: Pool,
}

impl DatabaseConnection {
    /// Create a new database connection with the provided configuration
    pub async fn new(config: DatabaseConfig) -> Result<Self> {
        let masked_host = format!("{}:{}/{}", config.host, config.port, config.dbname);
        tracing::info!("🔌 Connecting to database: {}", masked_host);

        let mut pg_config = tokio_postgres::Config::new();
        pg_config.host(&config.host);
        pg_config.port(config.port);
        pg_config.user(&config.user);
        pg_config.password(&config.password);
        pg_config.dbname(&config.dbname);

        let tls_connector = TlsConnector::builder()
            .build()
            .context("Failed to build TLS connector")?;
        let tls = MakeTlsConnector::new(tls_connector);

        let mgr_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };
        let mgr = Manager::from_config(pg_config, tls, mgr_config);

        let pool = Pool::builder(mgr)
            .max_size(config.max_size)
            .wait_timeout(config.timeouts.wait)
            .create_timeout(config.timeouts.create)
            .recycle_timeout(config.timeouts.recycle)
            .runtime(deadpool_postgres::Runtime::Tokio1)
            .build()
            .context("Failed to create database pool")?;

        let connection = Self { pool };
        connection.health_check().await?;

        tracing::info!("✅ Database connection established successfully");
        Ok(connection)
    }

    /// Run embedded schema migrations
    pub async fn migrate(&self) -> Result<()> {
        migrations::run_migrations(&self.pool).await
    }
}

#[async_trait]
impl BookingStore for DatabaseConnection {
    async fn find_booking_by_reference(&self, reference: i64) -> Result<Option<Booking>> {
        let client = self.pool.get().await.context("Failed to get DB connection")?;
        let row = client
            .query_opt(
                "SELECT booking_reference, arrival, departure, accommodation
                 FROM bookings WHERE booking_reference = $1",
                &[&reference],
            )
            .await
            .context("Failed to query booking by reference")?;
        row.map(|r| Booking::from_row(&r)).transpose().map_err(Into::into)
    }

    async fn upsert_booking(&self, booking: Booking) -> Result<BookingUpsert> {
        let client = self.pool.get().await.context("Failed to get DB connection")?;
        // xmax = 0 only for freshly inserted rows
        let row = client
            .query_one(
                "INSERT INTO bookings (booking_reference, arrival, departure, accommodation)
                 VALUES ($1, $2, $3, $4)
                 ON CONFLICT (booking_reference) DO UPDATE
                 SET arrival = EXCLUDED.arrival,
                     departure = EXCLUDED.departure,
                     accommodation = EXCLUDED.accommodation,
                     updated_at = NOW()
                 RETURNING booking_reference, arrival, departure, accommodation,
                           (xmax = 0) AS created",
                &[&booking.reference, &booking.arrival, &booking.departure, &booking.accommodation],
            )
            .await
            .context("Failed to upsert booking")?;
        Ok(BookingUpsert {
            booking: Booking::from_row(&row)?,
            created: row.try_get("created")?,
        })
    }

    async fn upsert_guest(&self, sign_in: GuestSignIn) -> Result<Guest> {
        let client = self.pool.get().await.context("Failed to get DB connection")?;
        let row = client
            .query_one(
                "INSERT INTO guests (booking_reference, first_sign_up, last_sign_in, sign_in_count,
                                     current_token, token_expires_at)
                 VALUES ($1, $2, $2, 1, $3, $4)
                 ON CONFLICT (booking_reference) DO UPDATE
                 SET last_sign_in = EXCLUDED.last_sign_in,
                     sign_in_count = guests.sign_in_count + 1,
                     current_token = EXCLUDED.current_token,
                     token_expires_at = EXCLUDED.token_expires_at
                 RETURNING *",
                &[
                    &sign_in.reference,
                    &sign_in.signed_in_at,
                    &sign_in.token,
                    &sign_in.token_expires_at,
                ],
            )
            .await
            .context("Failed to upsert guest")?;
        Ok(Guest::from_row(&row)?)
    }

    #[cfg(test)]
    async fn find_guest(&self, reference: i64) -> Result<Option<Guest>> {
        let client = self.pool.get().await.context("Failed to get DB connection")?;
        let row = client
            .query_opt("SELECT * FROM guests WHERE booking_reference = $1", &[&reference])
            .await
            .context("Failed to query guest")?;
        row.map(|r| Guest::from_row(&r)).transpose().map_err(Into::into)
    }

    async fn create_request(&self, request: NewServiceRequest) -> Result<ServiceRequest> {
        let client = self.pool.get().await.context("Failed to get DB connection")?;
        let id = Uuid::new_v4();
        let request_type = request.request_type.map(|t| t.as_str());
        let row = client
            .query_one(
                "INSERT INTO service_requests (id, booking_reference, request_type, request_category,
                                               room_number, guest_name, phone, check_in, check_out,
                                               note, created_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                 RETURNING *",
                &[
                    &id,
                    &request.reference,
                    &request_type,
                    &request.category,
                    &request.room_number,
                    &request.guest_name,
                    &request.phone,
                    &request.check_in,
                    &request.check_out,
                    &request.note,
                    &Utc::now(),
                ],
            )
            .await
            .context("Failed to insert service request")?;
        Ok(ServiceRequest::from_row(&row)?)
    }

    #[cfg(test)]
    async fn find_request(&self, id: Uuid) -> Result<Option<ServiceRequest>> {
        let client = self.pool.get().await.context("Failed to get DB connection")?;
        let row = client
            .query_opt("SELECT * FROM service_requests WHERE id = $1", &[&id])
            .await
            .context("Failed to query service request")?;
        row.map(|r| ServiceRequest::from_row(&r)).transpose().map_err(Into::into)
    }

    async fn record_crm_outcome(&self, id: Uuid, sent: bool, response: Value) -> Result<()> {
        let client = self.pool.get().await.context("Failed to get DB connection")?;
        let n = client
            .execute(
                "UPDATE service_requests SET crm_sent = $1, crm_response = $2 WHERE id = $3",
                &[&sent, &response, &id],
            )
            .await
            .context("Failed to record CRM outcome")?;
        if n == 0 {
            return Err(anyhow!("request {id} not found"));
        }
        Ok(())
    }

    async fn find_unit_by_reference(&self, reference: &str) -> Result<Option<Unit>> {
        let client = self.pool.get().await.context("Failed to get DB connection")?;
        let row = client
            .query_opt("SELECT * FROM units WHERE reference = $1", &[&reference])
            .await
            .context("Failed to query unit by reference")?;
        row.map(|r| Unit::from_row(&r)).transpose().map_err(Into::into)
    }

    /// Check database health
    async fn health_check(&self) -> Result<()> {
        let client = self
            .pool
            .get()
            .await
            .context("Failed to get connection for health check")?;

        client
            .query("SELECT 1", &[])
            .await
            .context("Database health check failed")?;
        Ok(())
    }
}
