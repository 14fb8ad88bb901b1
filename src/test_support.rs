//! Shared fixtures for unit and router tests.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use chrono::{DateTime, FixedOffset, Utc};
use tokio::net::TcpListener;
use url::Url;

use crate::auth::jwt::{JwtService, WebhookTokenSigner};
use crate::database::memory::InMemoryStore;
use crate::server::AppState;
use crate::services::clock::Clock;
use crate::services::crm_relay::CrmRelay;
use crate::services::stay_window::StayPolicy;
use crate::services::unit_lock::UnitLockRelay;

pub const GUEST_SECRET: &str = "test_guest_secret";
pub const WEBHOOK_SECRET: &str = "test_webhook_secret";
pub const INGEST_KEY: &str = "test_ingest_key";

/// Clock pinned to one instant
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Upstream stand-in served on an ephemeral local port
pub struct MockUpstream {
    addr: SocketAddr,
}

impl MockUpstream {
    pub async fn start(router: Router) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        Self { addr }
    }

    pub fn url(&self, path: &str) -> Url {
        Url::parse(&format!("http://{}{}", self.addr, path)).unwrap()
    }
}

/// A local address with nothing listening on it
pub async fn unreachable_url() -> Url {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    Url::parse(&format!("http://{addr}/")).unwrap()
}

/// Application state over a seeded in-memory store, relays pointed at `crm_url` and `webhook_url`
pub async fn app_state(now: DateTime<Utc>, crm_url: Url, webhook_url: Url) -> AppState {
    let policy = StayPolicy::new(FixedOffset::east_opt(0).unwrap());
    let crm = CrmRelay::new(crm_url, "test_crm_key".to_string(), Duration::from_secs(2), policy).unwrap();
    let unit_lock = UnitLockRelay::new(
        webhook_url,
        WebhookTokenSigner::new(WEBHOOK_SECRET).unwrap(),
        Duration::from_secs(2),
    )
    .unwrap();

    AppState {
        store: Arc::new(InMemoryStore::seeded().await),
        jwt: Arc::new(JwtService::new(GUEST_SECRET).unwrap()),
        crm: Arc::new(crm),
        unit_lock: Arc::new(unit_lock),
        clock: Arc::new(FixedClock(now)),
        policy,
        ingest_api_key: Some(INGEST_KEY.to_string()),
    }
}
