//! # Server Module
//!
//! Application state, router assembly and the HTTP listener.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware,
    routing::{get, post},
};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::auth::jwt::{JwtService, WebhookTokenSigner};
use crate::auth::middleware::AuthMiddleware;
use crate::config::{Config, StoreConfig};
use crate::database::{BookingStore, DatabaseConfig, DatabaseConnection, InMemoryStore};
use crate::routes::{auth, bookings, health, requests, unit_lock, units};
use crate::services::clock::{Clock, SystemClock};
use crate::services::crm_relay::CrmRelay;
use crate::services::stay_window::StayPolicy;
use crate::services::unit_lock::UnitLockRelay;

/// Application state shared across all route handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn BookingStore>,
    pub jwt: Arc<JwtService>,
    pub crm: Arc<CrmRelay>,
    pub unit_lock: Arc<UnitLockRelay>,
    pub clock: Arc<dyn Clock>,
    pub policy: StayPolicy,
    pub ingest_api_key: Option<String>,
}

impl AppState {
    /// Connect the store and build every service from configuration
    pub async fn from_config(config: &Config) -> Result<Self> {
        let store: Arc<dyn BookingStore> = match &config.store {
            StoreConfig::Postgres { url, max_connections } => {
                let db = DatabaseConnection::new(DatabaseConfig::from_url(url, *max_connections)?).await?;
                db.migrate().await?;
                Arc::new(db)
            }
            StoreConfig::Memory => {
                tracing::warn!("using in-memory booking store with sample data; nothing is persisted");
                Arc::new(InMemoryStore::seeded().await)
            }
        };

        let policy = StayPolicy::new(config.stay_utc_offset);
        let jwt = JwtService::new(&config.auth.jwt_secret).context("JWT_SECRET is unusable")?;
        let crm = CrmRelay::new(
            config.crm.api_url.clone(),
            config.crm.api_key.clone(),
            config.crm.timeout,
            policy,
        )?;
        let signer = WebhookTokenSigner::new(&config.unit_lock.jwt_secret).context("N8N_JWT_SECRET is unusable")?;
        let unit_lock = UnitLockRelay::new(config.unit_lock.webhook_url.clone(), signer, config.unit_lock.timeout)?;

        Ok(Self {
            store,
            jwt: Arc::new(jwt),
            crm: Arc::new(crm),
            unit_lock: Arc::new(unit_lock),
            clock: Arc::new(SystemClock),
            policy,
            ingest_api_key: config.ingest_api_key.clone(),
        })
    }
}

/// All routes, with the guest-token gate in front of the protected ones
pub fn build_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/requests", post(requests::create_request))
        .route("/unit-lock", post(unit_lock::unit_lock_post).get(unit_lock::unit_lock_get))
        .route("/units/by-accommodation", get(units::by_accommodation))
        .route_layer(middleware::from_fn_with_state(state.jwt.clone(), AuthMiddleware::validate_token));

    let mut public = Router::new()
        .route("/ping", get(health::ping))
        .route("/health", get(health::health))
        .route("/auth/authenticate", post(auth::authenticate))
        .route("/bookings/authenticate", post(auth::authenticate));

    if state.ingest_api_key.is_some() {
        public = public.route("/bookings/create-from-n8n", post(bookings::create_from_n8n));
    }

    public.merge(protected).with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::ORIGIN, header::CONTENT_TYPE, header::ACCEPT, header::AUTHORIZATION])
        .allow_credentials(true)
}

/// Starts the guest access HTTP server and serves until the process ends.
pub async fn start(config: Config) -> Result<()> {
    let state = AppState::from_config(&config).await?;
    let ingest_enabled = state.ingest_api_key.is_some();

    let app = build_router(state).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(cors_layer(&config.server.cors_allowed_origins)),
    );

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| format!("invalid listen address {}:{}", config.server.host, config.server.port))?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    tracing::info!("🚀 Guest access server listening on http://{}", addr);
    tracing::info!("🏥 Health check available at http://{}/health", addr);
    if !ingest_enabled {
        tracing::info!("booking ingest disabled: BOOKING_INGEST_API_KEY not set");
    }

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration as StdDuration;

    use axum::{
        Json,
        body::Body,
        http::{HeaderMap, Request, StatusCode},
    };
    use chrono::{DateTime, NaiveDate, TimeZone, Utc};
    use serde_json::{Value, json};
    use tokio::sync::mpsc;
    use tower::ServiceExt;

    use crate::auth::jwt::BookingGrant;
    use crate::test_support::{INGEST_KEY, MockUpstream, app_state, unreachable_url};

    fn stay_day() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 12, 21, 10, 0, 0).unwrap()
    }

    async fn call(app: &Router, req: Request<Body>) -> (StatusCode, HeaderMap, Value) {
        let response = app.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
        (status, headers, body)
    }

    fn post_json(uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
        let mut builder = Request::post(uri).header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn get_with_token(uri: &str, token: &str) -> Request<Body> {
        Request::get(uri)
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap()
    }

    /// Guest token minted at the real current time so the middleware accepts it
    fn guest_token(state: &AppState, reference: i64, accommodation: &str) -> String {
        let grant = BookingGrant {
            reference,
            arrival: NaiveDate::from_ymd_opt(2024, 12, 20).unwrap(),
            departure: NaiveDate::from_ymd_opt(2024, 12, 25).unwrap(),
            accommodation,
        };
        state.jwt.issue(&grant, Utc::now(), 3600).unwrap().token
    }

    async fn offline_state() -> AppState {
        app_state(stay_day(), unreachable_url().await, unreachable_url().await).await
    }

    #[tokio::test]
    async fn ping_and_health() {
        let app = build_router(offline_state().await);

        let (status, _, body) = call(&app, Request::get("/ping").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "status": "pong" }));

        let (status, _, body) = call(&app, Request::get("/health").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn current_stay_signs_in_until_checkout() {
        let app = build_router(offline_state().await);

        let (status, headers, body) =
            call(&app, post_json("/auth/authenticate", None, json!({ "bookingReference": 544433 }))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["tokenType"], "Bearer");
        assert_eq!(body["accessValidUntil"], "2024-12-25T12:00:00.000Z");
        assert_eq!(body["booking"]["accommodation"], "Apartment 101");
        let expected = (Utc.with_ymd_and_hms(2024, 12, 25, 12, 0, 0).unwrap() - stay_day()).num_seconds();
        assert_eq!(body["expiresIn"], expected);

        let cookie = headers.get(header::SET_COOKIE).unwrap().to_str().unwrap();
        assert!(cookie.starts_with("access_token="));
        assert!(cookie.contains("HttpOnly"));
    }

    #[tokio::test]
    async fn both_authenticate_paths_agree() {
        let app = build_router(offline_state().await);

        let (status, _, body) =
            call(&app, post_json("/bookings/authenticate", None, json!({ "bookingReference": "123456" }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["accessValidUntil"], "2024-12-22T12:00:00.000Z");
    }

    #[tokio::test]
    async fn future_booking_is_too_early() {
        let app = build_router(offline_state().await);

        let (status, _, body) =
            call(&app, post_json("/auth/authenticate", None, json!({ "bookingReference": 789012 }))).await;

        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["code"], "TOO_EARLY");
        assert_eq!(body["arrivalTime"], "2024-12-22T15:45:00.000Z");
    }

    #[tokio::test]
    async fn authenticate_rejections() {
        let app = build_router(offline_state().await);

        let (status, _, body) = call(&app, post_json("/auth/authenticate", None, json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "MISSING_REFERENCE");

        let (status, _, body) =
            call(&app, post_json("/auth/authenticate", None, json!({ "bookingReference": 111 }))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "INVALID_REFERENCE");

        let (status, _, body) = call(&app, post_json("/auth/authenticate", None, json!({ "bookingReference": 345678 }))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["code"], "TOO_LATE");
        assert_eq!(body["departureTime"], "2024-12-15T12:00:00.000Z");

        let malformed = Request::post("/auth/authenticate")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let (status, _, body) = call(&app, malformed).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "INVALID_PAYLOAD");
    }

    #[tokio::test]
    async fn protected_routes_need_a_valid_token() {
        let app = build_router(offline_state().await);

        let (status, _, body) = call(&app, post_json("/requests", None, json!({ "data": {} }))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "UNAUTHORIZED");

        let (status, _, body) = call(&app, get_with_token("/unit-lock", "not-a-token")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "INVALID_TOKEN");
    }

    #[tokio::test]
    async fn request_for_another_booking_is_refused() {
        let state = offline_state().await;
        let token = guest_token(&state, 544433, "Apartment 101");
        let app = build_router(state);

        let (status, _, body) = call(
            &app,
            post_json("/requests", Some(&token), json!({ "data": { "Reference_Number": "123456", "type": "cleaning" } })),
        )
        .await;

        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["code"], "REFERENCE_MISMATCH");
    }

    #[tokio::test]
    async fn request_is_backfilled_and_relayed_to_crm() {
        let (tx, mut rx) = mpsc::unbounded_channel::<Value>();
        let crm = MockUpstream::start(Router::new().route(
            "/ws/application.php",
            post(move |Json(payload): Json<Value>| {
                let tx = tx.clone();
                async move {
                    let _ = tx.send(payload);
                    Json(json!({ "status": "ok", "id": 42 }))
                }
            }),
        ))
        .await;

        let state = app_state(stay_day(), crm.url("/ws/application.php"), unreachable_url().await).await;
        let store = state.store.clone();
        let token = guest_token(&state, 544433, "Apartment 101");
        let app = build_router(state);

        let (status, _, body) = call(
            &app,
            post_json(
                "/requests",
                Some(&token),
                json!({ "data": { "type": "cleaning", "note": "Please clean, 2 bedroom flat" } }),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["Reference_Number"], 544433);
        assert_eq!(body["data"]["roomnumber"], "Apartment 101");

        let sent = tokio::time::timeout(StdDuration::from_secs(5), rx.recv()).await.unwrap().unwrap();
        assert_eq!(sent["roomnumber"], "Apartment 101");
        assert_eq!(sent["requesttype"], "نظافة");
        assert_eq!(sent["requestcategory"], "تنظيف شقة 2 غرفة");
        assert_eq!(sent["name"], "Guest");

        let id = body["data"]["id"].as_str().unwrap().parse().unwrap();
        let mut recorded = None;
        for _ in 0..50 {
            let request = store.find_request(id).await.unwrap().unwrap();
            if request.crm_sent.is_some() {
                recorded = Some(request);
                break;
            }
            tokio::time::sleep(StdDuration::from_millis(20)).await;
        }
        let recorded = recorded.expect("CRM outcome was never recorded");
        assert_eq!(recorded.crm_sent, Some(true));
        assert_eq!(recorded.crm_response.unwrap()["id"], 42);
    }

    #[tokio::test]
    async fn whole_float_reference_and_crm_type_are_accepted() {
        let state = offline_state().await;
        let token = guest_token(&state, 544433, "Apartment 101");
        let app = build_router(state);

        let (status, _, body) = call(
            &app,
            post_json(
                "/requests",
                Some(&token),
                json!({ "data": { "Reference_Number": 544433.0, "requesttype": "نظافة" } }),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["Reference_Number"], 544433);
        assert_eq!(body["data"]["type"], "cleaning");
    }

    #[tokio::test]
    async fn crm_outage_does_not_fail_the_request() {
        let state = offline_state().await;
        let token = guest_token(&state, 544433, "Apartment 101");
        let app = build_router(state);

        let (status, _, body) = call(
            &app,
            post_json("/requests", Some(&token), json!({ "data": { "type": "maintenance", "roomnumber": "R9" } })),
        )
        .await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["roomnumber"], "R9");
    }

    #[tokio::test]
    async fn ingested_booking_unlocks_its_unit() {
        let webhook = MockUpstream::start(Router::new().route(
            "/webhook/unit-lock",
            post(|| async {
                Json(json!([{
                    "col_2": "R217",
                    "col_4": "Alaredh",
                    "col_5": "D5",
                    "col_6": "1234",
                    "col_7": "5678"
                }]))
            }),
        ))
        .await;

        let state = app_state(stay_day(), unreachable_url().await, webhook.url("/webhook/unit-lock")).await;
        let token = guest_token(&state, 600100, "Alaredh R217");
        let app = build_router(state);

        let ingest = Request::post("/bookings/create-from-n8n")
            .header(header::CONTENT_TYPE, "application/json")
            .header("x-api-key", INGEST_KEY)
            .body(Body::from(
                json!({ "data": {
                    "Booking_Reference_Number": "600100",
                    "Arrival": "20/12/2024",
                    "Departure": "25/12/2024",
                    "Accommodation": "Alaredh R217"
                }})
                .to_string(),
            ))
            .unwrap();
        let (status, _, body) = call(&app, ingest).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["reference"], 600100);

        let (status, _, body) = call(&app, get_with_token("/unit-lock", &token)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body["data"],
            json!({
                "unit": "R217/D5",
                "development": "Alaredh",
                "buildingPassword": "1234",
                "apartmentPassword": "5678"
            })
        );

        let empty_post = Request::post("/unit-lock")
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap();
        let (status, _, body) = call(&app, empty_post).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["unit"], "R217/D5");

        let (status, _, body) =
            call(&app, post_json("/unit-lock", Some(&token), json!({ "reference": "544433" }))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["code"], "REFERENCE_MISMATCH");
    }

    #[tokio::test]
    async fn unit_lock_rejects_unparseable_accommodation() {
        let state = offline_state().await;
        let token = guest_token(&state, 544433, "Apartment 101");
        let app = build_router(state);

        let (status, _, body) = call(&app, get_with_token("/unit-lock?reference=544433", &token)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "INVALID_ACCOMMODATION_FORMAT");

        let (status, _, body) = call(&app, get_with_token("/unit-lock?reference=abc", &token)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "INVALID_REFERENCE_FORMAT");
    }

    #[tokio::test]
    async fn unit_lock_reports_unknown_booking() {
        let state = offline_state().await;
        let token = guest_token(&state, 999001, "Alaredh R217");
        let app = build_router(state);

        let (status, _, body) = call(&app, get_with_token("/unit-lock", &token)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "BOOKING_NOT_FOUND");
    }

    #[tokio::test]
    async fn unit_by_accommodation_from_token_or_query() {
        let state = offline_state().await;
        let token = guest_token(&state, 544433, "Alaredh R217");
        let app = build_router(state);

        let (status, _, body) = call(&app, get_with_token("/units/by-accommodation", &token)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["reference"], "R217");
        assert_eq!(body["data"]["development"], "Alaredh");

        let (status, _, body) =
            call(&app, get_with_token("/units/by-accommodation?accommodation=Alaredh%20R999", &token)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "UNIT_NOT_FOUND");

        let (status, _, body) =
            call(&app, get_with_token("/units/by-accommodation?accommodation=Penthouse", &token)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "INVALID_ACCOMMODATION_FORMAT");
    }

    #[tokio::test]
    async fn ingest_requires_the_api_key() {
        let app = build_router(offline_state().await);
        let body = json!({ "bookingReference": 1, "arrival": "2024-12-01", "departure": "2024-12-02", "accommodation": "R1" });

        let (status, _, response) = call(&app, post_json("/bookings/create-from-n8n", None, body.clone())).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(response["code"], "UNAUTHORIZED");

        let update = Request::post("/bookings/create-from-n8n")
            .header(header::CONTENT_TYPE, "application/json")
            .header("x-api-key", INGEST_KEY)
            .body(Body::from(json!({ "bookingReference": 544433, "arrival": "2024-12-20", "departure": "2024-12-26", "accommodation": "Apartment 101" }).to_string()))
            .unwrap();
        let (status, _, response) = call(&app, update).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(response["message"], "Booking updated successfully");
        assert_eq!(response["data"]["departure"], "2024-12-26");
    }

    #[tokio::test]
    async fn ingest_route_absent_without_key() {
        let mut state = offline_state().await;
        state.ingest_api_key = None;
        let app = build_router(state);

        let (status, _, _) = call(&app, post_json("/bookings/create-from-n8n", None, json!({}))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn unknown_path_is_not_found_without_token() {
        let app = build_router(offline_state().await);

        let (status, _, _) = call(&app, Request::get("/no-such-route").body(Body::empty()).unwrap()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    fn preflight(origin: &str) -> Request<Body> {
        Request::options("/auth/authenticate")
            .header(header::ORIGIN, origin)
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn cors_allows_only_configured_origins() {
        let app = build_router(offline_state().await)
            .layer(cors_layer(&["https://guest.example.com".into(), "bad\norigin".into()]));

        let response = app.clone().oneshot(preflight("https://guest.example.com")).await.unwrap();
        assert_eq!(
            response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
            "https://guest.example.com"
        );
        assert_eq!(response.headers().get(header::ACCESS_CONTROL_ALLOW_CREDENTIALS).unwrap(), "true");

        let response = app.oneshot(preflight("https://elsewhere.example.com")).await.unwrap();
        assert!(response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
    }
}
