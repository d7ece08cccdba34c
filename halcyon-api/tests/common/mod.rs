#[allow(unused_imports)]
use axum::{body::Body, http::Request, Router};
use http_body_util::BodyExt;
use serde_json::Value;
use sqlx::{PgPool, postgres::PgPoolOptions};
use std::sync::Arc;
use tower::ServiceExt;

use halcyon_api::auth;
use halcyon_api::cache::QueryCache;
use halcyon_api::payments::dummy::DummyProvider;
use halcyon_api::payments::PaymentProvider;
use halcyon_api::routes::{self, AppState};
use halcyon_api::virtfusion::VirtFusionClient;

const ADMIN_EMAIL: &str = "admin@test.local";
const ADMIN_PASSWORD: &str = "testpass123";
pub const CUSTOMER_PASSWORD: &str = "customerpass1";

/// Nothing listens here; tests that never reach the control plane use it.
const UNREACHABLE_VF: &str = "http://127.0.0.1:9";

pub async fn setup() -> (Router, PgPool) {
    setup_with_vf(UNREACHABLE_VF).await
}

/// Router wired to a mocked control plane at `vf_url` and the dummy
/// payment provider.
pub async fn setup_with_vf(vf_url: &str) -> (Router, PgPool) {
    let (state, pool) = state_with(vf_url, Arc::new(DummyProvider::new())).await;
    (routes::app(state), pool)
}

/// Router backed by the given payment provider; the control plane is
/// unreachable.
#[allow(dead_code)]
pub async fn setup_with_payments(payments: Arc<dyn PaymentProvider>) -> (Router, PgPool) {
    let (state, pool) = state_with(UNREACHABLE_VF, payments).await;
    (routes::app(state), pool)
}

/// Application state over the test database and Redis, for tests that
/// drive background jobs as well as routes.
pub async fn state_with(vf_url: &str, payments: Arc<dyn PaymentProvider>) -> (AppState, PgPool) {
    let database_url =
        std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for integration tests");
    let redis_url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".into());

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .expect("Failed to connect to test database");

    sqlx::migrate::Migrator::new(std::path::Path::new("./migrations"))
        .await
        .expect("Failed to load migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    cleanup(&pool).await;

    let password_hash = auth::hash_password(ADMIN_PASSWORD).expect("Failed to hash password");
    sqlx::query(
        "INSERT INTO users (email, password_hash, name, role, force_password_change) VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(ADMIN_EMAIL)
    .bind(&password_hash)
    .bind("Test Admin")
    .bind("admin")
    .bind(false)
    .execute(&pool)
    .await
    .expect("Failed to seed admin user");

    let redis_client =
        redis::Client::open(redis_url.as_str()).expect("Failed to create Redis client");
    let redis_conn = redis::aio::ConnectionManager::new(redis_client)
        .await
        .expect("Failed to connect to Redis");

    // Control-plane reads are cached across runs; start every suite cold.
    let cache = QueryCache::new(redis_conn.clone());
    cache.invalidate_prefix("vf:").await;

    let http_client = reqwest::Client::new();
    let app_state = AppState {
        db: pool.clone(),
        api_key: Some("test-api-key".to_string()),
        redis: redis_conn,
        rate_limit_requests: 1000,
        rate_limit_window: 60,
        http_client: http_client.clone(),
        jwt_secret: "test-jwt-secret".to_string(),
        jwt_expiry_hours: 24,
        vf: VirtFusionClient::new(http_client, vf_url, "test-vf-token", 5),
        payments,
        cache,
        app_url: "http://dash.test".to_string(),
        stats_ttl_secs: 30,
        catalog_ttl_secs: 600,
    };

    (app_state, pool)
}

pub async fn login(router: &Router, email: &str, password: &str) -> String {
    let body = serde_json::json!({
        "email": email,
        "password": password,
    });

    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/auth/login")
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_string(&body).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), 200, "Login should succeed for {email}");

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: Value = serde_json::from_slice(&body).unwrap();
    json["token"].as_str().unwrap().to_string()
}

pub async fn login_admin(router: &Router) -> String {
    login(router, ADMIN_EMAIL, ADMIN_PASSWORD).await
}

/// Registers a customer through the public endpoint and returns
/// (token, user id).
#[allow(dead_code)]
pub async fn register_customer(router: &Router, email: &str) -> (String, String) {
    let body = serde_json::json!({
        "email": email,
        "password": CUSTOMER_PASSWORD,
        "name": "Test Customer",
    });
    let (status, json) = request(router, "POST", "/api/auth/register", None, Some(body)).await;
    assert_eq!(status, 201, "Registration should succeed for {email}: {json}");
    (
        json["token"].as_str().unwrap().to_string(),
        json["user"]["id"].as_str().unwrap().to_string(),
    )
}

/// Credits a wallet directly, bypassing the processor.
#[allow(dead_code)]
pub async fn fund_wallet(pool: &PgPool, user_id: &str, amount_cents: i64) {
    let user_id: uuid::Uuid = user_id.parse().unwrap();
    sqlx::query(
        r#"INSERT INTO wallets (user_id, balance_cents) VALUES ($1, $2)
           ON CONFLICT (user_id) DO UPDATE SET balance_cents = wallets.balance_cents + $2"#,
    )
    .bind(user_id)
    .bind(amount_cents)
    .execute(pool)
    .await
    .expect("Failed to fund wallet");
}

async fn request(
    router: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (u16, Value) {
    let mut req = Request::builder().method(method).uri(uri);
    // No content type without a body, so optional JSON bodies read as absent
    let body = match body {
        Some(json) => {
            req = req.header("content-type", "application/json");
            Body::from(serde_json::to_string(&json).unwrap())
        }
        None => Body::empty(),
    };
    if let Some(token) = token {
        req = req.header("authorization", format!("Bearer {}", token));
    }
    let req = req.body(body).unwrap();

    let response = router.clone().oneshot(req).await.unwrap();
    let status = response.status().as_u16();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();

    let json: Value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };

    (status, json)
}

/// Send a request with a JWT Bearer token and return (status, body_json)
pub async fn request_with_token(
    router: &Router,
    method: &str,
    uri: &str,
    token: &str,
    body: Option<Value>,
) -> (u16, Value) {
    request(router, method, uri, Some(token), body).await
}

/// Send a request with a JWT Bearer token and return (status, raw body)
#[allow(dead_code)]
pub async fn request_text(router: &Router, uri: &str, token: &str) -> (u16, String) {
    let req = Request::builder()
        .method("GET")
        .uri(uri)
        .header("authorization", format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap();

    let response = router.clone().oneshot(req).await.unwrap();
    let status = response.status().as_u16();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, String::from_utf8_lossy(&bytes).into_owned())
}

/// Send a request with X-Api-Key header
#[allow(dead_code)]
pub async fn request_with_api_key(
    router: &Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
) -> (u16, Value) {
    let mut req = Request::builder()
        .method(method)
        .uri(uri)
        .header("x-api-key", "test-api-key");
    let body = match body {
        Some(json) => {
            req = req.header("content-type", "application/json");
            Body::from(serde_json::to_string(&json).unwrap())
        }
        None => Body::empty(),
    };
    let req = req.body(body).unwrap();

    let response = router.clone().oneshot(req).await.unwrap();
    let status = response.status().as_u16();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();

    let json: Value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };

    (status, json)
}

/// Posts a raw processor webhook, optionally with a `Stripe-Signature`.
#[allow(dead_code)]
pub async fn post_webhook(router: &Router, body: &str, signature: Option<&str>) -> (u16, Value) {
    let mut req = Request::builder()
        .method("POST")
        .uri("/api/webhooks/stripe")
        .header("content-type", "application/json");
    if let Some(sig) = signature {
        req = req.header("stripe-signature", sig);
    }
    let req = req.body(Body::from(body.to_string())).unwrap();

    let response = router.clone().oneshot(req).await.unwrap();
    let status = response.status().as_u16();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

pub async fn cleanup(pool: &PgPool) {
    sqlx::query(
        "TRUNCATE TABLE audit_logs, ticket_messages, tickets, transactions, wallets, orders, plans, regions, users RESTART IDENTITY CASCADE",
    )
    .execute(pool)
    .await
    .expect("Failed to truncate tables");
}
