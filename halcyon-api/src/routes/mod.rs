pub mod admin_servers;
pub mod audit_logs;
pub mod auth_routes;
pub mod billing;
pub mod deploy;
pub mod infrastructure;
pub mod payment_methods;
pub mod rate_limit;
pub mod servers;
pub mod tickets;
pub mod users;
pub mod wallet;
pub mod webhooks;

use std::sync::Arc;

use axum::{
    extract::Request,
    http::StatusCode,
    middleware::Next,
    response::Response,
    Router,
};

use crate::auth::{verify_token, CurrentUser, ROLE_ADMIN};
use crate::cache::QueryCache;
use crate::db::Db;
use crate::payments::PaymentProvider;
use crate::virtfusion::VirtFusionClient;

#[derive(Clone)]
pub struct AppState {
    pub db: Db,
    pub api_key: Option<String>,
    pub redis: redis::aio::ConnectionManager,
    pub rate_limit_requests: u32,
    pub rate_limit_window: u64,
    pub http_client: reqwest::Client,
    pub jwt_secret: String,
    pub jwt_expiry_hours: u64,
    pub vf: VirtFusionClient,
    pub payments: Arc<dyn PaymentProvider>,
    pub cache: QueryCache,
    /// Dashboard base URL for checkout return links.
    pub app_url: String,
    pub stats_ttl_secs: u64,
    pub catalog_ttl_secs: u64,
}

/// Every route, with auth and rate limiting applied to the protected ones.
/// Login, registration and the processor webhook stay public.
pub fn app(state: AppState) -> Router {
    let public_routes = Router::new()
        .merge(auth_routes::router())
        .merge(webhooks::router());

    let api_routes = Router::new()
        .merge(auth_routes::protected_router())
        .merge(users::router())
        .merge(audit_logs::router())
        .merge(admin_servers::router())
        .merge(infrastructure::router())
        .merge(servers::router())
        .merge(wallet::router())
        .merge(billing::router())
        .merge(payment_methods::router())
        .merge(deploy::router())
        .merge(tickets::router())
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            rate_limit::rate_limit,
        ))
        .layer(axum::middleware::from_fn_with_state(state.clone(), auth));

    Router::new()
        .route("/healthz", axum::routing::get(|| async { "ok" }))
        .merge(public_routes)
        .merge(api_routes)
        .with_state(state)
}

/// Auth middleware: try Bearer JWT → try X-Api-Key → allow if no API_KEY set → 401.
/// Inserts CurrentUser into request extensions on success.
pub async fn auth(
    state: axum::extract::State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    if let Some(auth_header) = req.headers().get("authorization").and_then(|v| v.to_str().ok()) {
        if let Some(token) = auth_header.strip_prefix("Bearer ") {
            if let Ok(claims) = verify_token(token, &state.jwt_secret) {
                let user_id = claims.sub.parse::<uuid::Uuid>().map_err(|_| StatusCode::UNAUTHORIZED)?;
                req.extensions_mut().insert(CurrentUser {
                    id: user_id,
                    email: claims.email,
                    role: claims.role,
                    is_api_key: false,
                });
                return Ok(next.run(req).await);
            }
        }
    }

    if let Some(ref expected) = state.api_key {
        let provided = req
            .headers()
            .get("x-api-key")
            .and_then(|v| v.to_str().ok());

        match provided {
            Some(key) if key == expected => {
                req.extensions_mut().insert(CurrentUser {
                    id: uuid::Uuid::nil(),
                    email: "api-key".to_string(),
                    role: ROLE_ADMIN.to_string(),
                    is_api_key: true,
                });
                return Ok(next.run(req).await);
            }
            Some(_) => return Err(StatusCode::UNAUTHORIZED),
            None => {}
        }
    }

    // Local development without API_KEY
    if state.api_key.is_none() {
        req.extensions_mut().insert(CurrentUser {
            id: uuid::Uuid::nil(),
            email: "anonymous".to_string(),
            role: ROLE_ADMIN.to_string(),
            is_api_key: true,
        });
        return Ok(next.run(req).await);
    }

    Err(StatusCode::UNAUTHORIZED)
}
