use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use redis::AsyncCommands;
use std::net::SocketAddr;

use super::AppState;
use crate::auth::CurrentUser;

/// Fixed-window request limiter. Signed-in users are counted per account,
/// everyone else per client IP. Runs after auth so the user is known.
pub async fn rate_limit(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let key = format!("rate:{}", client_key(&req));
    let limit = state.rate_limit_requests;
    let window = state.rate_limit_window;

    let mut conn = state.redis.clone();

    let count: u32 = match redis::cmd("INCR").arg(&key).query_async(&mut conn).await {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("Redis INCR error: {e}");
            return Ok(next.run(req).await);
        }
    };

    if count == 1 {
        if let Err(e) = conn.expire::<_, ()>(&key, window as i64).await {
            tracing::error!("Redis EXPIRE error: {e}");
        }
    }

    if count > limit {
        let ttl: i64 = conn.ttl(&key).await.unwrap_or(window as i64);
        tracing::warn!(key, count, "Rate limit exceeded");
        let mut response = (
            StatusCode::TOO_MANY_REQUESTS,
            Json(serde_json::json!({ "error": "Too many requests" })),
        )
            .into_response();
        set_rate_headers(response.headers_mut(), limit, 0, ttl);
        return Ok(response);
    }

    let mut response = next.run(req).await;
    set_rate_headers(response.headers_mut(), limit, limit.saturating_sub(count), 0);
    Ok(response)
}

fn client_key(req: &Request) -> String {
    if let Some(user) = req.extensions().get::<CurrentUser>() {
        if !user.id.is_nil() {
            return format!("user:{}", user.id);
        }
    }
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string());
    format!("ip:{}", client_ip(req.headers(), peer))
}

/// First `X-Forwarded-For` hop when behind a proxy, else the peer address.
fn client_ip(headers: &HeaderMap, peer: Option<String>) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(String::from)
        .or(peer)
        .unwrap_or_else(|| "unknown".to_string())
}

fn set_rate_headers(headers: &mut HeaderMap, limit: u32, remaining: u32, retry_after: i64) {
    if let Ok(v) = HeaderValue::from_str(&limit.to_string()) {
        headers.insert("X-RateLimit-Limit", v);
    }
    if let Ok(v) = HeaderValue::from_str(&remaining.to_string()) {
        headers.insert("X-RateLimit-Remaining", v);
    }
    if retry_after > 0 {
        if let Ok(v) = HeaderValue::from_str(&retry_after.to_string()) {
            headers.insert("Retry-After", v);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    #[test]
    fn test_forwarded_for_wins() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "198.51.100.4, 10.0.0.1".parse().unwrap());
        assert_eq!(client_ip(&headers, Some("10.0.0.9".into())), "198.51.100.4");
    }

    #[test]
    fn test_peer_fallback() {
        let headers = HeaderMap::new();
        assert_eq!(client_ip(&headers, Some("10.0.0.9".into())), "10.0.0.9");
        assert_eq!(client_ip(&headers, None), "unknown");
    }

    #[test]
    fn test_signed_in_users_keyed_by_account() {
        let id = uuid::Uuid::new_v4();
        let mut req = Request::new(Body::empty());
        req.extensions_mut().insert(CurrentUser {
            id,
            email: "a@b.c".into(),
            role: "customer".into(),
            is_api_key: false,
        });
        assert_eq!(client_key(&req), format!("user:{id}"));

        let anon = Request::new(Body::empty());
        assert_eq!(client_key(&anon), "ip:unknown");
    }
}
