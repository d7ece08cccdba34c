use axum::{extract::State, routing::get, Extension, Json, Router};

use crate::auth::{require_admin, CurrentUser, ROLE_CUSTOMER};
use crate::cache::keys;
use crate::errors::{AppError, ErrorResponse};
use crate::models::{AdminOverview, HypervisorList, IpBlockList};
use crate::routes::AppState;
use crate::virtfusion::models::{Hypervisor, IpBlock};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/admin/overview", get(overview))
        .route("/api/admin/vf/hypervisors", get(hypervisors))
        .route("/api/admin/vf/ip-blocks", get(ip_blocks))
}

async fn cached_hypervisors(state: &AppState) -> Result<Vec<Hypervisor>, AppError> {
    let vf = state.vf.clone();
    Ok(state
        .cache
        .get_or_fetch(&keys::hypervisors(), state.stats_ttl_secs, || async move {
            vf.list_hypervisors().await
        })
        .await?)
}

async fn cached_ip_blocks(state: &AppState) -> Result<Vec<IpBlock>, AppError> {
    let vf = state.vf.clone();
    Ok(state
        .cache
        .get_or_fetch(&keys::ip_blocks(), state.stats_ttl_secs, || async move {
            vf.list_ip_blocks().await
        })
        .await?)
}

fn average(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 {
        0.0
    } else {
        (sum / n as f64 * 10.0).round() / 10.0
    }
}

async fn build_overview(state: &AppState) -> Result<AdminOverview, AppError> {
    let (servers, hvs, blocks) = tokio::try_join!(
        async { state.vf.list_servers(1, 1).await.map_err(AppError::from) },
        cached_hypervisors(state),
        cached_ip_blocks(state),
    )?;

    let customers: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users WHERE role = $1")
        .bind(ROLE_CUSTOMER)
        .fetch_one(&state.db)
        .await?;
    let open_tickets: (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM tickets WHERE status <> 'closed'")
            .fetch_one(&state.db)
            .await?;
    let balances: (i64,) =
        sqlx::query_as("SELECT COALESCE(SUM(balance_cents), 0)::BIGINT FROM wallets")
            .fetch_one(&state.db)
            .await?;
    let revenue: (i64,) = sqlx::query_as(
        r#"SELECT COALESCE(SUM(amount_cents), 0)::BIGINT FROM transactions
           WHERE kind IN ('topup', 'auto_topup') AND created_at >= now() - interval '30 days'"#,
    )
    .fetch_one(&state.db)
    .await?;

    Ok(AdminOverview {
        servers_total: servers.total,
        hypervisors_total: hvs.len(),
        hypervisors_enabled: hvs.iter().filter(|h| h.enabled).count(),
        hypervisors_maintenance: hvs.iter().filter(|h| h.maintenance).count(),
        avg_cpu_utilization: average(hvs.iter().map(|h| h.cpu_utilization)),
        avg_memory_utilization: average(hvs.iter().map(|h| h.memory_utilization)),
        ipv4_total: blocks.iter().map(|b| b.total).sum(),
        ipv4_free: blocks.iter().map(|b| b.free).sum(),
        customers: customers.0,
        open_tickets: open_tickets.0,
        wallet_balance_total_cents: balances.0,
        revenue_30d_cents: revenue.0,
    })
}

#[utoipa::path(
    get, path = "/api/admin/overview",
    tag = "Infrastructure",
    responses(
        (status = 200, body = AdminOverview),
        (status = 403, body = ErrorResponse),
        (status = 502, body = ErrorResponse),
    ),
    security(("bearer" = []))
)]
pub async fn overview(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<Json<AdminOverview>, AppError> {
    require_admin(&user)?;
    let data = state
        .cache
        .get_or_fetch(&keys::overview(), state.stats_ttl_secs, || build_overview(&state))
        .await?;
    Ok(Json(data))
}

#[utoipa::path(
    get, path = "/api/admin/vf/hypervisors",
    tag = "Infrastructure",
    responses(
        (status = 200, body = HypervisorList),
        (status = 502, body = ErrorResponse),
    ),
    security(("bearer" = []))
)]
pub async fn hypervisors(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<Json<HypervisorList>, AppError> {
    require_admin(&user)?;
    Ok(Json(HypervisorList {
        data: cached_hypervisors(&state).await?,
    }))
}

#[utoipa::path(
    get, path = "/api/admin/vf/ip-blocks",
    tag = "Infrastructure",
    responses(
        (status = 200, body = IpBlockList),
        (status = 502, body = ErrorResponse),
    ),
    security(("bearer" = []))
)]
pub async fn ip_blocks(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<Json<IpBlockList>, AppError> {
    require_admin(&user)?;
    Ok(Json(IpBlockList {
        data: cached_ip_blocks(&state).await?,
    }))
}
