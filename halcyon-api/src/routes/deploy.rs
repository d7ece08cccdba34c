//! Deploy wizard: catalog reads and server ordering.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use halcyon::{ServerAction, ValidatedAction};
use uuid::Uuid;

use crate::auth::{require_account, CurrentUser};
use crate::cache::keys;
use crate::errors::{AppError, ErrorResponse};
use crate::ledger::{self, Entry, EntryKind};
use crate::models::{DeployRequest, DeployResponse, Plan, PlanQuery, Region, TemplateQuery, User};
use crate::routes::audit_logs::{log_audit, AuditEvent};
use crate::routes::AppState;
use crate::virtfusion::models::OsTemplate;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/deploy/regions", get(regions))
        .route("/api/deploy/plans", get(plans))
        .route("/api/deploy/templates", get(templates))
        .route("/api/deploy", post(deploy))
}

#[utoipa::path(
    get, path = "/api/deploy/regions",
    tag = "Deploy",
    responses((status = 200, body = Vec<Region>)),
    security(("bearer" = []))
)]
pub async fn regions(State(state): State<AppState>) -> Result<Json<Vec<Region>>, AppError> {
    let rows = sqlx::query_as::<_, Region>("SELECT * FROM regions WHERE active ORDER BY name")
        .fetch_all(&state.db)
        .await?;
    Ok(Json(rows))
}

#[utoipa::path(
    get, path = "/api/deploy/plans",
    tag = "Deploy",
    params(PlanQuery),
    responses((status = 200, body = Vec<Plan>)),
    security(("bearer" = []))
)]
pub async fn plans(
    State(state): State<AppState>,
    Query(q): Query<PlanQuery>,
) -> Result<Json<Vec<Plan>>, AppError> {
    let rows = match q.region {
        Some(ref region) => {
            sqlx::query_as::<_, Plan>(
                "SELECT * FROM plans WHERE active AND region_id = $1 ORDER BY price_cents, name",
            )
            .bind(region)
            .fetch_all(&state.db)
            .await?
        }
        None => {
            sqlx::query_as::<_, Plan>("SELECT * FROM plans WHERE active ORDER BY price_cents, name")
                .fetch_all(&state.db)
                .await?
        }
    };
    Ok(Json(rows))
}

async fn active_plan(state: &AppState, plan_id: Uuid) -> Result<Plan, AppError> {
    sqlx::query_as::<_, Plan>("SELECT * FROM plans WHERE id = $1 AND active")
        .bind(plan_id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::BadRequest("Plan is not available".into()))
}

#[utoipa::path(
    get, path = "/api/deploy/templates",
    tag = "Deploy",
    params(TemplateQuery),
    responses(
        (status = 200, body = Vec<OsTemplate>),
        (status = 400, body = ErrorResponse),
    ),
    security(("bearer" = []))
)]
pub async fn templates(
    State(state): State<AppState>,
    Query(q): Query<TemplateQuery>,
) -> Result<Json<Vec<OsTemplate>>, AppError> {
    let plan = active_plan(&state, q.plan_id).await?;
    let vf = state.vf.clone();
    let package_id = plan.vf_package_id;
    let data = state
        .cache
        .get_or_fetch(&keys::templates(package_id), state.catalog_ttl_secs, || async move {
            vf.list_templates(package_id).await
        })
        .await?;
    Ok(Json(data))
}

/// The control-plane user linked to this account, found by ext relation id
/// or created on first deploy.
async fn ensure_vf_user(state: &AppState, user_id: Uuid) -> Result<u64, AppError> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(&state.db)
        .await?
        .ok_or(AppError::Unauthorized)?;

    if let Some(id) = user.vf_user_id {
        return Ok(id as u64);
    }

    let vf_user = match state.vf.find_user_by_ext(user.ext_id).await? {
        Some(u) => u,
        None => {
            let name = if user.name.trim().is_empty() { &user.email } else { &user.name };
            state.vf.create_user(name, &user.email, user.ext_id).await?
        }
    };

    sqlx::query("UPDATE users SET vf_user_id = $2, updated_at = now() WHERE id = $1")
        .bind(user.id)
        .bind(vf_user.id as i64)
        .execute(&state.db)
        .await?;
    tracing::info!(user_id = %user.id, vf_user_id = vf_user.id, "Linked control-plane user");
    Ok(vf_user.id)
}

/// Best-effort removal of a server created for an order that did not go
/// through.
async fn rollback_server(state: &AppState, server_id: u64, why: &str) {
    let action = match ValidatedAction::new(ServerAction::Delete, Some(why), None) {
        Ok(a) => a,
        Err(e) => {
            tracing::error!(server_id, "Cannot build rollback action: {e}");
            return;
        }
    };
    if let Err(e) = state.vf.perform(server_id, &action).await {
        tracing::error!(server_id, "Failed to remove server after aborted deploy: {e}");
    }
}

struct NewOrder<'a> {
    id: Uuid,
    user_id: Uuid,
    plan: &'a Plan,
    region_id: &'a str,
    hostname: &'a str,
    template_id: u64,
    server_id: u64,
}

/// Debits the wallet and records the order in one transaction; returns the
/// balance after the charge.
async fn charge_order(db: &crate::db::Db, order: &NewOrder<'_>) -> Result<i64, AppError> {
    let source_id = format!("order_{}", order.id);
    let description = format!("{} ({})", order.plan.name, order.hostname);

    let mut tx = db.begin().await?;
    let applied = ledger::apply_in(
        &mut tx,
        &Entry {
            user_id: order.user_id,
            kind: EntryKind::DeployCharge,
            amount_cents: -order.plan.price_cents,
            source_id: &source_id,
            description: &description,
            metadata: serde_json::json!({ "order_id": order.id, "server_id": order.server_id }),
        },
    )
    .await?;

    sqlx::query(
        r#"INSERT INTO orders (id, user_id, plan_id, region_id, hostname, template_id, vf_server_id, amount_cents)
           VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"#,
    )
    .bind(order.id)
    .bind(order.user_id)
    .bind(order.plan.id)
    .bind(order.region_id)
    .bind(order.hostname)
    .bind(order.template_id as i64)
    .bind(order.server_id as i64)
    .bind(order.plan.price_cents)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(applied.balance_cents())
}

#[utoipa::path(
    post, path = "/api/deploy",
    tag = "Deploy",
    request_body = DeployRequest,
    responses(
        (status = 201, body = DeployResponse),
        (status = 400, body = ErrorResponse),
        (status = 402, body = ErrorResponse),
        (status = 502, body = ErrorResponse),
    ),
    security(("bearer" = []))
)]
pub async fn deploy(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(input): Json<DeployRequest>,
) -> Result<(StatusCode, Json<DeployResponse>), AppError> {
    require_account(&user)?;
    let hostname = input.hostname;
    halcyon::validation::validate_hostname(&hostname)?;

    let plan = active_plan(&state, input.plan_id).await?;
    if plan.region_id != input.region {
        return Err(AppError::BadRequest("Plan is not offered in this region".into()));
    }
    let region = sqlx::query_as::<_, Region>("SELECT * FROM regions WHERE id = $1 AND active")
        .bind(&input.region)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::BadRequest("Region is not available".into()))?;

    let wallet = ledger::wallet(&state.db, user.id).await?;
    if wallet.balance_cents < plan.price_cents {
        return Err(AppError::PaymentRequired("Insufficient balance".into()));
    }

    let vf_user_id = ensure_vf_user(&state, user.id).await?;

    let server = state
        .vf
        .create_server(plan.vf_package_id, vf_user_id, region.vf_hypervisor_group_id)
        .await?;

    if let Err(e) = state
        .vf
        .build_server(server.id, input.template_id, &hostname, &input.ssh_key_ids)
        .await
    {
        rollback_server(&state, server.id, "Build request failed").await;
        return Err(e.into());
    }

    let order_id = Uuid::new_v4();
    let order = NewOrder {
        id: order_id,
        user_id: user.id,
        plan: &plan,
        region_id: &region.id,
        hostname: &hostname,
        template_id: input.template_id,
        server_id: server.id,
    };
    let balance_cents = match charge_order(&state.db, &order).await {
        Ok(balance) => balance,
        Err(e) => {
            rollback_server(&state, server.id, "Payment for order failed").await;
            return Err(e);
        }
    };

    state.cache.invalidate_prefix(keys::SERVERS_PREFIX).await;
    state.cache.invalidate_prefix(keys::STATS_PREFIX).await;

    let server_ref = server.id.to_string();
    log_audit(
        &state.db,
        &user,
        AuditEvent::new("deploy", "server", Some(&server_ref)).details(serde_json::json!({
            "order_id": order_id,
            "plan": plan.name,
            "region": region.id,
            "hostname": hostname,
        })),
    )
    .await;

    tracing::info!(user_id = %user.id, server_id = server.id, %order_id, "Server deployed");

    Ok((
        StatusCode::CREATED,
        Json(DeployResponse {
            order_id,
            server_id: server.id,
            balance_cents,
        }),
    ))
}
