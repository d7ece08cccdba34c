//! Admin server management: listings from the control plane and the
//! start/stop/restart/suspend/unsuspend/transfer/delete dialog.

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Extension, Json, Router,
};
use halcyon::{ServerAction, ValidatedAction};

use crate::auth::{require_admin, CurrentUser};
use crate::cache::keys;
use crate::errors::{AppError, ErrorResponse};
use crate::models::{PageQuery, ServerActionRequest, ServerActionResponse};
use crate::routes::audit_logs::{log_audit, AuditEvent};
use crate::routes::AppState;
use crate::virtfusion::models::{Server, ServerPage};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/admin/vf/servers", get(list))
        .route("/api/admin/vf/servers/{id}", get(get_one).delete(delete))
        .route("/api/admin/vf/servers/{id}/power/{action}", post(power))
        .route("/api/admin/vf/servers/{id}/suspend", post(suspend))
        .route("/api/admin/vf/servers/{id}/unsuspend", post(unsuspend))
        .route("/api/admin/vf/servers/{id}/transfer", post(transfer))
}

#[utoipa::path(
    get, path = "/api/admin/vf/servers",
    tag = "Admin Servers",
    params(PageQuery),
    responses(
        (status = 200, body = ServerPage),
        (status = 502, body = ErrorResponse),
    ),
    security(("bearer" = []))
)]
pub async fn list(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Query(q): Query<PageQuery>,
) -> Result<Json<ServerPage>, AppError> {
    require_admin(&user)?;
    let (page, per_page, _) = q.clamped();

    let vf = state.vf.clone();
    let result = state
        .cache
        .get_or_fetch(&keys::servers_page(page, per_page), state.stats_ttl_secs, || async move {
            vf.list_servers(page, per_page).await
        })
        .await?;
    Ok(Json(result))
}

#[utoipa::path(
    get, path = "/api/admin/vf/servers/{id}",
    tag = "Admin Servers",
    params(("id" = u64, Path, description = "VirtFusion server ID")),
    responses(
        (status = 200, body = Server),
        (status = 404, body = ErrorResponse),
    ),
    security(("bearer" = []))
)]
pub async fn get_one(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<u64>,
) -> Result<Json<Server>, AppError> {
    require_admin(&user)?;

    let vf = state.vf.clone();
    let server = state
        .cache
        .get_or_fetch(&keys::server(id), state.stats_ttl_secs, || async move {
            vf.get_server(id).await
        })
        .await?;
    Ok(Json(server))
}

/// Validates the dialog input, performs the action on the control plane,
/// then drops stale cache entries and records the reason in the audit log.
async fn run_action(
    state: &AppState,
    user: &CurrentUser,
    server_id: u64,
    action: ServerAction,
    input: ServerActionRequest,
) -> Result<Json<ServerActionResponse>, AppError> {
    require_admin(user)?;

    let validated = ValidatedAction::new(action, input.reason.as_deref(), input.new_owner_id)?;

    if let Err(e) = state.vf.perform(server_id, &validated).await {
        tracing::warn!(server_id, action = %action, user = %user.email, "Server action failed: {e}");
        return Err(e.into());
    }

    state.cache.invalidate_server(server_id).await;

    let resource_id = server_id.to_string();
    log_audit(
        &state.db,
        user,
        AuditEvent::new(action.as_str(), "server", Some(&resource_id))
            .reason(validated.reason.as_deref())
            .details(serde_json::json!({ "new_owner_id": validated.new_owner_id })),
    )
    .await;

    tracing::info!(server_id, action = %action, user = %user.email, "Server action completed");

    Ok(Json(ServerActionResponse {
        ok: true,
        action: action.as_str().to_string(),
        server_id,
    }))
}

fn body(input: Option<Json<ServerActionRequest>>) -> ServerActionRequest {
    input.map(|Json(b)| b).unwrap_or_default()
}

#[utoipa::path(
    post, path = "/api/admin/vf/servers/{id}/power/{action}",
    tag = "Admin Servers",
    params(
        ("id" = u64, Path, description = "VirtFusion server ID"),
        ("action" = String, Path, description = "start, stop or restart"),
    ),
    request_body = ServerActionRequest,
    responses(
        (status = 200, body = ServerActionResponse),
        (status = 400, body = ErrorResponse),
        (status = 502, body = ErrorResponse),
    ),
    security(("bearer" = []))
)]
pub async fn power(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path((id, action)): Path<(u64, String)>,
    input: Option<Json<ServerActionRequest>>,
) -> Result<Json<ServerActionResponse>, AppError> {
    let action: ServerAction = action.parse()?;
    if !action.is_power() {
        return Err(AppError::BadRequest(format!(
            "'{action}' is not a power action"
        )));
    }
    run_action(&state, &user, id, action, body(input)).await
}

#[utoipa::path(
    post, path = "/api/admin/vf/servers/{id}/suspend",
    tag = "Admin Servers",
    params(("id" = u64, Path, description = "VirtFusion server ID")),
    request_body = ServerActionRequest,
    responses(
        (status = 200, body = ServerActionResponse),
        (status = 400, body = ErrorResponse),
        (status = 502, body = ErrorResponse),
    ),
    security(("bearer" = []))
)]
pub async fn suspend(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<u64>,
    input: Option<Json<ServerActionRequest>>,
) -> Result<Json<ServerActionResponse>, AppError> {
    run_action(&state, &user, id, ServerAction::Suspend, body(input)).await
}

#[utoipa::path(
    post, path = "/api/admin/vf/servers/{id}/unsuspend",
    tag = "Admin Servers",
    params(("id" = u64, Path, description = "VirtFusion server ID")),
    request_body = ServerActionRequest,
    responses(
        (status = 200, body = ServerActionResponse),
        (status = 400, body = ErrorResponse),
        (status = 502, body = ErrorResponse),
    ),
    security(("bearer" = []))
)]
pub async fn unsuspend(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<u64>,
    input: Option<Json<ServerActionRequest>>,
) -> Result<Json<ServerActionResponse>, AppError> {
    run_action(&state, &user, id, ServerAction::Unsuspend, body(input)).await
}

#[utoipa::path(
    post, path = "/api/admin/vf/servers/{id}/transfer",
    tag = "Admin Servers",
    params(("id" = u64, Path, description = "VirtFusion server ID")),
    request_body = ServerActionRequest,
    responses(
        (status = 200, body = ServerActionResponse),
        (status = 400, body = ErrorResponse),
        (status = 502, body = ErrorResponse),
    ),
    security(("bearer" = []))
)]
pub async fn transfer(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<u64>,
    input: Option<Json<ServerActionRequest>>,
) -> Result<Json<ServerActionResponse>, AppError> {
    run_action(&state, &user, id, ServerAction::Transfer, body(input)).await
}

#[utoipa::path(
    delete, path = "/api/admin/vf/servers/{id}",
    tag = "Admin Servers",
    params(("id" = u64, Path, description = "VirtFusion server ID")),
    request_body = ServerActionRequest,
    responses(
        (status = 200, body = ServerActionResponse),
        (status = 400, body = ErrorResponse),
        (status = 502, body = ErrorResponse),
    ),
    security(("bearer" = []))
)]
pub async fn delete(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<u64>,
    input: Option<Json<ServerActionRequest>>,
) -> Result<Json<ServerActionResponse>, AppError> {
    run_action(&state, &user, id, ServerAction::Delete, body(input)).await
}
