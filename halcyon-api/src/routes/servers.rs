//! Customer view of their own servers. Ownership is the control plane's
//! owner id compared with the account's linked VirtFusion user.

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Extension, Json, Router,
};
use halcyon::{ServerAction, ValidatedAction};
use uuid::Uuid;

use crate::auth::{require_account, CurrentUser};
use crate::cache::keys;
use crate::db::Db;
use crate::errors::{AppError, ErrorResponse};
use crate::models::{ServerActionResponse, ServerList};
use crate::routes::audit_logs::{log_audit, AuditEvent};
use crate::routes::AppState;
use crate::virtfusion::models::Server;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/servers", get(list))
        .route("/api/servers/{id}", get(get_one))
        .route("/api/servers/{id}/power/{action}", post(power))
}

pub(crate) async fn linked_vf_user(db: &Db, user_id: Uuid) -> Result<Option<u64>, AppError> {
    let row: Option<(Option<i64>,)> = sqlx::query_as("SELECT vf_user_id FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(db)
        .await?;
    Ok(row.and_then(|(id,)| id).map(|id| id as u64))
}

/// The server if the caller owns it; 404 otherwise so ids of other
/// customers' servers are not disclosed.
async fn owned_server(state: &AppState, user: &CurrentUser, server_id: u64) -> Result<Server, AppError> {
    let owner = linked_vf_user(&state.db, user.id)
        .await?
        .ok_or(AppError::NotFound)?;
    let vf = state.vf.clone();
    let server = state
        .cache
        .get_or_fetch(&keys::server(server_id), state.stats_ttl_secs, || async move {
            vf.get_server(server_id).await
        })
        .await?;
    if server.owner_id != Some(owner) {
        return Err(AppError::NotFound);
    }
    Ok(server)
}

#[utoipa::path(
    get, path = "/api/servers",
    tag = "Servers",
    responses(
        (status = 200, body = ServerList),
        (status = 502, body = ErrorResponse),
    ),
    security(("bearer" = []))
)]
pub async fn list(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<Json<ServerList>, AppError> {
    require_account(&user)?;
    let Some(owner) = linked_vf_user(&state.db, user.id).await? else {
        return Ok(Json(ServerList { data: vec![] }));
    };

    let vf = state.vf.clone();
    let data = state
        .cache
        .get_or_fetch(&keys::user_servers(owner), state.stats_ttl_secs, || async move {
            match vf.list_user_servers(owner).await {
                Err(crate::virtfusion::VfError::NotFound) => Ok(vec![]),
                other => other,
            }
        })
        .await?;
    Ok(Json(ServerList { data }))
}

#[utoipa::path(
    get, path = "/api/servers/{id}",
    tag = "Servers",
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
    require_account(&user)?;
    Ok(Json(owned_server(&state, &user, id).await?))
}

#[utoipa::path(
    post, path = "/api/servers/{id}/power/{action}",
    tag = "Servers",
    params(
        ("id" = u64, Path, description = "VirtFusion server ID"),
        ("action" = String, Path, description = "start, stop or restart"),
    ),
    responses(
        (status = 200, body = ServerActionResponse),
        (status = 400, body = ErrorResponse),
        (status = 404, body = ErrorResponse),
        (status = 502, body = ErrorResponse),
    ),
    security(("bearer" = []))
)]
pub async fn power(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path((id, action)): Path<(u64, String)>,
) -> Result<Json<ServerActionResponse>, AppError> {
    require_account(&user)?;
    let action: ServerAction = action.parse()?;
    if !action.is_power() {
        return Err(AppError::Forbidden(format!(
            "'{action}' is only available to administrators"
        )));
    }

    owned_server(&state, &user, id).await?;

    let validated = ValidatedAction::new(action, None, None)?;
    state.vf.perform(id, &validated).await?;
    state.cache.invalidate_server(id).await;

    let resource_id = id.to_string();
    log_audit(
        &state.db,
        &user,
        AuditEvent::new(action.as_str(), "server", Some(&resource_id)),
    )
    .await;

    Ok(Json(ServerActionResponse {
        ok: true,
        action: action.as_str().to_string(),
        server_id: id,
    }))
}
