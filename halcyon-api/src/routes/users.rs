use axum::{
    extract::{Path, Query, State},
    routing::{get, put},
    Extension, Json, Router,
};
use uuid::Uuid;

use crate::auth::{require_admin, CurrentUser, ROLE_ADMIN, ROLE_CUSTOMER};
use crate::errors::{AppError, ErrorResponse};
#[allow(unused_imports)]
use crate::models::PaginatedUserResponse;
use crate::models::{clamp_page, PaginatedResponse, UpdateUserRole, User, UserListQuery, UserResponse};
use crate::routes::audit_logs::{log_audit, AuditEvent};
use crate::routes::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/admin/users", get(list))
        .route("/api/admin/users/{id}", get(get_one))
        .route("/api/admin/users/{id}/role", put(set_role))
}

fn validate_role(role: &str) -> Result<(), AppError> {
    match role {
        ROLE_ADMIN | ROLE_CUSTOMER => Ok(()),
        _ => Err(AppError::BadRequest(format!(
            "role must be one of: {ROLE_ADMIN}, {ROLE_CUSTOMER}"
        ))),
    }
}

#[utoipa::path(
    get, path = "/api/admin/users",
    tag = "Users",
    params(UserListQuery),
    responses(
        (status = 200, body = PaginatedUserResponse),
        (status = 403, body = ErrorResponse),
    ),
    security(("bearer" = []))
)]
pub async fn list(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Query(q): Query<UserListQuery>,
) -> Result<Json<PaginatedResponse<UserResponse>>, AppError> {
    require_admin(&current)?;

    let (page, per_page, offset) = clamp_page(q.page, q.per_page);

    let mut where_clause = String::from(" WHERE 1=1");
    let mut param_idx = 0u32;
    if q.role.is_some() {
        param_idx += 1;
        where_clause.push_str(&format!(" AND role = ${param_idx}"));
    }
    let search = q.search.as_ref().map(|s| format!("%{}%", s.trim()));
    if search.is_some() {
        param_idx += 1;
        where_clause.push_str(&format!(" AND email ILIKE ${param_idx}"));
    }

    let count_sql = format!("SELECT COUNT(*) FROM users{where_clause}");
    let mut count_query = sqlx::query_as::<_, (i64,)>(&count_sql);
    if let Some(ref v) = q.role { count_query = count_query.bind(v); }
    if let Some(ref v) = search { count_query = count_query.bind(v); }
    let total = count_query.fetch_one(&state.db).await?.0;

    let data_sql = format!(
        "SELECT * FROM users{where_clause} ORDER BY created_at DESC LIMIT ${} OFFSET ${}",
        param_idx + 1,
        param_idx + 2
    );
    let mut query = sqlx::query_as::<_, User>(&data_sql);
    if let Some(ref v) = q.role { query = query.bind(v); }
    if let Some(ref v) = search { query = query.bind(v); }
    let rows = query.bind(per_page).bind(offset).fetch_all(&state.db).await?;

    Ok(Json(PaginatedResponse {
        data: rows.into_iter().map(UserResponse::from).collect(),
        total,
        page,
        per_page,
    }))
}

#[utoipa::path(
    get, path = "/api/admin/users/{id}",
    tag = "Users",
    params(("id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 200, body = UserResponse),
        (status = 404, body = ErrorResponse),
    ),
    security(("bearer" = []))
)]
pub async fn get_one(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<UserResponse>, AppError> {
    require_admin(&current)?;

    let row = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or(AppError::NotFound)?;

    Ok(Json(row.into()))
}

#[utoipa::path(
    put, path = "/api/admin/users/{id}/role",
    tag = "Users",
    params(("id" = Uuid, Path, description = "User ID")),
    request_body = UpdateUserRole,
    responses(
        (status = 200, body = UserResponse),
        (status = 400, body = ErrorResponse),
        (status = 404, body = ErrorResponse),
    ),
    security(("bearer" = []))
)]
pub async fn set_role(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateUserRole>,
) -> Result<Json<UserResponse>, AppError> {
    require_admin(&current)?;
    validate_role(&input.role)?;

    if current.id == id && input.role != ROLE_ADMIN {
        return Err(AppError::BadRequest("Cannot remove your own admin role".into()));
    }

    let row = sqlx::query_as::<_, User>(
        "UPDATE users SET role = $2, updated_at = now() WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .bind(&input.role)
    .fetch_optional(&state.db)
    .await?
    .ok_or(AppError::NotFound)?;

    let user_id = id.to_string();
    log_audit(
        &state.db,
        &current,
        AuditEvent::new("set_role", "user", Some(&user_id))
            .details(serde_json::json!({"email": row.email, "role": row.role})),
    )
    .await;

    Ok(Json(row.into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_role() {
        assert!(validate_role("admin").is_ok());
        assert!(validate_role("customer").is_ok());
        assert!(validate_role("operator").is_err());
    }
}
