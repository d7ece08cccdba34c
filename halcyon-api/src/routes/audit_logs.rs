use axum::{
    extract::{Query, State},
    routing::get,
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::auth::{require_admin, CurrentUser};
use crate::db::Db;
use crate::errors::{AppError, ErrorResponse};
use crate::models::{clamp_page, PaginatedResponse};
use crate::routes::AppState;

#[derive(Debug, Serialize, sqlx::FromRow, ToSchema)]
pub struct AuditLog {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub user_email: String,
    pub action: String,
    pub resource: String,
    pub resource_id: Option<String>,
    pub reason: Option<String>,
    #[schema(value_type = Object)]
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct AuditLogQuery {
    pub resource: Option<String>,
    pub resource_id: Option<String>,
    pub user_id: Option<Uuid>,
    pub action: Option<String>,
    pub since: Option<String>,
    pub until: Option<String>,
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_per_page")]
    pub per_page: i64,
}

fn default_page() -> i64 { 1 }
fn default_per_page() -> i64 { 50 }

#[derive(Serialize, ToSchema)]
pub struct PaginatedAuditLogResponse {
    pub data: Vec<AuditLog>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/api/admin/audit-logs", get(list))
}

/// What an audit entry is about.
pub struct AuditEvent<'a> {
    pub action: &'a str,
    pub resource: &'a str,
    pub resource_id: Option<&'a str>,
    pub reason: Option<&'a str>,
    pub details: serde_json::Value,
}

impl<'a> AuditEvent<'a> {
    pub fn new(action: &'a str, resource: &'a str, resource_id: Option<&'a str>) -> Self {
        Self {
            action,
            resource,
            resource_id,
            reason: None,
            details: serde_json::json!({}),
        }
    }

    pub fn reason(mut self, reason: Option<&'a str>) -> Self {
        self.reason = reason;
        self
    }

    pub fn details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }
}

/// Insert an audit log entry. Best-effort: failures are logged, not propagated.
pub async fn log_audit(db: &Db, user: &CurrentUser, event: AuditEvent<'_>) {
    let user_id = if user.id.is_nil() { None } else { Some(user.id) };
    let result = sqlx::query(
        "INSERT INTO audit_logs (user_id, user_email, action, resource, resource_id, reason, details) VALUES ($1, $2, $3, $4, $5, $6, $7)",
    )
    .bind(user_id)
    .bind(&user.email)
    .bind(event.action)
    .bind(event.resource)
    .bind(event.resource_id)
    .bind(event.reason)
    .bind(&event.details)
    .execute(db)
    .await;

    if let Err(e) = result {
        tracing::warn!(
            action = event.action,
            resource = event.resource,
            "Failed to write audit log: {e}"
        );
    }
}

#[utoipa::path(
    get, path = "/api/admin/audit-logs",
    tag = "Audit",
    params(AuditLogQuery),
    responses(
        (status = 200, body = PaginatedAuditLogResponse),
        (status = 403, body = ErrorResponse),
    ),
    security(("bearer" = []))
)]
pub async fn list(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Query(q): Query<AuditLogQuery>,
) -> Result<Json<PaginatedResponse<AuditLog>>, AppError> {
    require_admin(&user)?;

    let (page, per_page, offset) = clamp_page(q.page, q.per_page);

    let mut where_clause = String::from(" WHERE 1=1");
    let mut param_idx = 0u32;

    if q.resource.is_some() {
        param_idx += 1;
        where_clause.push_str(&format!(" AND resource = ${param_idx}"));
    }
    if q.resource_id.is_some() {
        param_idx += 1;
        where_clause.push_str(&format!(" AND resource_id = ${param_idx}"));
    }
    if q.user_id.is_some() {
        param_idx += 1;
        where_clause.push_str(&format!(" AND user_id = ${param_idx}"));
    }
    if q.action.is_some() {
        param_idx += 1;
        where_clause.push_str(&format!(" AND action = ${param_idx}"));
    }
    if q.since.is_some() {
        param_idx += 1;
        where_clause.push_str(&format!(" AND created_at >= ${param_idx}::timestamptz"));
    }
    if q.until.is_some() {
        param_idx += 1;
        where_clause.push_str(&format!(" AND created_at <= ${param_idx}::timestamptz"));
    }

    let count_sql = format!("SELECT COUNT(*) FROM audit_logs{where_clause}");
    let mut count_query = sqlx::query_as::<_, (i64,)>(&count_sql);
    if let Some(ref v) = q.resource { count_query = count_query.bind(v); }
    if let Some(ref v) = q.resource_id { count_query = count_query.bind(v); }
    if let Some(ref v) = q.user_id { count_query = count_query.bind(v); }
    if let Some(ref v) = q.action { count_query = count_query.bind(v); }
    if let Some(ref v) = q.since { count_query = count_query.bind(v); }
    if let Some(ref v) = q.until { count_query = count_query.bind(v); }

    let total = count_query.fetch_one(&state.db).await?.0;

    let limit_param = param_idx + 1;
    let offset_param = param_idx + 2;

    let data_sql = format!(
        "SELECT * FROM audit_logs{where_clause} ORDER BY created_at DESC LIMIT ${limit_param} OFFSET ${offset_param}"
    );
    let mut query = sqlx::query_as::<_, AuditLog>(&data_sql);
    if let Some(ref v) = q.resource { query = query.bind(v); }
    if let Some(ref v) = q.resource_id { query = query.bind(v); }
    if let Some(ref v) = q.user_id { query = query.bind(v); }
    if let Some(ref v) = q.action { query = query.bind(v); }
    if let Some(ref v) = q.since { query = query.bind(v); }
    if let Some(ref v) = q.until { query = query.bind(v); }
    query = query.bind(per_page).bind(offset);

    let rows = query.fetch_all(&state.db).await?;

    Ok(Json(PaginatedResponse {
        data: rows,
        total,
        page,
        per_page,
    }))
}
