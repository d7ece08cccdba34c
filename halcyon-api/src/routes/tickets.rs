use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Extension, Json, Router,
};
use halcyon::tickets::{
    validate_body, validate_subject, TicketCategory, TicketPriority, TicketStatus,
};
use uuid::Uuid;

use crate::auth::{require_account, CurrentUser};
use crate::errors::{AppError, ErrorResponse};
#[allow(unused_imports)]
use crate::models::PaginatedTicketResponse;
use crate::models::{
    clamp_page, CreateTicket, CreateTicketMessage, PaginatedResponse, Ticket, TicketListQuery,
    TicketMessage, UpdateTicket,
};
use crate::routes::audit_logs::{log_audit, AuditEvent};
use crate::routes::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/support/tickets", get(list).post(create))
        .route("/api/support/tickets/{id}", get(get_one).patch(update))
        .route(
            "/api/support/tickets/{id}/messages",
            get(list_messages).post(add_message),
        )
}

/// Loads a ticket the caller may see. Customers get 404 for tickets that
/// are not theirs.
async fn visible_ticket(state: &AppState, user: &CurrentUser, id: Uuid) -> Result<Ticket, AppError> {
    let ticket = sqlx::query_as::<_, Ticket>("SELECT * FROM tickets WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or(AppError::NotFound)?;
    if !user.is_admin() && ticket.user_id != user.id {
        return Err(AppError::NotFound);
    }
    Ok(ticket)
}

#[utoipa::path(
    get,
    path = "/api/support/tickets",
    tag = "Tickets",
    params(TicketListQuery),
    responses(
        (status = 200, body = PaginatedTicketResponse),
    ),
    security(("bearer" = []))
)]
pub async fn list(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Query(q): Query<TicketListQuery>,
) -> Result<Json<PaginatedResponse<Ticket>>, AppError> {
    if let Some(ref v) = q.status { v.parse::<TicketStatus>()?; }
    if let Some(ref v) = q.priority { v.parse::<TicketPriority>()?; }
    if let Some(ref v) = q.category { v.parse::<TicketCategory>()?; }

    let (page, per_page, offset) = clamp_page(q.page, q.per_page);
    let owner = if user.is_admin() { None } else { Some(user.id) };

    let mut where_clause = String::from(" WHERE 1=1");
    let mut param_idx = 0u32;

    if owner.is_some() {
        param_idx += 1;
        where_clause.push_str(&format!(" AND user_id = ${param_idx}"));
    }
    if q.status.is_some() {
        param_idx += 1;
        where_clause.push_str(&format!(" AND status = ${param_idx}"));
    }
    if q.priority.is_some() {
        param_idx += 1;
        where_clause.push_str(&format!(" AND priority = ${param_idx}"));
    }
    if q.category.is_some() {
        param_idx += 1;
        where_clause.push_str(&format!(" AND category = ${param_idx}"));
    }

    let count_sql = format!("SELECT COUNT(*) FROM tickets{where_clause}");
    let mut count_query = sqlx::query_as::<_, (i64,)>(&count_sql);
    if let Some(v) = owner { count_query = count_query.bind(v); }
    if let Some(ref v) = q.status { count_query = count_query.bind(v); }
    if let Some(ref v) = q.priority { count_query = count_query.bind(v); }
    if let Some(ref v) = q.category { count_query = count_query.bind(v); }
    let total = count_query.fetch_one(&state.db).await?.0;

    let data_sql = format!(
        "SELECT * FROM tickets{where_clause} ORDER BY updated_at DESC LIMIT ${} OFFSET ${}",
        param_idx + 1,
        param_idx + 2
    );
    let mut query = sqlx::query_as::<_, Ticket>(&data_sql);
    if let Some(v) = owner { query = query.bind(v); }
    if let Some(ref v) = q.status { query = query.bind(v); }
    if let Some(ref v) = q.priority { query = query.bind(v); }
    if let Some(ref v) = q.category { query = query.bind(v); }
    let rows = query.bind(per_page).bind(offset).fetch_all(&state.db).await?;

    Ok(Json(PaginatedResponse {
        data: rows,
        total,
        page,
        per_page,
    }))
}

#[utoipa::path(
    post,
    path = "/api/support/tickets",
    tag = "Tickets",
    request_body = CreateTicket,
    responses(
        (status = 201, body = Ticket),
        (status = 400, body = ErrorResponse),
    ),
    security(("bearer" = []))
)]
pub async fn create(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(input): Json<CreateTicket>,
) -> Result<(StatusCode, Json<Ticket>), AppError> {
    require_account(&user)?;
    let subject = input.subject.trim();
    let body = input.body.trim();
    validate_subject(subject)?;
    validate_body(body)?;
    let priority: TicketPriority = input.priority.parse()?;
    let category: TicketCategory = input.category.parse()?;

    let mut tx = state.db.begin().await?;
    let ticket = sqlx::query_as::<_, Ticket>(
        r#"INSERT INTO tickets (user_id, subject, status, priority, category, server_id)
           VALUES ($1, $2, $3, $4, $5, $6)
           RETURNING *"#,
    )
    .bind(user.id)
    .bind(subject)
    .bind(TicketStatus::Open.as_str())
    .bind(priority.as_str())
    .bind(category.as_str())
    .bind(input.server_id)
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query(
        "INSERT INTO ticket_messages (ticket_id, user_id, user_email, is_staff, body) VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(ticket.id)
    .bind(user.id)
    .bind(&user.email)
    .bind(user.is_admin())
    .bind(body)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;

    tracing::info!(ticket_id = %ticket.id, user_id = %user.id, category = %category, "Ticket opened");
    Ok((StatusCode::CREATED, Json(ticket)))
}

#[utoipa::path(
    get,
    path = "/api/support/tickets/{id}",
    tag = "Tickets",
    params(("id" = Uuid, Path, description = "Ticket ID")),
    responses(
        (status = 200, body = Ticket),
        (status = 404),
    ),
    security(("bearer" = []))
)]
pub async fn get_one(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<Ticket>, AppError> {
    Ok(Json(visible_ticket(&state, &user, id).await?))
}

#[utoipa::path(
    patch,
    path = "/api/support/tickets/{id}",
    tag = "Tickets",
    params(("id" = Uuid, Path, description = "Ticket ID")),
    request_body = UpdateTicket,
    responses(
        (status = 200, body = Ticket),
        (status = 403, body = ErrorResponse),
        (status = 404),
    ),
    security(("bearer" = []))
)]
pub async fn update(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateTicket>,
) -> Result<Json<Ticket>, AppError> {
    let existing = visible_ticket(&state, &user, id).await?;

    let status = input.status.as_deref().map(str::parse::<TicketStatus>).transpose()?;
    let priority = input.priority.as_deref().map(str::parse::<TicketPriority>).transpose()?;

    if !user.is_admin() {
        if priority.is_some() {
            return Err(AppError::Forbidden("Only staff can change ticket priority".into()));
        }
        if status.is_some_and(|s| s != TicketStatus::Closed) {
            return Err(AppError::Forbidden("Customers can only close tickets".into()));
        }
    }

    let row = sqlx::query_as::<_, Ticket>(
        "UPDATE tickets SET status = $2, priority = $3, updated_at = now() WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .bind(status.map(|s| s.as_str().to_string()).unwrap_or(existing.status))
    .bind(priority.map(|p| p.as_str().to_string()).unwrap_or(existing.priority))
    .fetch_one(&state.db)
    .await?;

    if user.is_admin() {
        let ticket_id = id.to_string();
        log_audit(
            &state.db,
            &user,
            AuditEvent::new("update", "ticket", Some(&ticket_id))
                .details(serde_json::json!({"status": row.status, "priority": row.priority})),
        )
        .await;
    }

    Ok(Json(row))
}

#[utoipa::path(
    get,
    path = "/api/support/tickets/{id}/messages",
    tag = "Tickets",
    params(("id" = Uuid, Path, description = "Ticket ID")),
    responses(
        (status = 200, body = Vec<TicketMessage>),
        (status = 404),
    ),
    security(("bearer" = []))
)]
pub async fn list_messages(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<TicketMessage>>, AppError> {
    visible_ticket(&state, &user, id).await?;

    let rows = sqlx::query_as::<_, TicketMessage>(
        "SELECT * FROM ticket_messages WHERE ticket_id = $1 ORDER BY created_at ASC",
    )
    .bind(id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(rows))
}

#[utoipa::path(
    post,
    path = "/api/support/tickets/{id}/messages",
    tag = "Tickets",
    params(("id" = Uuid, Path, description = "Ticket ID")),
    request_body = CreateTicketMessage,
    responses(
        (status = 201, body = TicketMessage),
        (status = 404),
        (status = 409, body = ErrorResponse),
    ),
    security(("bearer" = []))
)]
pub async fn add_message(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    Json(input): Json<CreateTicketMessage>,
) -> Result<(StatusCode, Json<TicketMessage>), AppError> {
    let ticket = visible_ticket(&state, &user, id).await?;
    let body = input.body.trim();
    validate_body(body)?;

    let staff = user.is_admin();
    let current: TicketStatus = ticket.status.parse()?;
    if current == TicketStatus::Closed && !staff {
        return Err(AppError::Conflict(
            "This ticket is closed; open a new ticket instead".into(),
        ));
    }
    let next = current.after_reply(staff);

    let author = if user.id.is_nil() { None } else { Some(user.id) };

    let mut tx = state.db.begin().await?;
    let row = sqlx::query_as::<_, TicketMessage>(
        r#"INSERT INTO ticket_messages (ticket_id, user_id, user_email, is_staff, body)
           VALUES ($1, $2, $3, $4, $5)
           RETURNING *"#,
    )
    .bind(id)
    .bind(author)
    .bind(&user.email)
    .bind(staff)
    .bind(body)
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query("UPDATE tickets SET status = $2, updated_at = now() WHERE id = $1")
        .bind(id)
        .bind(next.as_str())
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    if staff {
        let ticket_id = id.to_string();
        log_audit(
            &state.db,
            &user,
            AuditEvent::new("reply", "ticket", Some(&ticket_id))
                .details(serde_json::json!({"message_id": row.id.to_string()})),
        )
        .await;
    }

    Ok((StatusCode::CREATED, Json(row)))
}
