use axum::{extract::State, http::StatusCode, routing::post, Extension, Json, Router};

use crate::auth::{create_token, hash_password, verify_password, CurrentUser, ROLE_CUSTOMER};
use crate::errors::{AppError, ErrorResponse};
use crate::models::{
    ChangePasswordRequest, LoginRequest, LoginResponse, RegisterRequest, User, UserResponse,
};
use crate::routes::audit_logs::{log_audit, AuditEvent};
use crate::routes::AppState;

pub const PASSWORD_MIN_LEN: usize = 8;

/// Public routes (no auth required)
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
}

/// Protected routes (auth required)
pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/api/auth/me", axum::routing::get(me))
        .route("/api/auth/change-password", post(change_password))
}

fn validate_credentials(email: &str, password: &str) -> Result<(), AppError> {
    let email = email.trim();
    let valid_email = email
        .split_once('@')
        .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
    if !valid_email {
        return Err(AppError::BadRequest("A valid email address is required".into()));
    }
    if password.chars().count() < PASSWORD_MIN_LEN {
        return Err(AppError::BadRequest(format!(
            "Password must be at least {PASSWORD_MIN_LEN} characters"
        )));
    }
    Ok(())
}

fn session_for(user: User, state: &AppState) -> Result<LoginResponse, AppError> {
    let token = create_token(
        user.id,
        &user.email,
        &user.role,
        &state.jwt_secret,
        state.jwt_expiry_hours,
    )?;
    Ok(LoginResponse {
        token,
        user: user.into(),
    })
}

#[utoipa::path(
    post, path = "/api/auth/register",
    tag = "Auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, body = LoginResponse),
        (status = 400, body = ErrorResponse),
        (status = 409, body = ErrorResponse),
    )
)]
pub async fn register(
    State(state): State<AppState>,
    Json(input): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<LoginResponse>), AppError> {
    validate_credentials(&input.email, &input.password)?;
    let email = input.email.trim().to_lowercase();
    let password_hash = hash_password(&input.password)?;

    let user = sqlx::query_as::<_, User>(
        "INSERT INTO users (email, password_hash, name, role) VALUES ($1, $2, $3, $4) RETURNING *",
    )
    .bind(&email)
    .bind(&password_hash)
    .bind(input.name.trim())
    .bind(ROLE_CUSTOMER)
    .fetch_one(&state.db)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(ref db_err) if db_err.constraint() == Some("users_email_key") => {
            AppError::Conflict(format!("Email '{email}' is already registered"))
        }
        _ => AppError::from(e),
    })?;

    tracing::info!(user_id = %user.id, "Registered new customer");
    Ok((StatusCode::CREATED, Json(session_for(user, &state)?)))
}

#[utoipa::path(
    post, path = "/api/auth/login",
    tag = "Auth",
    request_body = LoginRequest,
    responses(
        (status = 200, body = LoginResponse),
        (status = 401, body = ErrorResponse),
    )
)]
pub async fn login(
    State(state): State<AppState>,
    Json(input): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
        .bind(input.email.trim().to_lowercase())
        .fetch_optional(&state.db)
        .await?
        .ok_or(AppError::Unauthorized)?;

    if !verify_password(&input.password, &user.password_hash)? {
        return Err(AppError::Unauthorized);
    }

    let login_user = CurrentUser {
        id: user.id,
        email: user.email.clone(),
        role: user.role.clone(),
        is_api_key: false,
    };
    let user_id = user.id.to_string();
    log_audit(
        &state.db,
        &login_user,
        AuditEvent::new("login", "user", Some(&user_id)),
    )
    .await;

    Ok(Json(session_for(user, &state)?))
}

#[utoipa::path(
    get, path = "/api/auth/me",
    tag = "Auth",
    responses(
        (status = 200, body = UserResponse),
        (status = 401, body = ErrorResponse),
    ),
    security(("bearer" = []))
)]
pub async fn me(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> Result<Json<UserResponse>, AppError> {
    if current.is_api_key {
        let now = chrono::Utc::now();
        return Ok(Json(UserResponse {
            id: current.id,
            email: current.email.clone(),
            name: "API Key".to_string(),
            role: current.role.clone(),
            vf_user_id: None,
            force_password_change: false,
            created_at: now,
            updated_at: now,
        }));
    }

    let db_user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(current.id)
        .fetch_optional(&state.db)
        .await?
        .ok_or(AppError::Unauthorized)?;

    Ok(Json(db_user.into()))
}

#[utoipa::path(
    post, path = "/api/auth/change-password",
    tag = "Auth",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, body = UserResponse),
        (status = 400, body = ErrorResponse),
        (status = 401, body = ErrorResponse),
    ),
    security(("bearer" = []))
)]
pub async fn change_password(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Json(input): Json<ChangePasswordRequest>,
) -> Result<Json<UserResponse>, AppError> {
    if current.is_api_key {
        return Err(AppError::BadRequest("Cannot change password with API key auth".into()));
    }

    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(current.id)
        .fetch_optional(&state.db)
        .await?
        .ok_or(AppError::Unauthorized)?;

    if !verify_password(&input.current_password, &user.password_hash)? {
        return Err(AppError::BadRequest("Current password is incorrect".into()));
    }

    if input.new_password.chars().count() < PASSWORD_MIN_LEN {
        return Err(AppError::BadRequest(format!(
            "New password must be at least {PASSWORD_MIN_LEN} characters"
        )));
    }

    let new_hash = hash_password(&input.new_password)?;

    let updated = sqlx::query_as::<_, User>(
        "UPDATE users SET password_hash = $1, force_password_change = false, updated_at = now() WHERE id = $2 RETURNING *",
    )
    .bind(&new_hash)
    .bind(user.id)
    .fetch_one(&state.db)
    .await?;

    Ok(Json(updated.into()))
}
