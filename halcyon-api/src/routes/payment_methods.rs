use axum::{
    extract::{Path, State},
    routing::{delete, get, post},
    Extension, Json, Router,
};

use crate::auth::{require_account, CurrentUser};
use crate::errors::{AppError, ErrorResponse};
use crate::ledger;
use crate::models::{PaymentMethodList, SetupIntentResponse};
use crate::routes::billing::ensure_customer;
use crate::routes::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/payment-methods", get(list))
        .route("/api/payment-methods/setup-intent", post(setup_intent))
        .route("/api/payment-methods/{id}/default", post(set_default))
        .route("/api/payment-methods/{id}", delete(remove))
}

/// The caller's customer id, if the method belongs to it; 404 otherwise.
async fn owning_customer(state: &AppState, user: &CurrentUser, pm: &str) -> Result<String, AppError> {
    let wallet = ledger::wallet(&state.db, user.id).await?;
    let customer = wallet.stripe_customer_id.ok_or(AppError::NotFound)?;
    if !state.payments.owns_payment_method(&customer, pm).await? {
        return Err(AppError::NotFound);
    }
    Ok(customer)
}

#[utoipa::path(
    get, path = "/api/payment-methods",
    tag = "Payment Methods",
    responses(
        (status = 200, body = PaymentMethodList),
        (status = 502, body = ErrorResponse),
    ),
    security(("bearer" = []))
)]
pub async fn list(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<Json<PaymentMethodList>, AppError> {
    require_account(&user)?;
    let wallet = ledger::wallet(&state.db, user.id).await?;
    let data = match wallet.stripe_customer_id {
        Some(customer) => state.payments.list_payment_methods(&customer).await?,
        None => vec![],
    };
    Ok(Json(PaymentMethodList { data }))
}

#[utoipa::path(
    post, path = "/api/payment-methods/setup-intent",
    tag = "Payment Methods",
    responses(
        (status = 200, body = SetupIntentResponse),
        (status = 502, body = ErrorResponse),
    ),
    security(("bearer" = []))
)]
pub async fn setup_intent(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<Json<SetupIntentResponse>, AppError> {
    require_account(&user)?;
    let customer = ensure_customer(&state, &user).await?;
    let client_secret = state.payments.create_setup_intent(&customer).await?;
    Ok(Json(SetupIntentResponse { client_secret }))
}

#[utoipa::path(
    post, path = "/api/payment-methods/{id}/default",
    tag = "Payment Methods",
    params(("id" = String, Path, description = "Payment method ID")),
    responses(
        (status = 200, description = "Default payment method updated"),
        (status = 404, body = ErrorResponse),
    ),
    security(("bearer" = []))
)]
pub async fn set_default(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    require_account(&user)?;
    let customer = owning_customer(&state, &user, &id).await?;
    state.payments.set_default_payment_method(&customer, &id).await?;
    Ok(Json(serde_json::json!({ "default": id })))
}

#[utoipa::path(
    delete, path = "/api/payment-methods/{id}",
    tag = "Payment Methods",
    params(("id" = String, Path, description = "Payment method ID")),
    responses(
        (status = 200, description = "Payment method removed"),
        (status = 404, body = ErrorResponse),
    ),
    security(("bearer" = []))
)]
pub async fn remove(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    require_account(&user)?;
    owning_customer(&state, &user, &id).await?;
    state.payments.detach_payment_method(&id).await?;

    let unbound = sqlx::query(
        r#"UPDATE wallets SET auto_topup_enabled = false, auto_topup_payment_method_id = NULL, updated_at = now()
           WHERE user_id = $1 AND auto_topup_payment_method_id = $2"#,
    )
    .bind(user.id)
    .bind(&id)
    .execute(&state.db)
    .await?;

    if unbound.rows_affected() > 0 {
        tracing::info!(user_id = %user.id, "Auto top-up disabled after its card was removed");
    }

    Ok(Json(serde_json::json!({
        "deleted": true,
        "auto_topup_disabled": unbound.rows_affected() > 0,
    })))
}
