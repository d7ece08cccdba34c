//! Wallet top-ups and auto-top-up settings.
//!
//! A top-up with a saved card is charged off-session right away. When the
//! card needs authentication, or no card was chosen, the customer is sent
//! to hosted checkout instead and the wallet is credited when the session
//! is confirmed (or its webhook arrives, whichever is first).

use axum::{
    extract::State,
    http::HeaderMap,
    routing::{get, post},
    Extension, Json, Router,
};
use uuid::Uuid;

use crate::auth::{require_account, CurrentUser};
use crate::db::Db;
use crate::errors::{AppError, ErrorResponse};
use crate::ledger::{self, Applied, Entry, EntryKind, LedgerError};
use crate::models::{
    AutoTopupSettings, ConfirmCheckoutRequest, ConfirmCheckoutResponse, TopupRequest,
    TopupResponse, UpdateAutoTopup, TOPUP_REQUIRES_CHECKOUT, TOPUP_SUCCEEDED,
};
use crate::payments::{ChargePurpose, ChargeRequest, PaymentError, PaymentRecord};
use crate::routes::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/billing/topup", post(topup))
        .route("/api/billing/checkout/confirm", post(confirm_checkout))
        .route("/api/billing/auto-topup", get(get_auto_topup).put(update_auto_topup))
}

/// The caller's processor customer id, created on first use.
pub(crate) async fn ensure_customer(state: &AppState, user: &CurrentUser) -> Result<String, AppError> {
    let wallet = ledger::wallet(&state.db, user.id).await?;
    if let Some(id) = wallet.stripe_customer_id {
        return Ok(id);
    }

    let created = state.payments.create_customer(user.id, &user.email).await?;
    // Another request may have won the race; keep whichever id landed first.
    let (stored,): (Option<String>,) = sqlx::query_as(
        r#"UPDATE wallets SET stripe_customer_id = COALESCE(stripe_customer_id, $2), updated_at = now()
           WHERE user_id = $1 RETURNING stripe_customer_id"#,
    )
    .bind(user.id)
    .bind(&created)
    .fetch_one(&state.db)
    .await?;
    stored.ok_or_else(|| AppError::Internal("Customer id was not stored".into()))
}

/// Credits a paid processor payment to its user's wallet. Safe to call more
/// than once for the same payment.
pub(crate) async fn credit_payment(db: &Db, record: &PaymentRecord) -> Result<Applied, LedgerError> {
    let kind = match record.purpose {
        ChargePurpose::Topup => EntryKind::Topup,
        ChargePurpose::AutoTopup => EntryKind::AutoTopup,
    };
    let description = match record.purpose {
        ChargePurpose::Topup => "Wallet top-up",
        ChargePurpose::AutoTopup => "Automatic top-up",
    };
    ledger::apply(
        db,
        Entry {
            user_id: record.user_id,
            kind,
            amount_cents: record.amount_cents,
            source_id: &record.id,
            description,
            metadata: serde_json::json!({ "customer_id": record.customer_id }),
        },
    )
    .await
}

fn checkout_urls(app_url: &str) -> (String, String) {
    (
        format!("{app_url}/billing?session_id={{CHECKOUT_SESSION_ID}}"),
        format!("{app_url}/billing?canceled=1"),
    )
}

fn idempotency_key(headers: &HeaderMap, user_id: Uuid, amount_cents: i64) -> String {
    headers
        .get("idempotency-key")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.trim().is_empty())
        .map(|v| format!("topup:{user_id}:{}", v.trim()))
        .unwrap_or_else(|| format!("topup:{user_id}:{amount_cents}:{}", Uuid::new_v4().simple()))
}

async fn start_checkout(
    state: &AppState,
    user: &CurrentUser,
    customer_id: &str,
    amount_cents: i64,
) -> Result<TopupResponse, AppError> {
    let (success_url, cancel_url) = checkout_urls(&state.app_url);
    let session = state
        .payments
        .create_checkout_session(customer_id, user.id, amount_cents, &success_url, &cancel_url)
        .await?;
    Ok(TopupResponse {
        status: TOPUP_REQUIRES_CHECKOUT.into(),
        balance_cents: None,
        checkout_url: Some(session.url),
        session_id: Some(session.id),
    })
}

#[utoipa::path(
    post, path = "/api/billing/topup",
    tag = "Billing",
    request_body = TopupRequest,
    responses(
        (status = 200, body = TopupResponse),
        (status = 400, body = ErrorResponse),
        (status = 402, body = ErrorResponse),
    ),
    security(("bearer" = []))
)]
pub async fn topup(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    headers: HeaderMap,
    Json(input): Json<TopupRequest>,
) -> Result<Json<TopupResponse>, AppError> {
    require_account(&user)?;
    halcyon::validation::validate_topup_amount(input.amount_cents)?;

    let customer_id = ensure_customer(&state, &user).await?;

    let Some(pm) = input
        .payment_method_id
        .as_deref()
        .map(str::trim)
        .filter(|pm| !pm.is_empty())
    else {
        return Ok(Json(start_checkout(&state, &user, &customer_id, input.amount_cents).await?));
    };

    if !state.payments.owns_payment_method(&customer_id, pm).await? {
        return Err(AppError::BadRequest("Unknown payment method".into()));
    }

    let key = idempotency_key(&headers, user.id, input.amount_cents);
    let charge = state
        .payments
        .charge_saved_card(ChargeRequest {
            customer_id: &customer_id,
            payment_method_id: pm,
            amount_cents: input.amount_cents,
            user_id: user.id,
            purpose: ChargePurpose::Topup,
            idempotency_key: &key,
        })
        .await;

    match charge {
        Ok(payment_id) => {
            let applied = credit_payment(
                &state.db,
                &PaymentRecord {
                    id: payment_id,
                    user_id: user.id,
                    amount_cents: input.amount_cents,
                    is_paid: true,
                    purpose: ChargePurpose::Topup,
                    customer_id: Some(customer_id),
                },
            )
            .await?;
            Ok(Json(TopupResponse {
                status: TOPUP_SUCCEEDED.into(),
                balance_cents: Some(applied.balance_cents()),
                checkout_url: None,
                session_id: None,
            }))
        }
        Err(PaymentError::RequiresAction { payment_id }) => {
            tracing::info!(
                user_id = %user.id,
                payment_id = payment_id.as_deref().unwrap_or("-"),
                "Card needs authentication, falling back to checkout"
            );
            Ok(Json(start_checkout(&state, &user, &customer_id, input.amount_cents).await?))
        }
        Err(e) => {
            tracing::warn!(user_id = %user.id, "Top-up charge failed: {e}");
            Err(e.into())
        }
    }
}

#[utoipa::path(
    post, path = "/api/billing/checkout/confirm",
    tag = "Billing",
    request_body = ConfirmCheckoutRequest,
    responses(
        (status = 200, body = ConfirmCheckoutResponse),
        (status = 402, body = ErrorResponse),
        (status = 404, body = ErrorResponse),
    ),
    security(("bearer" = []))
)]
pub async fn confirm_checkout(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(input): Json<ConfirmCheckoutRequest>,
) -> Result<Json<ConfirmCheckoutResponse>, AppError> {
    require_account(&user)?;

    let record = state.payments.get_checkout_session(input.session_id.trim()).await?;
    if record.user_id != user.id {
        return Err(AppError::NotFound);
    }
    if !record.is_paid {
        return Err(PaymentError::NotCompleted.into());
    }
    // Checkout only ever carries top-ups.
    halcyon::validation::validate_topup_amount(record.amount_cents)?;

    let applied = credit_payment(&state.db, &record).await?;
    Ok(Json(ConfirmCheckoutResponse {
        credited: applied.is_new(),
        balance_cents: applied.balance_cents(),
    }))
}

#[utoipa::path(
    get, path = "/api/billing/auto-topup",
    tag = "Billing",
    responses(
        (status = 200, body = AutoTopupSettings),
    ),
    security(("bearer" = []))
)]
pub async fn get_auto_topup(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<Json<AutoTopupSettings>, AppError> {
    require_account(&user)?;
    let wallet = ledger::wallet(&state.db, user.id).await?;
    Ok(Json(AutoTopupSettings::from(&wallet)))
}

#[utoipa::path(
    put, path = "/api/billing/auto-topup",
    tag = "Billing",
    request_body = UpdateAutoTopup,
    responses(
        (status = 200, body = AutoTopupSettings),
        (status = 400, body = ErrorResponse),
    ),
    security(("bearer" = []))
)]
pub async fn update_auto_topup(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Json(input): Json<UpdateAutoTopup>,
) -> Result<Json<AutoTopupSettings>, AppError> {
    require_account(&user)?;
    let pm = input
        .payment_method_id
        .as_deref()
        .map(str::trim)
        .filter(|pm| !pm.is_empty());
    halcyon::validation::validate_auto_topup(
        input.enabled,
        input.threshold_cents,
        input.amount_cents,
        pm,
    )?;

    let wallet = ledger::wallet(&state.db, user.id).await?;
    if let (Some(pm), Some(customer)) = (pm, wallet.stripe_customer_id.as_deref()) {
        if !state.payments.owns_payment_method(customer, pm).await? {
            return Err(AppError::BadRequest("Unknown payment method".into()));
        }
    }

    let updated = sqlx::query_as::<_, crate::models::Wallet>(
        r#"UPDATE wallets SET
            auto_topup_enabled = $2, auto_topup_threshold_cents = $3,
            auto_topup_amount_cents = $4, auto_topup_payment_method_id = $5,
            auto_topup_last_error = NULL, updated_at = now()
           WHERE user_id = $1
           RETURNING *"#,
    )
    .bind(user.id)
    .bind(input.enabled)
    .bind(input.threshold_cents)
    .bind(input.amount_cents)
    .bind(pm)
    .fetch_one(&state.db)
    .await?;

    tracing::info!(
        user_id = %user.id,
        enabled = updated.auto_topup_enabled,
        threshold_cents = updated.auto_topup_threshold_cents,
        amount_cents = updated.auto_topup_amount_cents,
        "Auto top-up settings updated"
    );

    Ok(Json(AutoTopupSettings::from(&updated)))
}
