use axum::{
    extract::{Query, State},
    http::header,
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use utoipa::IntoParams;
use uuid::Uuid;

use crate::auth::{require_account, require_admin, CurrentUser};
use crate::errors::{AppError, ErrorResponse};
use crate::ledger::{self, Entry, EntryKind, LedgerError};
#[allow(unused_imports)]
use crate::models::PaginatedTransactionResponse;
use crate::models::{
    clamp_page, AdjustBalanceRequest, PaginatedResponse, Transaction, TransactionListQuery,
    WalletResponse,
};
use crate::routes::audit_logs::{log_audit, AuditEvent};
use crate::routes::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/wallet", get(get_wallet))
        .route("/api/wallet/transactions", get(transactions))
        .route("/api/wallet/transactions/export", get(export))
        .route("/api/admin/wallet/adjust", post(adjust))
}

/// Whose ledger a request reads: admins may name any user, everyone else
/// reads their own.
fn ledger_owner(user: &CurrentUser, requested: Option<Uuid>) -> Result<Uuid, AppError> {
    match requested {
        Some(id) if id != user.id => {
            require_admin(user)?;
            Ok(id)
        }
        _ => {
            require_account(user)?;
            Ok(user.id)
        }
    }
}

#[utoipa::path(
    get, path = "/api/wallet",
    tag = "Wallet",
    responses(
        (status = 200, body = WalletResponse),
    ),
    security(("bearer" = []))
)]
pub async fn get_wallet(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> Result<Json<WalletResponse>, AppError> {
    require_account(&user)?;
    let wallet = ledger::wallet(&state.db, user.id).await?;
    Ok(Json(WalletResponse::from(&wallet)))
}

#[utoipa::path(
    get, path = "/api/wallet/transactions",
    tag = "Wallet",
    params(TransactionListQuery),
    responses(
        (status = 200, body = PaginatedTransactionResponse),
        (status = 400, body = ErrorResponse),
    ),
    security(("bearer" = []))
)]
pub async fn transactions(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Query(q): Query<TransactionListQuery>,
) -> Result<Json<PaginatedResponse<Transaction>>, AppError> {
    let owner = ledger_owner(&user, q.user_id)?;
    if let Some(ref kind) = q.kind {
        if EntryKind::parse(kind).is_none() {
            return Err(AppError::BadRequest(format!("Unknown transaction kind '{kind}'")));
        }
    }

    let (page, per_page, offset) = clamp_page(q.page, q.per_page);

    let (total, rows) = if let Some(ref kind) = q.kind {
        let total: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM transactions WHERE user_id = $1 AND kind = $2")
                .bind(owner)
                .bind(kind)
                .fetch_one(&state.db)
                .await?;
        let rows = sqlx::query_as::<_, Transaction>(
            "SELECT * FROM transactions WHERE user_id = $1 AND kind = $2 ORDER BY created_at DESC, id DESC LIMIT $3 OFFSET $4",
        )
        .bind(owner)
        .bind(kind)
        .bind(per_page)
        .bind(offset)
        .fetch_all(&state.db)
        .await?;
        (total.0, rows)
    } else {
        let total: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM transactions WHERE user_id = $1")
            .bind(owner)
            .fetch_one(&state.db)
            .await?;
        let rows = sqlx::query_as::<_, Transaction>(
            "SELECT * FROM transactions WHERE user_id = $1 ORDER BY created_at DESC, id DESC LIMIT $2 OFFSET $3",
        )
        .bind(owner)
        .bind(per_page)
        .bind(offset)
        .fetch_all(&state.db)
        .await?;
        (total.0, rows)
    };

    Ok(Json(PaginatedResponse {
        data: rows,
        total,
        page,
        per_page,
    }))
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ExportQuery {
    #[serde(default = "default_format")]
    pub format: String,
    pub user_id: Option<Uuid>,
}

fn default_format() -> String { "csv".into() }

#[derive(Debug, Serialize)]
struct TransactionCsvRow {
    date: String,
    kind: String,
    amount: String,
    balance_after: String,
    description: String,
    reference: String,
}

impl From<&Transaction> for TransactionCsvRow {
    fn from(t: &Transaction) -> Self {
        Self {
            date: t.created_at.to_rfc3339(),
            kind: t.kind.clone(),
            amount: halcyon::money::format_cents(t.amount_cents),
            balance_after: halcyon::money::format_cents(t.balance_after_cents),
            description: t.description.clone(),
            reference: t.source_id.clone(),
        }
    }
}

fn to_csv(rows: &[Transaction]) -> Result<Vec<u8>, AppError> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    for r in rows {
        wtr.serialize(TransactionCsvRow::from(r))
            .map_err(|e| AppError::Internal(format!("CSV write error: {e}")))?;
    }
    wtr.into_inner()
        .map_err(|e| AppError::Internal(format!("CSV flush error: {e}")))
}

#[utoipa::path(
    get, path = "/api/wallet/transactions/export",
    tag = "Wallet",
    params(ExportQuery),
    responses(
        (status = 200, description = "Transactions as CSV or JSON"),
    ),
    security(("bearer" = []))
)]
pub async fn export(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Query(q): Query<ExportQuery>,
) -> Result<impl IntoResponse, AppError> {
    let owner = ledger_owner(&user, q.user_id)?;
    let rows = sqlx::query_as::<_, Transaction>(
        "SELECT * FROM transactions WHERE user_id = $1 ORDER BY created_at DESC, id DESC",
    )
    .bind(owner)
    .fetch_all(&state.db)
    .await?;

    match q.format.as_str() {
        "csv" => Ok((
            [
                (header::CONTENT_TYPE, "text/csv".to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    "attachment; filename=\"transactions.csv\"".to_string(),
                ),
            ],
            to_csv(&rows)?,
        )
            .into_response()),
        "json" => {
            let json = serde_json::to_string_pretty(&rows)
                .map_err(|e| AppError::Internal(format!("JSON error: {e}")))?;
            Ok((
                [
                    (header::CONTENT_TYPE, "application/json".to_string()),
                    (
                        header::CONTENT_DISPOSITION,
                        "attachment; filename=\"transactions.json\"".to_string(),
                    ),
                ],
                json,
            )
                .into_response())
        }
        other => Err(AppError::BadRequest(format!(
            "Unsupported export format '{other}', use csv or json"
        ))),
    }
}

#[utoipa::path(
    post, path = "/api/admin/wallet/adjust",
    tag = "Wallet",
    request_body = AdjustBalanceRequest,
    responses(
        (status = 200, body = Transaction),
        (status = 400, body = ErrorResponse),
        (status = 404, body = ErrorResponse),
    ),
    security(("bearer" = []))
)]
pub async fn adjust(
    State(state): State<AppState>,
    Extension(admin): Extension<CurrentUser>,
    Json(input): Json<AdjustBalanceRequest>,
) -> Result<Json<Transaction>, AppError> {
    require_admin(&admin)?;
    let reason = halcyon::validation::validate_adjustment(input.amount_cents, &input.reason)?;

    let exists: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM users WHERE id = $1")
        .bind(input.user_id)
        .fetch_optional(&state.db)
        .await?;
    if exists.is_none() {
        return Err(AppError::NotFound);
    }

    let source_id = format!("adj_{}", Uuid::new_v4().simple());
    let applied = ledger::apply(
        &state.db,
        Entry {
            user_id: input.user_id,
            kind: EntryKind::AdminAdjustment,
            amount_cents: input.amount_cents,
            source_id: &source_id,
            description: &reason,
            metadata: serde_json::json!({ "admin": admin.email }),
        },
    )
    .await
    .map_err(|e| match e {
        LedgerError::InsufficientBalance { balance_cents } => AppError::BadRequest(format!(
            "Adjustment would make the balance negative (current balance {})",
            halcyon::money::format_cents(balance_cents)
        )),
        other => other.into(),
    })?;

    let ledger::Applied::Recorded(tx) = applied else {
        return Err(AppError::Internal("Adjustment was not recorded".into()));
    };

    let user_id = input.user_id.to_string();
    log_audit(
        &state.db,
        &admin,
        AuditEvent::new("adjust_balance", "wallet", Some(&user_id))
            .reason(Some(&reason))
            .details(serde_json::json!({
                "amount_cents": input.amount_cents,
                "balance_after_cents": tx.balance_after_cents,
            })),
    )
    .await;

    Ok(Json(tx))
}
