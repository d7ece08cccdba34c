//! Wallet balances and the append-only transaction ledger.
//!
//! Every balance change goes through [`apply`]: one conditional UPDATE on the
//! wallet row (so the balance never goes negative) and one INSERT into
//! `transactions`, committed together. `source_id` is UNIQUE, so replaying the
//! same payment, webhook or order is a no-op.

use serde_json::Value;
use uuid::Uuid;

use crate::db::Db;
use crate::errors::AppError;
use crate::models::{Transaction, Wallet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Topup,
    AutoTopup,
    AdminAdjustment,
    DeployCharge,
    Refund,
}

impl EntryKind {
    pub const ALL: [EntryKind; 5] = [
        EntryKind::Topup,
        EntryKind::AutoTopup,
        EntryKind::AdminAdjustment,
        EntryKind::DeployCharge,
        EntryKind::Refund,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EntryKind::Topup => "topup",
            EntryKind::AutoTopup => "auto_topup",
            EntryKind::AdminAdjustment => "admin_adjustment",
            EntryKind::DeployCharge => "deploy_charge",
            EntryKind::Refund => "refund",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == s)
    }
}

#[derive(Debug)]
pub struct Entry<'a> {
    pub user_id: Uuid,
    pub kind: EntryKind,
    /// Positive credits, negative debits.
    pub amount_cents: i64,
    pub source_id: &'a str,
    pub description: &'a str,
    pub metadata: Value,
}

#[derive(Debug)]
pub enum Applied {
    Recorded(Transaction),
    /// `source_id` was already in the ledger; nothing changed.
    Duplicate { balance_cents: i64 },
}

impl Applied {
    pub fn balance_cents(&self) -> i64 {
        match self {
            Applied::Recorded(tx) => tx.balance_after_cents,
            Applied::Duplicate { balance_cents } => *balance_cents,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, Applied::Recorded(_))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Insufficient balance")]
    InsufficientBalance { balance_cents: i64 },

    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::InsufficientBalance { .. } => {
                AppError::PaymentRequired("Insufficient balance".into())
            }
            LedgerError::Sqlx(e) => AppError::Sqlx(e),
        }
    }
}

/// Returns the user's wallet, creating an empty one on first access.
pub async fn wallet(db: &Db, user_id: Uuid) -> Result<Wallet, sqlx::Error> {
    sqlx::query("INSERT INTO wallets (user_id) VALUES ($1) ON CONFLICT (user_id) DO NOTHING")
        .bind(user_id)
        .execute(db)
        .await?;
    sqlx::query_as::<_, Wallet>("SELECT * FROM wallets WHERE user_id = $1")
        .bind(user_id)
        .fetch_one(db)
        .await
}

pub async fn apply(db: &Db, entry: Entry<'_>) -> Result<Applied, LedgerError> {
    let mut tx = db.begin().await?;
    let applied = apply_in(&mut tx, &entry).await?;
    tx.commit().await?;
    Ok(applied)
}

/// Records `entry` inside the caller's transaction, so a debit can commit
/// or roll back together with the rows it pays for.
pub async fn apply_in(
    conn: &mut sqlx::PgConnection,
    entry: &Entry<'_>,
) -> Result<Applied, LedgerError> {
    sqlx::query("INSERT INTO wallets (user_id) VALUES ($1) ON CONFLICT (user_id) DO NOTHING")
        .bind(entry.user_id)
        .execute(&mut *conn)
        .await?;

    let seen: Option<(i64,)> = sqlx::query_as(
        "SELECT balance_after_cents FROM transactions WHERE source_id = $1",
    )
    .bind(entry.source_id)
    .fetch_optional(&mut *conn)
    .await?;
    if seen.is_some() {
        tracing::debug!(source_id = entry.source_id, "Ledger entry already recorded");
        return Ok(Applied::Duplicate {
            balance_cents: current_balance(conn, entry.user_id).await?,
        });
    }

    let balance: Option<(i64,)> = sqlx::query_as(
        r#"UPDATE wallets SET balance_cents = balance_cents + $2, updated_at = now()
           WHERE user_id = $1 AND balance_cents + $2 >= 0
           RETURNING balance_cents"#,
    )
    .bind(entry.user_id)
    .bind(entry.amount_cents)
    .fetch_optional(&mut *conn)
    .await?;

    let Some((balance_after,)) = balance else {
        return Err(LedgerError::InsufficientBalance {
            balance_cents: current_balance(conn, entry.user_id).await?,
        });
    };

    let inserted = sqlx::query_as::<_, Transaction>(
        r#"INSERT INTO transactions
               (user_id, kind, amount_cents, balance_after_cents, source_id, description, metadata)
           VALUES ($1, $2, $3, $4, $5, $6, $7)
           ON CONFLICT (source_id) DO NOTHING
           RETURNING *"#,
    )
    .bind(entry.user_id)
    .bind(entry.kind.as_str())
    .bind(entry.amount_cents)
    .bind(balance_after)
    .bind(entry.source_id)
    .bind(entry.description)
    .bind(&entry.metadata)
    .fetch_optional(&mut *conn)
    .await?;

    let Some(row) = inserted else {
        // A concurrent writer recorded the same source first; undo our change.
        let (balance_cents,): (i64,) = sqlx::query_as(
            r#"UPDATE wallets SET balance_cents = balance_cents - $2, updated_at = now()
               WHERE user_id = $1
               RETURNING balance_cents"#,
        )
        .bind(entry.user_id)
        .bind(entry.amount_cents)
        .fetch_one(&mut *conn)
        .await?;
        return Ok(Applied::Duplicate { balance_cents });
    };

    tracing::info!(
        user_id = %entry.user_id,
        kind = entry.kind.as_str(),
        amount_cents = entry.amount_cents,
        balance_after,
        "Ledger entry recorded"
    );
    Ok(Applied::Recorded(row))
}

async fn current_balance(conn: &mut sqlx::PgConnection, user_id: Uuid) -> Result<i64, sqlx::Error> {
    let (balance,): (i64,) = sqlx::query_as("SELECT balance_cents FROM wallets WHERE user_id = $1")
        .bind(user_id)
        .fetch_one(conn)
        .await?;
    Ok(balance)
}
