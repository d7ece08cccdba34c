//! Background worker that refills wallets which dropped below their
//! auto-top-up threshold by charging the saved card off-session.

use std::sync::Arc;

use uuid::Uuid;

use crate::db::Db;
use crate::payments::{ChargePurpose, ChargeRequest, PaymentError, PaymentProvider, PaymentRecord};
use crate::routes::billing::credit_payment;

/// Lock TTL; long enough to cover one charge round-trip.
const LOCK_TTL_SECS: u64 = 120;

#[derive(Debug, sqlx::FromRow)]
struct DueWallet {
    user_id: Uuid,
    balance_cents: i64,
    stripe_customer_id: String,
    auto_topup_amount_cents: i64,
    auto_topup_payment_method_id: String,
}

pub async fn run(
    db: Db,
    redis: redis::aio::ConnectionManager,
    payments: Arc<dyn PaymentProvider>,
    interval_secs: u64,
) {
    let interval = std::time::Duration::from_secs(interval_secs);
    tracing::info!("Auto top-up worker started (interval={interval_secs}s)");

    loop {
        if let Err(e) = sweep(&db, &redis, payments.as_ref()).await {
            tracing::error!("Auto top-up sweep error: {e}");
        }
        tokio::time::sleep(interval).await;
    }
}

/// One pass over every wallet below its threshold.
pub async fn sweep(
    db: &Db,
    redis: &redis::aio::ConnectionManager,
    payments: &dyn PaymentProvider,
) -> anyhow::Result<()> {
    let due = sqlx::query_as::<_, DueWallet>(
        r#"SELECT user_id, balance_cents, stripe_customer_id,
                  auto_topup_amount_cents, auto_topup_payment_method_id
           FROM wallets
           WHERE auto_topup_enabled
             AND balance_cents < auto_topup_threshold_cents
             AND stripe_customer_id IS NOT NULL
             AND auto_topup_payment_method_id IS NOT NULL
           ORDER BY balance_cents ASC"#,
    )
    .fetch_all(db)
    .await?;

    if due.is_empty() {
        tracing::debug!("No wallets below their auto top-up threshold");
        return Ok(());
    }

    let mut conn = redis.clone();
    for wallet in &due {
        if !acquire_lock(&mut conn, wallet.user_id).await {
            tracing::debug!(user_id = %wallet.user_id, "Auto top-up already in progress");
            continue;
        }
        refill(db, payments, wallet).await;
    }

    Ok(())
}

fn lock_key(user_id: Uuid) -> String {
    format!("autotopup:{user_id}")
}

/// SET NX EX. A Redis outage skips the charge rather than risking a double.
async fn acquire_lock(conn: &mut redis::aio::ConnectionManager, user_id: Uuid) -> bool {
    let acquired: redis::RedisResult<Option<String>> = redis::cmd("SET")
        .arg(lock_key(user_id))
        .arg(chrono::Utc::now().to_rfc3339())
        .arg("NX")
        .arg("EX")
        .arg(LOCK_TTL_SECS)
        .query_async(conn)
        .await;
    match acquired {
        Ok(reply) => reply.is_some(),
        Err(e) => {
            tracing::error!(user_id = %user_id, "Redis lock error: {e}");
            false
        }
    }
}

/// One key per wallet per lock window, so a retried sweep inside the window
/// hits the processor's idempotency cache instead of charging again.
fn idempotency_key(user_id: Uuid, now_secs: i64) -> String {
    format!("autotopup:{user_id}:{}", now_secs / LOCK_TTL_SECS as i64)
}

async fn refill(db: &Db, payments: &dyn PaymentProvider, wallet: &DueWallet) {
    let key = idempotency_key(wallet.user_id, chrono::Utc::now().timestamp());
    let charge = payments
        .charge_saved_card(ChargeRequest {
            customer_id: &wallet.stripe_customer_id,
            payment_method_id: &wallet.auto_topup_payment_method_id,
            amount_cents: wallet.auto_topup_amount_cents,
            user_id: wallet.user_id,
            purpose: ChargePurpose::AutoTopup,
            idempotency_key: &key,
        })
        .await;

    let outcome = match charge {
        Ok(payment_id) => {
            let record = PaymentRecord {
                id: payment_id,
                user_id: wallet.user_id,
                amount_cents: wallet.auto_topup_amount_cents,
                is_paid: true,
                purpose: ChargePurpose::AutoTopup,
                customer_id: Some(wallet.stripe_customer_id.clone()),
            };
            match credit_payment(db, &record).await {
                Ok(applied) => {
                    tracing::info!(
                        user_id = %wallet.user_id,
                        amount_cents = wallet.auto_topup_amount_cents,
                        balance_cents = applied.balance_cents(),
                        "Auto top-up charged"
                    );
                    record_attempt(db, wallet.user_id, None, false).await
                }
                Err(e) => {
                    tracing::error!(user_id = %wallet.user_id, payment_id = %record.id, "Charged but failed to credit: {e}");
                    record_attempt(db, wallet.user_id, Some(&e.to_string()), false).await
                }
            }
        }
        Err(PaymentError::RequiresAction { .. }) => {
            tracing::warn!(user_id = %wallet.user_id, "Card needs authentication, disabling auto top-up");
            record_attempt(
                db,
                wallet.user_id,
                Some("Card requires authentication; top up manually to re-verify it"),
                true,
            )
            .await
        }
        Err(e) => {
            tracing::warn!(
                user_id = %wallet.user_id,
                balance_cents = wallet.balance_cents,
                "Auto top-up charge failed: {e}"
            );
            record_attempt(db, wallet.user_id, Some(&e.to_string()), false).await
        }
    };

    if let Err(e) = outcome {
        tracing::error!(user_id = %wallet.user_id, "Failed to record auto top-up attempt: {e}");
    }
}

async fn record_attempt(
    db: &Db,
    user_id: Uuid,
    error: Option<&str>,
    disable: bool,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"UPDATE wallets SET
            auto_topup_last_attempt_at = now(),
            auto_topup_last_error = $2,
            auto_topup_enabled = auto_topup_enabled AND NOT $3,
            updated_at = now()
           WHERE user_id = $1"#,
    )
    .bind(user_id)
    .bind(error)
    .bind(disable)
    .execute(db)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_key() {
        let id = Uuid::nil();
        assert_eq!(lock_key(id), format!("autotopup:{id}"));
    }

    #[test]
    fn test_idempotency_key_stable_within_window() {
        let id = Uuid::nil();
        let window = LOCK_TTL_SECS as i64;
        assert_eq!(idempotency_key(id, window * 10), idempotency_key(id, window * 10 + window - 1));
        assert_ne!(idempotency_key(id, window * 10), idempotency_key(id, window * 11));
    }
}
