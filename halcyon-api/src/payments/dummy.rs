//! In-process provider for development and tests. Checkout sessions it
//! issued are "paid" as soon as they are read back; saved-card behaviour is
//! driven by the payment method id.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use super::{
    ChargePurpose, ChargeRequest, CheckoutSession, PaymentError, PaymentMethod, PaymentProvider,
    PaymentRecord, Result, WebhookEvent,
};

/// Payment method ids with this prefix always need authentication.
pub const PM_REQUIRES_ACTION: &str = "pm_auth";
/// Payment method ids with this prefix are always declined.
pub const PM_DECLINED: &str = "pm_declined";

#[derive(Debug, Default)]
pub struct DummyProvider {
    /// Issued checkout sessions: id -> (user, amount in cents).
    sessions: Mutex<HashMap<String, (Uuid, i64)>>,
}

impl DummyProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn lookup_session(&self, session_id: &str) -> Result<(Uuid, i64)> {
        let sessions = self
            .sessions
            .lock()
            .map_err(|_| PaymentError::ProviderApi("Session store poisoned".into()))?;
        sessions
            .get(session_id)
            .copied()
            .ok_or_else(|| PaymentError::InvalidData("Invalid checkout session id".into()))
    }
}

#[async_trait]
impl PaymentProvider for DummyProvider {
    async fn create_customer(&self, user_id: Uuid, _email: &str) -> Result<String> {
        tracing::debug!("Dummy customer for user {}", user_id);
        Ok(format!("cus_dummy_{}", Uuid::new_v4().simple()))
    }

    async fn create_checkout_session(
        &self,
        _customer_id: &str,
        user_id: Uuid,
        amount_cents: i64,
        success_url: &str,
        _cancel_url: &str,
    ) -> Result<CheckoutSession> {
        let id = format!("cs_dummy_{}", Uuid::new_v4().simple());
        self.sessions
            .lock()
            .map_err(|_| PaymentError::ProviderApi("Session store poisoned".into()))?
            .insert(id.clone(), (user_id, amount_cents));
        Ok(CheckoutSession {
            url: success_url.replace("{CHECKOUT_SESSION_ID}", &id),
            id,
        })
    }

    async fn get_checkout_session(&self, session_id: &str) -> Result<PaymentRecord> {
        let (user_id, amount_cents) = self.lookup_session(session_id)?;
        Ok(PaymentRecord {
            id: session_id.to_string(),
            user_id,
            amount_cents,
            is_paid: true,
            purpose: ChargePurpose::Topup,
            customer_id: None,
        })
    }

    async fn charge_saved_card(&self, req: ChargeRequest<'_>) -> Result<String> {
        if req.payment_method_id.starts_with(PM_REQUIRES_ACTION) {
            return Err(PaymentError::RequiresAction { payment_id: None });
        }
        if req.payment_method_id.starts_with(PM_DECLINED) {
            return Err(PaymentError::CardDeclined("Your card was declined.".into()));
        }
        Ok(format!("pi_dummy_{}", Uuid::new_v4().simple()))
    }

    async fn get_payment_intent(&self, payment_id: &str) -> Result<PaymentRecord> {
        Err(PaymentError::InvalidData(format!(
            "Unknown payment {payment_id}"
        )))
    }

    async fn list_payment_methods(&self, _customer_id: &str) -> Result<Vec<PaymentMethod>> {
        Ok(vec![PaymentMethod {
            id: "pm_dummy_visa".into(),
            brand: "visa".into(),
            last4: "4242".into(),
            exp_month: 12,
            exp_year: 2030,
            is_default: true,
        }])
    }

    async fn create_setup_intent(&self, _customer_id: &str) -> Result<String> {
        Ok(format!("seti_dummy_{}_secret", Uuid::new_v4().simple()))
    }

    async fn owns_payment_method(
        &self,
        _customer_id: &str,
        payment_method_id: &str,
    ) -> Result<bool> {
        Ok(payment_method_id.starts_with("pm_"))
    }

    async fn set_default_payment_method(&self, _customer_id: &str, _pm: &str) -> Result<()> {
        Ok(())
    }

    async fn detach_payment_method(&self, _payment_method_id: &str) -> Result<()> {
        Ok(())
    }

    fn validate_webhook(
        &self,
        _headers: &axum::http::HeaderMap,
        _body: &str,
    ) -> Result<Option<WebhookEvent>> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_checkout_round_trip_through_session_id() {
        let p = DummyProvider::new();
        let user = Uuid::new_v4();
        let session = p
            .create_checkout_session("cus", user, 2500, "http://x/ok?s={CHECKOUT_SESSION_ID}", "")
            .await
            .unwrap();
        assert!(session.url.ends_with(&session.id));

        let record = p.get_checkout_session(&session.id).await.unwrap();
        assert_eq!(record.user_id, user);
        assert_eq!(record.amount_cents, 2500);
        assert!(record.is_paid);
    }

    #[tokio::test]
    async fn test_charge_outcomes_follow_payment_method() {
        let p = DummyProvider::new();
        let req = |pm| ChargeRequest {
            customer_id: "cus",
            payment_method_id: pm,
            amount_cents: 1000,
            user_id: Uuid::nil(),
            purpose: ChargePurpose::Topup,
            idempotency_key: "k",
        };
        assert!(p.charge_saved_card(req("pm_ok")).await.is_ok());
        assert!(matches!(
            p.charge_saved_card(req("pm_auth_1")).await,
            Err(PaymentError::RequiresAction { .. })
        ));
        assert!(matches!(
            p.charge_saved_card(req("pm_declined_1")).await,
            Err(PaymentError::CardDeclined(_))
        ));
    }

    #[tokio::test]
    async fn test_rejects_foreign_session_id() {
        let p = DummyProvider::new();
        assert!(p.get_checkout_session("cs_live_abc").await.is_err());
    }

    #[tokio::test]
    async fn test_rejects_session_it_never_issued() {
        let p = DummyProvider::new();
        let user = Uuid::new_v4();
        let forged = format!("cs_dummy_{user}_99999999_x");
        assert!(matches!(
            p.get_checkout_session(&forged).await,
            Err(PaymentError::InvalidData(_))
        ));

        // Sessions are not shared between provider instances
        let issued = p
            .create_checkout_session("cus", user, 1000, "http://x", "")
            .await
            .unwrap();
        assert!(DummyProvider::new().get_checkout_session(&issued.id).await.is_err());
    }
}
