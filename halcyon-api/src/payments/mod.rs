//! Payment processor abstraction.
//!
//! The processor owns card tokenisation, authorisation, 3-D Secure and
//! retries. This layer only creates customers, checkout sessions and
//! off-session charges, and reads back their outcome.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::Config;

pub mod dummy;
pub mod signature;
pub mod stripe;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Stripe,
    Dummy,
}

/// Resolves `PAYMENT_PROVIDER` against the Stripe key. Stripe is the default
/// and needs its key; the dummy provider must be asked for by name.
pub fn select_provider(
    requested: Option<&str>,
    stripe_secret_key: Option<&str>,
) -> anyhow::Result<ProviderKind> {
    match (requested, stripe_secret_key) {
        (Some("dummy"), _) => Ok(ProviderKind::Dummy),
        (Some("stripe") | None, Some(_)) => Ok(ProviderKind::Stripe),
        (Some("stripe") | None, None) => anyhow::bail!(
            "STRIPE_SECRET_KEY is not set; set it, or PAYMENT_PROVIDER=dummy for local development"
        ),
        (Some(other), _) => anyhow::bail!("Unknown PAYMENT_PROVIDER '{other}' (expected stripe or dummy)"),
    }
}

pub fn create_provider(http: reqwest::Client, cfg: &Config) -> anyhow::Result<Box<dyn PaymentProvider>> {
    let kind = select_provider(cfg.payment_provider.as_deref(), cfg.stripe_secret_key.as_deref())?;
    Ok(match (kind, &cfg.stripe_secret_key) {
        (ProviderKind::Stripe, Some(key)) => Box::new(stripe::StripeProvider::new(
            http,
            stripe::STRIPE_API_BASE,
            key,
            cfg.stripe_webhook_secret.clone(),
            &cfg.currency,
        )),
        _ => {
            tracing::warn!("PAYMENT_PROVIDER=dummy: checkout sessions are paid without a processor");
            Box::new(dummy::DummyProvider::new())
        }
    })
}

pub type Result<T> = std::result::Result<T, PaymentError>;

#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("Payment provider API error: {0}")]
    ProviderApi(String),

    /// The card needs 3-D Secure or similar; the charge must be completed
    /// on-session through hosted checkout.
    #[error("Payment requires additional authentication")]
    RequiresAction { payment_id: Option<String> },

    #[error("Card declined: {0}")]
    CardDeclined(String),

    #[error("Payment not completed yet")]
    NotCompleted,

    #[error("Invalid payment data: {0}")]
    InvalidData(String),

    #[error("No payment customer on file")]
    NoCustomer,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Why money is being moved; stored in processor metadata so webhooks can
/// route the payment back to the right ledger entry kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChargePurpose {
    Topup,
    AutoTopup,
}

impl ChargePurpose {
    pub fn as_str(self) -> &'static str {
        match self {
            ChargePurpose::Topup => "topup",
            ChargePurpose::AutoTopup => "auto_topup",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "topup" => Some(ChargePurpose::Topup),
            "auto_topup" => Some(ChargePurpose::AutoTopup),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSession {
    pub id: String,
    pub url: String,
}

/// A checkout session or payment intent as read back from the processor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentRecord {
    pub id: String,
    pub user_id: Uuid,
    pub amount_cents: i64,
    pub is_paid: bool,
    pub purpose: ChargePurpose,
    pub customer_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct PaymentMethod {
    pub id: String,
    pub brand: String,
    pub last4: String,
    pub exp_month: u32,
    pub exp_year: u32,
    pub is_default: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookEvent {
    pub event_type: String,
    pub object_id: Option<String>,
}

pub struct ChargeRequest<'a> {
    pub customer_id: &'a str,
    pub payment_method_id: &'a str,
    pub amount_cents: i64,
    pub user_id: Uuid,
    pub purpose: ChargePurpose,
    /// Forwarded as the processor's idempotency key.
    pub idempotency_key: &'a str,
}

#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Creates a processor customer for the user.
    async fn create_customer(&self, user_id: Uuid, email: &str) -> Result<String>;

    /// Hosted checkout for a one-off wallet top-up.
    async fn create_checkout_session(
        &self,
        customer_id: &str,
        user_id: Uuid,
        amount_cents: i64,
        success_url: &str,
        cancel_url: &str,
    ) -> Result<CheckoutSession>;

    async fn get_checkout_session(&self, session_id: &str) -> Result<PaymentRecord>;

    /// Off-session charge against a saved card. Returns the payment id on
    /// success, `RequiresAction` when the card needs authentication.
    async fn charge_saved_card(&self, req: ChargeRequest<'_>) -> Result<String>;

    async fn get_payment_intent(&self, payment_id: &str) -> Result<PaymentRecord>;

    async fn list_payment_methods(&self, customer_id: &str) -> Result<Vec<PaymentMethod>>;

    /// Client secret for tokenising a new card in the processor's SDK.
    async fn create_setup_intent(&self, customer_id: &str) -> Result<String>;

    async fn owns_payment_method(&self, customer_id: &str, payment_method_id: &str)
        -> Result<bool>;

    async fn set_default_payment_method(
        &self,
        customer_id: &str,
        payment_method_id: &str,
    ) -> Result<()>;

    async fn detach_payment_method(&self, payment_method_id: &str) -> Result<()>;

    /// Verifies and parses a webhook. `None` when the provider has no
    /// webhooks.
    fn validate_webhook(
        &self,
        headers: &axum::http::HeaderMap,
        body: &str,
    ) -> Result<Option<WebhookEvent>>;
}
