use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use super::{
    signature, ChargePurpose, ChargeRequest, CheckoutSession, PaymentError, PaymentMethod,
    PaymentProvider, PaymentRecord, Result, WebhookEvent,
};

pub const STRIPE_API_BASE: &str = "https://api.stripe.com/v1";

/// Stripe over its REST API, form-encoded as Stripe expects.
pub struct StripeProvider {
    http: reqwest::Client,
    base_url: String,
    secret_key: String,
    webhook_secret: Option<String>,
    currency: String,
}

type Form = Vec<(String, String)>;

fn field(key: &str, value: impl ToString) -> (String, String) {
    (key.to_string(), value.to_string())
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetail {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    payment_intent: Option<Value>,
}

impl StripeProvider {
    pub fn new(
        http: reqwest::Client,
        base_url: &str,
        secret_key: &str,
        webhook_secret: Option<String>,
        currency: &str,
    ) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            secret_key: secret_key.to_string(),
            webhook_secret,
            currency: currency.to_string(),
        }
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        form: Option<&Form>,
        idempotency_key: Option<&str>,
    ) -> Result<Value> {
        let mut req = self
            .http
            .request(method, format!("{}{}", self.base_url, path))
            .bearer_auth(&self.secret_key)
            .timeout(std::time::Duration::from_secs(30));
        if let Some(f) = form {
            req = req.form(f);
        }
        if let Some(key) = idempotency_key {
            req = req.header("Idempotency-Key", key);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| PaymentError::ProviderApi(format!("Stripe request failed: {e}")))?;
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();

        if status.is_success() {
            return serde_json::from_str(&text)
                .map_err(|e| PaymentError::ProviderApi(format!("Stripe response parse error: {e}")));
        }
        Err(Self::map_error(status, &text))
    }

    fn map_error(status: StatusCode, body: &str) -> PaymentError {
        let Ok(parsed) = serde_json::from_str::<StripeErrorBody>(body) else {
            return PaymentError::ProviderApi(format!("Stripe error ({status}): {body}"));
        };
        let detail = parsed.error;
        let message = detail
            .message
            .unwrap_or_else(|| format!("Stripe returned {status}"));

        let intent_id = detail
            .payment_intent
            .as_ref()
            .and_then(|pi| pi.get("id"))
            .and_then(|id| id.as_str())
            .map(String::from);
        let intent_status = detail
            .payment_intent
            .as_ref()
            .and_then(|pi| pi.get("status"))
            .and_then(|s| s.as_str());

        if detail.code.as_deref() == Some("authentication_required")
            || intent_status == Some("requires_action")
        {
            return PaymentError::RequiresAction {
                payment_id: intent_id,
            };
        }
        match status {
            StatusCode::PAYMENT_REQUIRED => PaymentError::CardDeclined(message),
            StatusCode::NOT_FOUND | StatusCode::BAD_REQUEST => PaymentError::InvalidData(message),
            _ => PaymentError::ProviderApi(message),
        }
    }

    fn str_field<'a>(v: &'a Value, key: &str) -> Option<&'a str> {
        v.get(key).and_then(|x| x.as_str())
    }

    fn parse_user_id(v: &Value) -> Result<Uuid> {
        let raw = v
            .get("metadata")
            .and_then(|m| m.get("user_id"))
            .and_then(|u| u.as_str())
            .or_else(|| Self::str_field(v, "client_reference_id"))
            .ok_or_else(|| PaymentError::InvalidData("Payment has no user reference".into()))?;
        raw.parse()
            .map_err(|e| PaymentError::InvalidData(format!("Invalid user id '{raw}': {e}")))
    }

    fn parse_purpose(v: &Value) -> ChargePurpose {
        v.get("metadata")
            .and_then(|m| m.get("kind"))
            .and_then(|k| k.as_str())
            .and_then(ChargePurpose::parse)
            .unwrap_or(ChargePurpose::Topup)
    }
}

#[async_trait]
impl PaymentProvider for StripeProvider {
    async fn create_customer(&self, user_id: Uuid, email: &str) -> Result<String> {
        let form = vec![field("email", email), field("metadata[user_id]", user_id)];
        let v = self.request(Method::POST, "/customers", Some(&form), None).await?;
        let id = Self::str_field(&v, "id")
            .ok_or_else(|| PaymentError::ProviderApi("Customer response has no id".into()))?;
        tracing::info!("Created Stripe customer {} for user {}", id, user_id);
        Ok(id.to_string())
    }

    async fn create_checkout_session(
        &self,
        customer_id: &str,
        user_id: Uuid,
        amount_cents: i64,
        success_url: &str,
        cancel_url: &str,
    ) -> Result<CheckoutSession> {
        let form = vec![
            field("mode", "payment"),
            field("customer", customer_id),
            field("client_reference_id", user_id),
            field("success_url", success_url),
            field("cancel_url", cancel_url),
            field("line_items[0][quantity]", 1),
            field("line_items[0][price_data][currency]", &self.currency),
            field("line_items[0][price_data][unit_amount]", amount_cents),
            field("line_items[0][price_data][product_data][name]", "Wallet top-up"),
            field("payment_intent_data[setup_future_usage]", "off_session"),
            field("metadata[user_id]", user_id),
            field("metadata[kind]", ChargePurpose::Topup.as_str()),
        ];
        let v = self
            .request(Method::POST, "/checkout/sessions", Some(&form), None)
            .await?;

        let id = Self::str_field(&v, "id");
        let url = Self::str_field(&v, "url");
        match (id, url) {
            (Some(id), Some(url)) => {
                tracing::info!("Created checkout session {} for user {}", id, user_id);
                Ok(CheckoutSession {
                    id: id.to_string(),
                    url: url.to_string(),
                })
            }
            _ => Err(PaymentError::ProviderApi(
                "Checkout session response is missing id or url".into(),
            )),
        }
    }

    async fn get_checkout_session(&self, session_id: &str) -> Result<PaymentRecord> {
        if !session_id.starts_with("cs_") {
            return Err(PaymentError::InvalidData("Invalid checkout session id".into()));
        }
        let v = self
            .request(Method::GET, &format!("/checkout/sessions/{session_id}"), None, None)
            .await?;
        Ok(PaymentRecord {
            id: session_id.to_string(),
            user_id: Self::parse_user_id(&v)?,
            amount_cents: v.get("amount_total").and_then(|a| a.as_i64()).unwrap_or(0),
            is_paid: Self::str_field(&v, "payment_status") == Some("paid"),
            purpose: Self::parse_purpose(&v),
            customer_id: Self::str_field(&v, "customer").map(String::from),
        })
    }

    async fn charge_saved_card(&self, req: ChargeRequest<'_>) -> Result<String> {
        let form = vec![
            field("amount", req.amount_cents),
            field("currency", &self.currency),
            field("customer", req.customer_id),
            field("payment_method", req.payment_method_id),
            field("confirm", "true"),
            field("off_session", "true"),
            field("metadata[user_id]", req.user_id),
            field("metadata[kind]", req.purpose.as_str()),
        ];
        let v = self
            .request(
                Method::POST,
                "/payment_intents",
                Some(&form),
                Some(req.idempotency_key),
            )
            .await?;

        let id = Self::str_field(&v, "id")
            .ok_or_else(|| PaymentError::ProviderApi("PaymentIntent has no id".into()))?
            .to_string();
        match Self::str_field(&v, "status") {
            Some("succeeded") => Ok(id),
            Some("requires_action") | Some("requires_confirmation") => {
                Err(PaymentError::RequiresAction {
                    payment_id: Some(id),
                })
            }
            Some("processing") => Err(PaymentError::NotCompleted),
            other => Err(PaymentError::CardDeclined(format!(
                "Payment ended in status {}",
                other.unwrap_or("unknown")
            ))),
        }
    }

    async fn get_payment_intent(&self, payment_id: &str) -> Result<PaymentRecord> {
        let v = self
            .request(Method::GET, &format!("/payment_intents/{payment_id}"), None, None)
            .await?;
        Ok(PaymentRecord {
            id: payment_id.to_string(),
            user_id: Self::parse_user_id(&v)?,
            amount_cents: v
                .get("amount_received")
                .and_then(|a| a.as_i64())
                .unwrap_or(0),
            is_paid: Self::str_field(&v, "status") == Some("succeeded"),
            purpose: Self::parse_purpose(&v),
            customer_id: Self::str_field(&v, "customer").map(String::from),
        })
    }

    async fn list_payment_methods(&self, customer_id: &str) -> Result<Vec<PaymentMethod>> {
        let customer = self
            .request(Method::GET, &format!("/customers/{customer_id}"), None, None)
            .await?;
        let default_id = customer
            .get("invoice_settings")
            .and_then(|s| s.get("default_payment_method"))
            .and_then(|d| d.as_str())
            .map(String::from);

        let v = self
            .request(
                Method::GET,
                &format!("/payment_methods?customer={customer_id}&type=card"),
                None,
                None,
            )
            .await?;
        let data = v
            .get("data")
            .and_then(|d| d.as_array())
            .cloned()
            .unwrap_or_default();

        Ok(data
            .iter()
            .filter_map(|pm| {
                let id = Self::str_field(pm, "id")?.to_string();
                let card = pm.get("card")?;
                Some(PaymentMethod {
                    is_default: default_id.as_deref() == Some(id.as_str()),
                    brand: Self::str_field(card, "brand").unwrap_or("card").to_string(),
                    last4: Self::str_field(card, "last4").unwrap_or("????").to_string(),
                    exp_month: card.get("exp_month").and_then(|m| m.as_u64()).unwrap_or(0) as u32,
                    exp_year: card.get("exp_year").and_then(|y| y.as_u64()).unwrap_or(0) as u32,
                    id,
                })
            })
            .collect())
    }

    async fn create_setup_intent(&self, customer_id: &str) -> Result<String> {
        let form = vec![
            field("customer", customer_id),
            field("usage", "off_session"),
            field("payment_method_types[]", "card"),
        ];
        let v = self
            .request(Method::POST, "/setup_intents", Some(&form), None)
            .await?;
        Self::str_field(&v, "client_secret")
            .map(String::from)
            .ok_or_else(|| PaymentError::ProviderApi("SetupIntent has no client_secret".into()))
    }

    async fn owns_payment_method(
        &self,
        customer_id: &str,
        payment_method_id: &str,
    ) -> Result<bool> {
        match self
            .request(
                Method::GET,
                &format!("/payment_methods/{payment_method_id}"),
                None,
                None,
            )
            .await
        {
            Ok(v) => Ok(Self::str_field(&v, "customer") == Some(customer_id)),
            Err(PaymentError::InvalidData(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn set_default_payment_method(
        &self,
        customer_id: &str,
        payment_method_id: &str,
    ) -> Result<()> {
        let form = vec![field(
            "invoice_settings[default_payment_method]",
            payment_method_id,
        )];
        self.request(
            Method::POST,
            &format!("/customers/{customer_id}"),
            Some(&form),
            None,
        )
        .await
        .map(|_| ())
    }

    async fn detach_payment_method(&self, payment_method_id: &str) -> Result<()> {
        self.request(
            Method::POST,
            &format!("/payment_methods/{payment_method_id}/detach"),
            Some(&Vec::new()),
            None,
        )
        .await
        .map(|_| ())
    }

    fn validate_webhook(
        &self,
        headers: &axum::http::HeaderMap,
        body: &str,
    ) -> Result<Option<WebhookEvent>> {
        let Some(secret) = &self.webhook_secret else {
            tracing::warn!("Stripe webhook received but STRIPE_WEBHOOK_SECRET is not set");
            return Err(PaymentError::InvalidData("Webhooks are not configured".into()));
        };
        let header = headers
            .get("stripe-signature")
            .and_then(|h| h.to_str().ok())
            .ok_or_else(|| PaymentError::InvalidData("Missing Stripe-Signature header".into()))?;

        signature::verify(header, body, secret, chrono::Utc::now().timestamp()).map_err(|e| {
            tracing::warn!("Rejected Stripe webhook: {e}");
            PaymentError::InvalidData(format!("Invalid webhook signature: {e}"))
        })?;

        let event: Value = serde_json::from_str(body)
            .map_err(|e| PaymentError::InvalidData(format!("Invalid webhook body: {e}")))?;
        let event_type = Self::str_field(&event, "type")
            .ok_or_else(|| PaymentError::InvalidData("Webhook has no type".into()))?
            .to_string();
        let object_id = event
            .get("data")
            .and_then(|d| d.get("object"))
            .and_then(|o| o.get("id"))
            .and_then(|id| id.as_str())
            .map(String::from);

        Ok(Some(WebhookEvent {
            event_type,
            object_id,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer) -> StripeProvider {
        StripeProvider::new(
            reqwest::Client::new(),
            &server.uri(),
            "sk_test_123",
            Some("whsec_abc".into()),
            "usd",
        )
    }

    fn charge<'a>(key: &'a str) -> ChargeRequest<'a> {
        ChargeRequest {
            customer_id: "cus_1",
            payment_method_id: "pm_1",
            amount_cents: 2500,
            user_id: Uuid::nil(),
            purpose: ChargePurpose::Topup,
            idempotency_key: key,
        }
    }

    #[tokio::test]
    async fn test_direct_charge_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/payment_intents"))
            .and(header("idempotency-key", "topup-1"))
            .and(body_string_contains("off_session=true"))
            .and(body_string_contains("amount=2500"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"id": "pi_1", "status": "succeeded"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let id = provider(&server).charge_saved_card(charge("topup-1")).await.unwrap();
        assert_eq!(id, "pi_1");
    }

    #[tokio::test]
    async fn test_authentication_required_maps_to_requires_action() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/payment_intents"))
            .respond_with(ResponseTemplate::new(402).set_body_json(json!({
                "error": {
                    "code": "authentication_required",
                    "message": "This payment requires authentication.",
                    "payment_intent": { "id": "pi_2", "status": "requires_payment_method" }
                }
            })))
            .mount(&server)
            .await;

        let err = provider(&server).charge_saved_card(charge("k")).await.unwrap_err();
        match err {
            PaymentError::RequiresAction { payment_id } => {
                assert_eq!(payment_id.as_deref(), Some("pi_2"))
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_decline_keeps_processor_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/payment_intents"))
            .respond_with(ResponseTemplate::new(402).set_body_json(json!({
                "error": { "code": "card_declined", "message": "Your card was declined." }
            })))
            .mount(&server)
            .await;

        let err = provider(&server).charge_saved_card(charge("k")).await.unwrap_err();
        match err {
            PaymentError::CardDeclined(msg) => assert_eq!(msg, "Your card was declined."),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_checkout_session_returns_url() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/checkout/sessions"))
            .and(body_string_contains("mode=payment"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "cs_test_1",
                "url": "https://checkout.stripe.com/c/pay/cs_test_1"
            })))
            .mount(&server)
            .await;

        let session = provider(&server)
            .create_checkout_session("cus_1", Uuid::nil(), 1000, "https://a/ok", "https://a/no")
            .await
            .unwrap();
        assert_eq!(session.id, "cs_test_1");
        assert!(session.url.contains("cs_test_1"));
    }

    #[tokio::test]
    async fn test_get_checkout_session_reads_metadata() {
        let server = MockServer::start().await;
        let user = Uuid::new_v4();
        Mock::given(method("GET"))
            .and(path("/checkout/sessions/cs_test_9"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "cs_test_9",
                "payment_status": "paid",
                "amount_total": 5000,
                "customer": "cus_9",
                "metadata": { "user_id": user.to_string(), "kind": "topup" }
            })))
            .mount(&server)
            .await;

        let record = provider(&server).get_checkout_session("cs_test_9").await.unwrap();
        assert!(record.is_paid);
        assert_eq!(record.user_id, user);
        assert_eq!(record.amount_cents, 5000);
        assert_eq!(record.customer_id.as_deref(), Some("cus_9"));
    }

    #[tokio::test]
    async fn test_list_payment_methods_marks_default() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/customers/cus_1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "cus_1",
                "invoice_settings": { "default_payment_method": "pm_b" }
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/payment_methods"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [
                    { "id": "pm_a", "card": { "brand": "visa", "last4": "4242", "exp_month": 4, "exp_year": 2030 } },
                    { "id": "pm_b", "card": { "brand": "mastercard", "last4": "4444", "exp_month": 1, "exp_year": 2029 } }
                ]
            })))
            .mount(&server)
            .await;

        let methods = provider(&server).list_payment_methods("cus_1").await.unwrap();
        assert_eq!(methods.len(), 2);
        assert!(!methods[0].is_default);
        assert!(methods[1].is_default);
        assert_eq!(methods[0].last4, "4242");
    }

    #[test]
    fn test_webhook_validation() {
        let p = StripeProvider::new(reqwest::Client::new(), STRIPE_API_BASE, "sk", Some("whsec_abc".into()), "usd");
        let body = r#"{"type":"checkout.session.completed","data":{"object":{"id":"cs_1"}}}"#;
        let now = chrono::Utc::now().timestamp();
        let sig = signature::sign("whsec_abc", now, body);

        let mut headers = axum::http::HeaderMap::new();
        headers.insert("stripe-signature", format!("t={now},v1={sig}").parse().unwrap());

        let event = p.validate_webhook(&headers, body).unwrap().unwrap();
        assert_eq!(event.event_type, "checkout.session.completed");
        assert_eq!(event.object_id.as_deref(), Some("cs_1"));

        headers.insert("stripe-signature", format!("t={now},v1=00").parse().unwrap());
        assert!(p.validate_webhook(&headers, body).is_err());
    }
}
