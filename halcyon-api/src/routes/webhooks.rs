use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    routing::post,
    Json, Router,
};

use crate::errors::AppError;
use crate::payments::PaymentError;
use crate::routes::billing::credit_payment;
use crate::routes::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/webhooks/stripe", post(stripe))
}

const CHECKOUT_COMPLETED: &str = "checkout.session.completed";
const PAYMENT_SUCCEEDED: &str = "payment_intent.succeeded";

/// Processor events. Every credit goes through the idempotent ledger, so
/// redeliveries and events racing the confirm endpoint credit once.
#[utoipa::path(
    post, path = "/api/webhooks/stripe",
    tag = "Billing",
    request_body(content = String, content_type = "application/json"),
    responses(
        (status = 200, description = "Event processed or ignored"),
        (status = 400, description = "Signature invalid"),
    )
)]
pub async fn stripe(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<serde_json::Value>, AppError> {
    let body = std::str::from_utf8(&body)
        .map_err(|_| AppError::BadRequest("Webhook body is not UTF-8".into()))?;

    let Some(event) = state.payments.validate_webhook(&headers, body)? else {
        return Ok(Json(serde_json::json!({ "received": true, "handled": false })));
    };
    let Some(object_id) = event.object_id.as_deref() else {
        return Ok(Json(serde_json::json!({ "received": true, "handled": false })));
    };

    let record = match event.event_type.as_str() {
        CHECKOUT_COMPLETED => state.payments.get_checkout_session(object_id).await?,
        PAYMENT_SUCCEEDED => match state.payments.get_payment_intent(object_id).await {
            Ok(r) => r,
            // Intents created by hosted checkout carry no wallet metadata;
            // their session event credits them.
            Err(PaymentError::InvalidData(msg)) => {
                tracing::debug!(object_id, "Ignoring payment intent: {msg}");
                return Ok(Json(serde_json::json!({ "received": true, "handled": false })));
            }
            Err(e) => return Err(e.into()),
        },
        other => {
            tracing::debug!(event_type = other, "Ignoring webhook event");
            return Ok(Json(serde_json::json!({ "received": true, "handled": false })));
        }
    };

    if !record.is_paid {
        return Ok(Json(serde_json::json!({ "received": true, "handled": false })));
    }

    let applied = credit_payment(&state.db, &record).await?;
    tracing::info!(
        event_type = %event.event_type,
        object_id,
        user_id = %record.user_id,
        new = applied.is_new(),
        "Webhook payment processed"
    );

    Ok(Json(serde_json::json!({ "received": true, "handled": true })))
}
