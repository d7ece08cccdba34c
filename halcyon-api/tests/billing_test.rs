mod common;

use serde_json::json;

#[tokio::test]
async fn test_topup_with_saved_card() {
    let (router, pool) = common::setup().await;
    let (token, _) = common::register_customer(&router, "dina@example.com").await;

    let (status, json) = common::request_with_token(
        &router,
        "POST",
        "/api/billing/topup",
        &token,
        Some(json!({ "amount_cents": 2500, "payment_method_id": "pm_dummy_visa" })),
    )
    .await;

    assert_eq!(status, 200);
    assert_eq!(json["status"], "succeeded");
    assert_eq!(json["balance_cents"], 2500);
    assert!(json.get("checkout_url").is_none());

    let (_, txs) = common::request_with_token(
        &router,
        "GET",
        "/api/wallet/transactions?kind=topup",
        &token,
        None,
    )
    .await;
    assert_eq!(txs["total"], 1);
    assert!(txs["data"][0]["source_id"].as_str().unwrap().starts_with("pi_dummy_"));

    common::cleanup(&pool).await;
}

#[tokio::test]
async fn test_topup_amount_bounds() {
    let (router, pool) = common::setup().await;
    let (token, _) = common::register_customer(&router, "eli@example.com").await;

    for amount in [499, 50_001, 0, -100] {
        let (status, json) = common::request_with_token(
            &router,
            "POST",
            "/api/billing/topup",
            &token,
            Some(json!({ "amount_cents": amount, "payment_method_id": "pm_dummy_visa" })),
        )
        .await;
        assert_eq!(status, 400, "amount {amount} should be rejected");
        assert!(json["error"].is_string());
    }

    for amount in [500, 50_000] {
        let (status, _) = common::request_with_token(
            &router,
            "POST",
            "/api/billing/topup",
            &token,
            Some(json!({ "amount_cents": amount, "payment_method_id": "pm_dummy_visa" })),
        )
        .await;
        assert_eq!(status, 200, "amount {amount} should be accepted");
    }

    common::cleanup(&pool).await;
}

#[tokio::test]
async fn test_topup_without_card_goes_to_checkout() {
    let (router, pool) = common::setup().await;
    let (token, _) = common::register_customer(&router, "fay@example.com").await;

    let (status, json) = common::request_with_token(
        &router,
        "POST",
        "/api/billing/topup",
        &token,
        Some(json!({ "amount_cents": 1000 })),
    )
    .await;

    assert_eq!(status, 200);
    assert_eq!(json["status"], "requires_checkout");
    let session_id = json["session_id"].as_str().unwrap();
    let url = json["checkout_url"].as_str().unwrap();
    assert!(url.starts_with("http://dash.test/billing?session_id="));
    assert!(url.ends_with(session_id));

    // Nothing is credited until the session is confirmed
    let (_, wallet) = common::request_with_token(&router, "GET", "/api/wallet", &token, None).await;
    assert_eq!(wallet["balance_cents"], 0);

    common::cleanup(&pool).await;
}

#[tokio::test]
async fn test_card_needing_authentication_falls_back_to_checkout() {
    let (router, pool) = common::setup().await;
    let (token, _) = common::register_customer(&router, "gus@example.com").await;

    let (status, json) = common::request_with_token(
        &router,
        "POST",
        "/api/billing/topup",
        &token,
        Some(json!({ "amount_cents": 1000, "payment_method_id": "pm_auth_3ds" })),
    )
    .await;

    assert_eq!(status, 200);
    assert_eq!(json["status"], "requires_checkout");
    assert!(json["checkout_url"].is_string());

    common::cleanup(&pool).await;
}

#[tokio::test]
async fn test_declined_card() {
    let (router, pool) = common::setup().await;
    let (token, _) = common::register_customer(&router, "hana@example.com").await;

    let (status, json) = common::request_with_token(
        &router,
        "POST",
        "/api/billing/topup",
        &token,
        Some(json!({ "amount_cents": 1000, "payment_method_id": "pm_declined_card" })),
    )
    .await;

    assert_eq!(status, 402);
    assert!(json["error"].as_str().unwrap().contains("declined"));

    common::cleanup(&pool).await;
}

#[tokio::test]
async fn test_checkout_confirm_is_idempotent() {
    let (router, pool) = common::setup().await;
    let (token, _) = common::register_customer(&router, "igor@example.com").await;

    let (_, json) = common::request_with_token(
        &router,
        "POST",
        "/api/billing/topup",
        &token,
        Some(json!({ "amount_cents": 5000 })),
    )
    .await;
    let session_id = json["session_id"].as_str().unwrap().to_string();

    let (status, json) = common::request_with_token(
        &router,
        "POST",
        "/api/billing/checkout/confirm",
        &token,
        Some(json!({ "session_id": session_id })),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(json["credited"], true);
    assert_eq!(json["balance_cents"], 5000);

    let (status, json) = common::request_with_token(
        &router,
        "POST",
        "/api/billing/checkout/confirm",
        &token,
        Some(json!({ "session_id": session_id })),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(json["credited"], false);
    assert_eq!(json["balance_cents"], 5000);

    let (_, txs) = common::request_with_token(&router, "GET", "/api/wallet/transactions", &token, None).await;
    assert_eq!(txs["total"], 1);

    common::cleanup(&pool).await;
}

#[tokio::test]
async fn test_checkout_confirm_for_another_user() {
    let (router, pool) = common::setup().await;
    let (alice, _) = common::register_customer(&router, "jade@example.com").await;
    let (bob, _) = common::register_customer(&router, "kai@example.com").await;

    let (_, json) = common::request_with_token(
        &router,
        "POST",
        "/api/billing/topup",
        &alice,
        Some(json!({ "amount_cents": 1000 })),
    )
    .await;
    let session_id = json["session_id"].as_str().unwrap();

    let (status, _) = common::request_with_token(
        &router,
        "POST",
        "/api/billing/checkout/confirm",
        &bob,
        Some(json!({ "session_id": session_id })),
    )
    .await;
    assert_eq!(status, 404);

    common::cleanup(&pool).await;
}

#[tokio::test]
async fn test_checkout_confirm_rejects_unissued_session() {
    let (router, pool) = common::setup().await;
    let (token, user_id) = common::register_customer(&router, "kim@example.com").await;

    // An id shaped like a checkout session that was never created
    let forged = format!("cs_dummy_{user_id}_99999999_x");
    let (status, _) = common::request_with_token(
        &router,
        "POST",
        "/api/billing/checkout/confirm",
        &token,
        Some(json!({ "session_id": forged })),
    )
    .await;
    assert_eq!(status, 400);

    let (_, wallet) = common::request_with_token(&router, "GET", "/api/wallet", &token, None).await;
    assert_eq!(wallet["balance_cents"], 0);

    common::cleanup(&pool).await;
}

#[tokio::test]
async fn test_auto_topup_settings() {
    let (router, pool) = common::setup().await;
    let (token, _) = common::register_customer(&router, "lena@example.com").await;

    let (status, json) =
        common::request_with_token(&router, "GET", "/api/billing/auto-topup", &token, None).await;
    assert_eq!(status, 200);
    assert_eq!(json["enabled"], false);

    let (status, json) = common::request_with_token(
        &router,
        "PUT",
        "/api/billing/auto-topup",
        &token,
        Some(json!({
            "enabled": true,
            "threshold_cents": 1000,
            "amount_cents": 2500,
            "payment_method_id": "pm_dummy_visa"
        })),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(json["enabled"], true);
    assert_eq!(json["threshold_cents"], 1000);
    assert_eq!(json["amount_cents"], 2500);
    assert_eq!(json["payment_method_id"], "pm_dummy_visa");

    let (_, wallet) = common::request_with_token(&router, "GET", "/api/wallet", &token, None).await;
    assert_eq!(wallet["auto_topup"]["enabled"], true);

    common::cleanup(&pool).await;
}

#[tokio::test]
async fn test_auto_topup_validation() {
    let (router, pool) = common::setup().await;
    let (token, _) = common::register_customer(&router, "milo@example.com").await;

    for body in [
        json!({ "enabled": false, "threshold_cents": 700, "amount_cents": 2500 }),
        json!({ "enabled": false, "threshold_cents": 1000, "amount_cents": 3000 }),
        json!({ "enabled": true, "threshold_cents": 1000, "amount_cents": 2500 }),
        json!({ "enabled": true, "threshold_cents": 1000, "amount_cents": 2500, "payment_method_id": "  " }),
    ] {
        let (status, _) = common::request_with_token(
            &router,
            "PUT",
            "/api/billing/auto-topup",
            &token,
            Some(body.clone()),
        )
        .await;
        assert_eq!(status, 400, "expected rejection for {body}");
    }

    // Disabled needs no card
    let (status, _) = common::request_with_token(
        &router,
        "PUT",
        "/api/billing/auto-topup",
        &token,
        Some(json!({ "enabled": false, "threshold_cents": 500, "amount_cents": 10000 })),
    )
    .await;
    assert_eq!(status, 200);

    common::cleanup(&pool).await;
}

#[tokio::test]
async fn test_payment_methods_lifecycle() {
    let (router, pool) = common::setup().await;
    let (token, _) = common::register_customer(&router, "nora@example.com").await;

    let (status, json) =
        common::request_with_token(&router, "GET", "/api/payment-methods", &token, None).await;
    assert_eq!(status, 200);
    assert_eq!(json["data"].as_array().unwrap().len(), 0);

    let (status, json) = common::request_with_token(
        &router,
        "POST",
        "/api/payment-methods/setup-intent",
        &token,
        None,
    )
    .await;
    assert_eq!(status, 200);
    assert!(json["client_secret"].as_str().unwrap().starts_with("seti_"));

    let (status, json) =
        common::request_with_token(&router, "GET", "/api/payment-methods", &token, None).await;
    assert_eq!(status, 200);
    assert_eq!(json["data"][0]["last4"], "4242");

    let (status, _) = common::request_with_token(
        &router,
        "PUT",
        "/api/billing/auto-topup",
        &token,
        Some(json!({
            "enabled": true,
            "threshold_cents": 500,
            "amount_cents": 1000,
            "payment_method_id": "pm_dummy_visa"
        })),
    )
    .await;
    assert_eq!(status, 200);

    // Removing the bound card switches auto top-up off
    let (status, json) = common::request_with_token(
        &router,
        "DELETE",
        "/api/payment-methods/pm_dummy_visa",
        &token,
        None,
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(json["auto_topup_disabled"], true);

    let (_, settings) =
        common::request_with_token(&router, "GET", "/api/billing/auto-topup", &token, None).await;
    assert_eq!(settings["enabled"], false);
    assert!(settings["payment_method_id"].is_null());

    common::cleanup(&pool).await;
}

#[tokio::test]
async fn test_webhook_without_signature_is_ignored_by_dummy_provider() {
    let (router, pool) = common::setup().await;

    let req = axum::http::Request::builder()
        .method("POST")
        .uri("/api/webhooks/stripe")
        .header("content-type", "application/json")
        .body(axum::body::Body::from(r#"{"type":"checkout.session.completed"}"#))
        .unwrap();
    let response = tower::ServiceExt::oneshot(router.clone(), req).await.unwrap();
    assert_eq!(response.status(), 200);

    common::cleanup(&pool).await;
}
