mod common;

use serde_json::json;

#[tokio::test]
async fn test_audit_logs_empty() {
    let (router, pool) = common::setup().await;
    let token = common::login_admin(&router).await;

    // Login itself generates an audit entry, but let's verify the endpoint works
    let (status, json) =
        common::request_with_token(&router, "GET", "/api/admin/audit-logs", &token, None).await;

    assert_eq!(status, 200);
    assert!(json["data"].is_array());
    assert!(json["total"].is_number());
    assert_eq!(json["page"], 1);

    common::cleanup(&pool).await;
}

#[tokio::test]
async fn test_audit_logs_after_login() {
    let (router, pool) = common::setup().await;
    let token = common::login_admin(&router).await;

    let (status, json) = common::request_with_token(
        &router,
        "GET",
        "/api/admin/audit-logs?action=login",
        &token,
        None,
    )
    .await;

    assert_eq!(status, 200);
    let entries = json["data"].as_array().unwrap();
    assert!(!entries.is_empty(), "Login should produce an audit entry");

    let entry = &entries[0];
    assert_eq!(entry["action"], "login");
    assert_eq!(entry["resource"], "user");
    assert_eq!(entry["user_email"], "admin@test.local");

    common::cleanup(&pool).await;
}

#[tokio::test]
async fn test_audit_logs_record_role_change() {
    let (router, pool) = common::setup().await;
    let token = common::login_admin(&router).await;
    let (_, user_id) = common::register_customer(&router, "judy@example.com").await;

    let (status, _) = common::request_with_token(
        &router,
        "PUT",
        &format!("/api/admin/users/{}/role", user_id),
        &token,
        Some(json!({ "role": "admin" })),
    )
    .await;
    assert_eq!(status, 200);

    let (status, json) = common::request_with_token(
        &router,
        "GET",
        &format!("/api/admin/audit-logs?resource=user&resource_id={}&action=set_role", user_id),
        &token,
        None,
    )
    .await;

    assert_eq!(status, 200);
    assert_eq!(json["total"], 1);
    let entry = &json["data"][0];
    assert_eq!(entry["details"]["email"], "judy@example.com");
    assert_eq!(entry["details"]["role"], "admin");

    common::cleanup(&pool).await;
}

#[tokio::test]
async fn test_audit_logs_keep_adjustment_reason() {
    let (router, pool) = common::setup().await;
    let token = common::login_admin(&router).await;
    let (_, user_id) = common::register_customer(&router, "karl@example.com").await;

    let (status, _) = common::request_with_token(
        &router,
        "POST",
        "/api/admin/wallet/adjust",
        &token,
        Some(json!({
            "user_id": user_id,
            "amount_cents": 1500,
            "reason": "Goodwill credit for outage"
        })),
    )
    .await;
    assert_eq!(status, 200);

    let (status, json) = common::request_with_token(
        &router,
        "GET",
        "/api/admin/audit-logs?resource=wallet",
        &token,
        None,
    )
    .await;

    assert_eq!(status, 200);
    assert_eq!(json["total"], 1);
    let entry = &json["data"][0];
    assert_eq!(entry["action"], "adjust_balance");
    assert_eq!(entry["resource_id"], user_id);
    assert_eq!(entry["reason"], "Goodwill credit for outage");
    assert_eq!(entry["details"]["amount_cents"], 1500);

    common::cleanup(&pool).await;
}

#[tokio::test]
async fn test_audit_logs_requires_admin() {
    let (router, pool) = common::setup().await;
    let (customer_token, _) = common::register_customer(&router, "liam@example.com").await;

    let (status, _) = common::request_with_token(
        &router,
        "GET",
        "/api/admin/audit-logs",
        &customer_token,
        None,
    )
    .await;
    assert_eq!(status, 403);

    common::cleanup(&pool).await;
}

#[tokio::test]
async fn test_audit_logs_pagination() {
    let (router, pool) = common::setup().await;
    let token = common::login_admin(&router).await;
    let (_, user_id) = common::register_customer(&router, "mona@example.com").await;

    // Five adjustments, five audit entries
    for i in 1..=5 {
        let (status, _) = common::request_with_token(
            &router,
            "POST",
            "/api/admin/wallet/adjust",
            &token,
            Some(json!({
                "user_id": user_id,
                "amount_cents": 100 * i,
                "reason": format!("Credit {i}")
            })),
        )
        .await;
        assert_eq!(status, 200);
    }

    let (status, json) = common::request_with_token(
        &router,
        "GET",
        "/api/admin/audit-logs?resource=wallet&per_page=2&page=1",
        &token,
        None,
    )
    .await;

    assert_eq!(status, 200);
    assert_eq!(json["data"].as_array().unwrap().len(), 2);
    assert_eq!(json["total"], 5);
    assert_eq!(json["page"], 1);
    assert_eq!(json["per_page"], 2);

    let (status, json) = common::request_with_token(
        &router,
        "GET",
        "/api/admin/audit-logs?resource=wallet&per_page=2&page=3",
        &token,
        None,
    )
    .await;

    assert_eq!(status, 200);
    assert_eq!(json["data"].as_array().unwrap().len(), 1);
    assert_eq!(json["page"], 3);

    common::cleanup(&pool).await;
}
