mod common;

use serde_json::json;

#[tokio::test]
async fn test_list_users() {
    let (router, pool) = common::setup().await;
    let token = common::login_admin(&router).await;

    let (status, json) =
        common::request_with_token(&router, "GET", "/api/admin/users", &token, None).await;

    assert_eq!(status, 200);
    assert_eq!(json["total"], 1); // Just the seeded admin
    assert_eq!(json["page"], 1);
    assert!(json["data"].is_array());
    assert_eq!(json["data"].as_array().unwrap().len(), 1);

    common::cleanup(&pool).await;
}

#[tokio::test]
async fn test_list_users_filters() {
    let (router, pool) = common::setup().await;
    let token = common::login_admin(&router).await;
    common::register_customer(&router, "erin@example.com").await;
    common::register_customer(&router, "frank@example.org").await;

    let (status, json) = common::request_with_token(
        &router,
        "GET",
        "/api/admin/users?role=customer",
        &token,
        None,
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(json["total"], 2);

    let (status, json) = common::request_with_token(
        &router,
        "GET",
        "/api/admin/users?search=EXAMPLE.ORG",
        &token,
        None,
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(json["total"], 1);
    assert_eq!(json["data"][0]["email"], "frank@example.org");

    common::cleanup(&pool).await;
}

#[tokio::test]
async fn test_update_user_role() {
    let (router, pool) = common::setup().await;
    let token = common::login_admin(&router).await;
    let (_, user_id) = common::register_customer(&router, "grace@example.com").await;

    let (status, json) = common::request_with_token(
        &router,
        "PUT",
        &format!("/api/admin/users/{}/role", user_id),
        &token,
        Some(json!({ "role": "admin" })),
    )
    .await;

    assert_eq!(status, 200);
    assert_eq!(json["role"], "admin");

    let (status, json) = common::request_with_token(
        &router,
        "GET",
        &format!("/api/admin/users/{}", user_id),
        &token,
        None,
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(json["role"], "admin");

    common::cleanup(&pool).await;
}

#[tokio::test]
async fn test_invalid_role_rejected() {
    let (router, pool) = common::setup().await;
    let token = common::login_admin(&router).await;
    let (_, user_id) = common::register_customer(&router, "heidi@example.com").await;

    let (status, _) = common::request_with_token(
        &router,
        "PUT",
        &format!("/api/admin/users/{}/role", user_id),
        &token,
        Some(json!({ "role": "operator" })),
    )
    .await;

    assert_eq!(status, 400);

    common::cleanup(&pool).await;
}

#[tokio::test]
async fn test_admin_cannot_demote_self() {
    let (router, pool) = common::setup().await;
    let token = common::login_admin(&router).await;

    let (_, me) = common::request_with_token(&router, "GET", "/api/auth/me", &token, None).await;
    let my_id = me["id"].as_str().unwrap();

    let (status, json) = common::request_with_token(
        &router,
        "PUT",
        &format!("/api/admin/users/{}/role", my_id),
        &token,
        Some(json!({ "role": "customer" })),
    )
    .await;

    assert_eq!(status, 400);
    assert!(json["error"].as_str().unwrap().contains("own admin role"));

    common::cleanup(&pool).await;
}

#[tokio::test]
async fn test_customer_cannot_list_users() {
    let (router, pool) = common::setup().await;
    let (token, _) = common::register_customer(&router, "ivan@example.com").await;

    let (status, _) =
        common::request_with_token(&router, "GET", "/api/admin/users", &token, None).await;
    assert_eq!(status, 403);

    common::cleanup(&pool).await;
}

#[tokio::test]
async fn test_get_unknown_user() {
    let (router, pool) = common::setup().await;
    let token = common::login_admin(&router).await;

    let (status, _) = common::request_with_token(
        &router,
        "GET",
        "/api/admin/users/00000000-0000-0000-0000-000000000001",
        &token,
        None,
    )
    .await;
    assert_eq!(status, 404);

    common::cleanup(&pool).await;
}
