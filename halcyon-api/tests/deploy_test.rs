mod common;

use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// One region with a $10 plan and a $50 plan; returns (cheap, expensive).
async fn seed_catalog(pool: &PgPool) -> (Uuid, Uuid) {
    sqlx::query("INSERT INTO regions (id, name, vf_hypervisor_group_id) VALUES ('fra', 'Frankfurt', 3), ('nyc', 'New York', 4)")
        .execute(pool)
        .await
        .unwrap();
    sqlx::query("INSERT INTO regions (id, name, vf_hypervisor_group_id, active) VALUES ('old', 'Retired', 9, false)")
        .execute(pool)
        .await
        .unwrap();

    let mut ids = vec![];
    for (name, package, price) in [("Small", 7_i64, 1000_i64), ("Large", 8, 5000)] {
        let (id,): (Uuid,) = sqlx::query_as(
            r#"INSERT INTO plans (region_id, name, vf_package_id, cpu_cores, memory_mb, disk_gb, bandwidth_gb, price_cents)
               VALUES ('fra', $1, $2, 1, 1024, 25, 1000, $3) RETURNING id"#,
        )
        .bind(name)
        .bind(package)
        .bind(price)
        .fetch_one(pool)
        .await
        .unwrap();
        ids.push(id);
    }
    (ids[0], ids[1])
}

async fn mount_user_lookup(vf: &MockServer, vf_user_id: u64) {
    Mock::given(method("GET"))
        .and(path_regex(r"^/users/\d+/byExtRelation$"))
        .respond_with(ResponseTemplate::new(404))
        .mount(vf)
        .await;
    Mock::given(method("POST"))
        .and(path("/users"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "data": { "id": vf_user_id, "email": "customer@example.com" }
        })))
        .mount(vf)
        .await;
}

#[tokio::test]
async fn test_catalog_reads() {
    let vf = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/media/templates/fromServerPackageSpec/7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [ { "name": "Debian", "templates": [ { "id": 11, "name": "Debian", "version": "12" } ] } ]
        })))
        .expect(1)
        .mount(&vf)
        .await;

    let (router, pool) = common::setup_with_vf(&vf.uri()).await;
    let (small, _) = seed_catalog(&pool).await;
    let (token, _) = common::register_customer(&router, "quentin@example.com").await;

    let (status, json) =
        common::request_with_token(&router, "GET", "/api/deploy/regions", &token, None).await;
    assert_eq!(status, 200);
    let regions = json.as_array().unwrap();
    assert_eq!(regions.len(), 2);
    assert!(regions[0].get("vf_hypervisor_group_id").is_none());

    let (status, json) =
        common::request_with_token(&router, "GET", "/api/deploy/plans?region=fra", &token, None)
            .await;
    assert_eq!(status, 200);
    assert_eq!(json.as_array().unwrap().len(), 2);
    assert_eq!(json[0]["name"], "Small");

    let (_, json) =
        common::request_with_token(&router, "GET", "/api/deploy/plans?region=nyc", &token, None)
            .await;
    assert_eq!(json.as_array().unwrap().len(), 0);

    let uri = format!("/api/deploy/templates?plan_id={}", small);
    let (status, json) = common::request_with_token(&router, "GET", &uri, &token, None).await;
    assert_eq!(status, 200);
    assert_eq!(json[0]["id"], 11);
    assert_eq!(json[0]["group"], "Debian");

    // Cached for the catalog TTL
    let (status, _) = common::request_with_token(&router, "GET", &uri, &token, None).await;
    assert_eq!(status, 200);

    common::cleanup(&pool).await;
}

#[tokio::test]
async fn test_deploy_charges_wallet() {
    let vf = MockServer::start().await;
    mount_user_lookup(&vf, 31).await;
    Mock::given(method("POST"))
        .and(path("/servers"))
        .and(body_partial_json(json!({ "packageId": 7, "userId": 31, "hypervisorId": 3 })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "data": { "id": 900, "ownerId": 31, "name": "pending" }
        })))
        .expect(1)
        .mount(&vf)
        .await;
    Mock::given(method("POST"))
        .and(path("/servers/900/build"))
        .and(body_partial_json(json!({ "operatingSystemId": 11, "hostname": "web-01" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": {} })))
        .expect(1)
        .mount(&vf)
        .await;

    let (router, pool) = common::setup_with_vf(&vf.uri()).await;
    let (small, _) = seed_catalog(&pool).await;
    let (token, user_id) = common::register_customer(&router, "rosa@example.com").await;
    common::fund_wallet(&pool, &user_id, 2500).await;

    let (status, json) = common::request_with_token(
        &router,
        "POST",
        "/api/deploy",
        &token,
        Some(json!({
            "region": "fra",
            "plan_id": small,
            "template_id": 11,
            "hostname": "web-01"
        })),
    )
    .await;
    assert_eq!(status, 201, "deploy failed: {json}");
    assert_eq!(json["server_id"], 900);
    assert_eq!(json["balance_cents"], 1500);
    assert!(json["order_id"].is_string());

    let (_, me) = common::request_with_token(&router, "GET", "/api/auth/me", &token, None).await;
    assert_eq!(me["vf_user_id"], 31);

    let (_, txs) = common::request_with_token(
        &router,
        "GET",
        "/api/wallet/transactions?kind=deploy_charge",
        &token,
        None,
    )
    .await;
    assert_eq!(txs["total"], 1);
    assert_eq!(txs["data"][0]["amount_cents"], -1000);
    assert_eq!(
        txs["data"][0]["source_id"],
        format!("order_{}", json["order_id"].as_str().unwrap())
    );

    let (orders,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM orders WHERE vf_server_id = 900")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(orders, 1);

    common::cleanup(&pool).await;
}

#[tokio::test]
async fn test_deploy_insufficient_balance() {
    let vf = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/servers"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&vf)
        .await;

    let (router, pool) = common::setup_with_vf(&vf.uri()).await;
    let (_, large) = seed_catalog(&pool).await;
    let (token, user_id) = common::register_customer(&router, "sven@example.com").await;
    common::fund_wallet(&pool, &user_id, 4999).await;

    let (status, json) = common::request_with_token(
        &router,
        "POST",
        "/api/deploy",
        &token,
        Some(json!({
            "region": "fra",
            "plan_id": large,
            "template_id": 11,
            "hostname": "big-box"
        })),
    )
    .await;
    assert_eq!(status, 402);
    assert!(json["error"].as_str().unwrap().contains("Insufficient balance"));

    common::cleanup(&pool).await;
}

#[tokio::test]
async fn test_deploy_validation() {
    let (router, pool) = common::setup().await;
    let (small, _) = seed_catalog(&pool).await;
    let (token, user_id) = common::register_customer(&router, "tara@example.com").await;
    common::fund_wallet(&pool, &user_id, 10_000).await;

    let cases = [
        json!({ "region": "fra", "plan_id": small, "template_id": 11, "hostname": "Web-01" }),
        json!({ "region": "fra", "plan_id": small, "template_id": 11, "hostname": "-web" }),
        json!({ "region": "fra", "plan_id": small, "template_id": 11, "hostname": "" }),
        json!({ "region": "fra", "plan_id": small, "template_id": 11, "hostname": " web1 " }),
        json!({ "region": "fra", "plan_id": small, "template_id": 11, "hostname": "a".repeat(64) }),
        json!({ "region": "nyc", "plan_id": small, "template_id": 11, "hostname": "web" }),
        json!({ "region": "fra", "plan_id": Uuid::new_v4(), "template_id": 11, "hostname": "web" }),
    ];
    for body in cases {
        let (status, json) =
            common::request_with_token(&router, "POST", "/api/deploy", &token, Some(body.clone()))
                .await;
        assert_eq!(status, 400, "expected rejection for {body}: {json}");
    }

    common::cleanup(&pool).await;
}

#[tokio::test]
async fn test_failed_build_is_rolled_back() {
    let vf = MockServer::start().await;
    mount_user_lookup(&vf, 32).await;
    Mock::given(method("POST"))
        .and(path("/servers"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "data": { "id": 901, "ownerId": 32 }
        })))
        .mount(&vf)
        .await;
    Mock::given(method("POST"))
        .and(path("/servers/901/build"))
        .respond_with(
            ResponseTemplate::new(422).set_body_json(json!({ "errors": ["Template not available"] })),
        )
        .mount(&vf)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/servers/901"))
        .and(query_param("delay", "5"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&vf)
        .await;

    let (router, pool) = common::setup_with_vf(&vf.uri()).await;
    let (small, _) = seed_catalog(&pool).await;
    let (token, user_id) = common::register_customer(&router, "ugo@example.com").await;
    common::fund_wallet(&pool, &user_id, 2000).await;

    let (status, json) = common::request_with_token(
        &router,
        "POST",
        "/api/deploy",
        &token,
        Some(json!({
            "region": "fra",
            "plan_id": small,
            "template_id": 99,
            "hostname": "web-02"
        })),
    )
    .await;
    assert_eq!(status, 502);
    assert_eq!(json["error"], "Template not available");

    let (_, wallet) = common::request_with_token(&router, "GET", "/api/wallet", &token, None).await;
    assert_eq!(wallet["balance_cents"], 2000);

    common::cleanup(&pool).await;
}

#[tokio::test]
async fn test_failed_order_insert_rolls_back_charge_and_server() {
    let vf = MockServer::start().await;
    mount_user_lookup(&vf, 33).await;
    Mock::given(method("POST"))
        .and(path("/servers"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "data": { "id": 902, "ownerId": 33 }
        })))
        .mount(&vf)
        .await;
    Mock::given(method("POST"))
        .and(path("/servers/902/build"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": { "id": 902 } })))
        .mount(&vf)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/servers/902"))
        .and(query_param("delay", "5"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&vf)
        .await;

    let (router, pool) = common::setup_with_vf(&vf.uri()).await;
    let (small, _) = seed_catalog(&pool).await;
    let (token, user_id) = common::register_customer(&router, "yara@example.com").await;
    common::fund_wallet(&pool, &user_id, 2000).await;

    // Make the orders insert fail after the wallet has been debited
    sqlx::query("ALTER TABLE orders DROP CONSTRAINT IF EXISTS orders_reject_hostname")
        .execute(&pool)
        .await
        .unwrap();
    sqlx::query("ALTER TABLE orders ADD CONSTRAINT orders_reject_hostname CHECK (hostname <> 'doomed')")
        .execute(&pool)
        .await
        .unwrap();

    let (status, _) = common::request_with_token(
        &router,
        "POST",
        "/api/deploy",
        &token,
        Some(json!({
            "region": "fra",
            "plan_id": small,
            "template_id": 11,
            "hostname": "doomed"
        })),
    )
    .await;

    sqlx::query("ALTER TABLE orders DROP CONSTRAINT orders_reject_hostname")
        .execute(&pool)
        .await
        .unwrap();
    assert_eq!(status, 500);

    let (_, wallet) = common::request_with_token(&router, "GET", "/api/wallet", &token, None).await;
    assert_eq!(wallet["balance_cents"], 2000);
    let (_, txs) = common::request_with_token(&router, "GET", "/api/wallet/transactions", &token, None).await;
    assert_eq!(txs["total"], 0);

    common::cleanup(&pool).await;
}
