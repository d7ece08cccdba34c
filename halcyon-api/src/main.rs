use std::sync::Arc;

use halcyon_api::auth;
use halcyon_api::auto_topup;
use halcyon_api::cache::QueryCache;
use halcyon_api::config;
use halcyon_api::openapi;
use halcyon_api::payments;
use halcyon_api::routes;
use halcyon_api::virtfusion::VirtFusionClient;

use sqlx::postgres::PgPoolOptions;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

const DEFAULT_ADMIN_EMAIL: &str = "admin@halcyon.local";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cfg = config::Config::from_env();

    let pool = PgPoolOptions::new()
        .max_connections(cfg.db_max_conn)
        .connect(&cfg.database_url)
        .await?;

    tracing::info!("Connected to database");

    sqlx::migrate::Migrator::new(std::path::Path::new("./migrations"))
        .await?
        .run(&pool)
        .await?;
    tracing::info!("Migrations applied");

    // Seed admin user if users table is empty
    let user_count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
        .fetch_one(&pool)
        .await?;

    if user_count.0 == 0 {
        let password_hash = auth::hash_password("changeme")?;
        sqlx::query(
            "INSERT INTO users (email, password_hash, name, role, force_password_change) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(DEFAULT_ADMIN_EMAIL)
        .bind(&password_hash)
        .bind("Admin")
        .bind(auth::ROLE_ADMIN)
        .bind(true)
        .execute(&pool)
        .await?;
        tracing::info!("Seeded default admin user: {DEFAULT_ADMIN_EMAIL} (password: changeme)");
    }

    let redis_client = redis::Client::open(cfg.redis_url.as_str())?;
    let redis_conn = redis::aio::ConnectionManager::new(redis_client).await?;
    tracing::info!("Connected to Redis");

    let http_client = reqwest::Client::new();
    let addr = format!("{}:{}", cfg.listen_host, cfg.listen_port);

    if cfg.virtfusion_token.is_empty() {
        tracing::warn!("VIRTFUSION_TOKEN not set, control-plane calls will be rejected");
    }
    let vf = VirtFusionClient::new(
        http_client.clone(),
        &cfg.virtfusion_url,
        &cfg.virtfusion_token,
        cfg.virtfusion_timeout_secs,
    );
    let payments: Arc<dyn payments::PaymentProvider> =
        Arc::from(payments::create_provider(http_client.clone(), &cfg)?);

    let app_state = routes::AppState {
        db: pool,
        api_key: cfg.api_key.clone(),
        redis: redis_conn.clone(),
        rate_limit_requests: cfg.rate_limit_requests,
        rate_limit_window: cfg.rate_limit_window,
        http_client,
        jwt_secret: cfg.jwt_secret.clone(),
        jwt_expiry_hours: cfg.jwt_expiry_hours,
        vf,
        payments: payments.clone(),
        cache: QueryCache::new(redis_conn.clone()),
        app_url: cfg.app_url.clone(),
        stats_ttl_secs: cfg.stats_ttl_secs,
        catalog_ttl_secs: cfg.catalog_ttl_secs,
    };

    tokio::spawn(auto_topup::run(
        app_state.db.clone(),
        redis_conn,
        payments,
        cfg.auto_topup_interval_secs,
    ));

    let app = routes::app(app_state)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", openapi::ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<std::net::SocketAddr>())
        .await?;

    Ok(())
}
