use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use sap_assist::auth::PasswordCipher;
use sap_assist::config::AppConfig;
use sap_assist::db;
use sap_assist::ratelimit::build_rate_limiter;
use sap_assist::repository::PgRepository;
use sap_assist::routes::create_router;
use sap_assist::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env()?;
    tracing::info!(
        database_url = %config.redacted_database_url(),
        pool_size = config.database_max_pool_size,
        server_host = %config.server_host,
        server_port = config.server_port,
        nlp_service_url = %config.nlp_service_url,
        sap_base_url = %config.sap_base_url,
        sap_verify_tls = config.sap_verify_tls,
        rate_limiter = ?config.rate_limit.mode,
        test_login_enabled = config.enable_test_login,
        "loaded configuration"
    );

    let pool = db::init_pool_with_size(
        &config.database_url,
        config.database_max_pool_size,
        config.database_min_idle,
    )?;
    let applied = db::run_migrations(&pool)?;
    tracing::info!(applied, "database migrations complete");

    let cipher = PasswordCipher::new(&config.encryption_key)?;
    let repository = Arc::new(PgRepository::new(pool, cipher));
    let rate_limiter = build_rate_limiter(&config.rate_limit)?;

    let listen_addr = format!("{}:{}", config.server_host, config.server_port);
    let state = AppState::new(config, repository, rate_limiter)?;
    let router = create_router(state)?;

    let listener = TcpListener::bind(listen_addr.as_str()).await?;
    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
