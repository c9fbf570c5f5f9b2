use std::sync::Arc;

use anyhow::Context;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use tokio::net::TcpListener;
use tokio::signal;
use tracing_subscriber::EnvFilter;

use researchhub::{
    auth::jwt::JwtService, auth::oauth::HttpOAuthProviders, config::AppConfig, db, mailer,
    parse::HttpTextExtractor, routes, state::AppState, storage::LocalStorage,
};

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env()?;
    tracing::info!(
        component = "api",
        database_url = %config.redacted_database_url(),
        pool_size = config.database_max_pool_size,
        storage_path = %config.storage_path.display(),
        email_enabled = config.email_api_key.is_some(),
        parser_enabled = config.parser_endpoint.is_some(),
        "loaded configuration"
    );

    let pool = db::init_pool_with_size(&config.database_url, config.database_max_pool_size)?;
    run_migrations(&pool).await?;

    let storage = LocalStorage::new(config.storage_path.clone());
    storage
        .validate()
        .await
        .context("storage directory failed the startup round-trip check")?;

    let jwt = JwtService::from_config(&config)?;
    let oauth = Arc::new(HttpOAuthProviders::from_config(&config));
    let extractor = Arc::new(HttpTextExtractor::from_config(&config));
    let mail = mailer::from_config(&config);

    let bind_addr = format!("{}:{}", config.server_host, config.server_port);
    let state = AppState::new(
        pool,
        config,
        Arc::new(storage),
        jwt,
        oauth,
        extractor,
        mail,
    );
    let router = routes::create_router(state);

    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    tracing::info!(addr = %bind_addr, "api server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = signal::ctrl_c().await;
            tracing::info!("api server received shutdown signal");
        })
        .await?;

    Ok(())
}

async fn run_migrations(pool: &db::PgPool) -> anyhow::Result<()> {
    let pool = pool.clone();
    tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
        let mut conn = pool.get().context("failed to acquire connection")?;
        conn.run_pending_migrations(MIGRATIONS)
            .map_err(|err| anyhow::anyhow!("failed to run migrations: {err}"))?;
        Ok(())
    })
    .await
    .context("migration task panicked")?
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
