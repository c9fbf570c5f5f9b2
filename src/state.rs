use std::sync::Arc;

use diesel::{
    pg::PgConnection,
    r2d2::{ConnectionManager, PooledConnection},
};

use crate::{
    auth::jwt::JwtService,
    auth::oauth::OAuthProviders,
    config::AppConfig,
    db::PgPool,
    error::{AppError, AppResult},
    mailer::Mailer,
    parse::TextExtractor,
    storage::FileStorage,
};

type PgPooledConnection = PooledConnection<ConnectionManager<PgConnection>>;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<AppConfig>,
    pub storage: Arc<dyn FileStorage>,
    pub jwt: JwtService,
    pub oauth: Arc<dyn OAuthProviders>,
    pub extractor: Arc<dyn TextExtractor>,
    pub mailer: Arc<dyn Mailer>,
}

impl AppState {
    pub fn new(
        pool: PgPool,
        config: AppConfig,
        storage: Arc<dyn FileStorage>,
        jwt: JwtService,
        oauth: Arc<dyn OAuthProviders>,
        extractor: Arc<dyn TextExtractor>,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        Self {
            pool,
            config: Arc::new(config),
            storage,
            jwt,
            oauth,
            extractor,
            mailer,
        }
    }

    pub fn db(&self) -> AppResult<PgPooledConnection> {
        self.pool
            .get()
            .map_err(|err| AppError::internal(format!("database pool error: {err}")))
    }
}
