use std::collections::HashMap;
use std::env;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::PgConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use http_body_util::BodyExt;
use once_cell::sync::Lazy;
use researchhub::auth::jwt::JwtService;
use researchhub::auth::oauth::{OAuthError, OAuthProfile, OAuthProviders};
use researchhub::config::AppConfig;
use researchhub::db::{self, PgPool};
use researchhub::mailer::Mailer;
use researchhub::models::NewUser;
use researchhub::parse::TextExtractor;
use researchhub::routes;
use researchhub::state::AppState;
use researchhub::storage::FileStorage;
use serde::Serialize;
use tokio::sync::Mutex;
use tower::util::ServiceExt;
use uuid::Uuid;

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

static DB_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

#[derive(Default)]
pub struct FakeStorage {
    objects: Mutex<HashMap<String, Vec<u8>>>,
}

#[async_trait]
impl FileStorage for FakeStorage {
    async fn put_object(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
        let mut guard = self.objects.lock().await;
        guard.insert(key.to_string(), bytes);
        Ok(())
    }

    async fn get_object(&self, key: &str) -> Result<Vec<u8>> {
        let guard = self.objects.lock().await;
        guard
            .get(key)
            .cloned()
            .ok_or_else(|| anyhow!("object {key} missing"))
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        let mut guard = self.objects.lock().await;
        guard.remove(key);
        Ok(())
    }
}

impl FakeStorage {
    #[allow(dead_code)]
    pub async fn get(&self, key: &str) -> Option<Vec<u8>> {
        let guard = self.objects.lock().await;
        guard.get(key).cloned()
    }

    #[allow(dead_code)]
    pub async fn object_count(&self) -> usize {
        let guard = self.objects.lock().await;
        guard.len()
    }
}

/// Mirrors the production fallback: text payloads decode locally, anything
/// else yields no parsed text.
pub struct FakeExtractor;

#[async_trait]
impl TextExtractor for FakeExtractor {
    async fn extract(&self, bytes: &[u8], mime_type: &str) -> Result<Option<String>> {
        if mime_type.starts_with("text/") {
            Ok(Some(String::from_utf8_lossy(bytes).into_owned()))
        } else {
            Ok(None)
        }
    }
}

#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send_welcome(&self, email: &str, name: &str) -> Result<()> {
        let mut guard = self.sent.lock().await;
        guard.push((email.to_string(), name.to_string()));
        Ok(())
    }
}

impl RecordingMailer {
    #[allow(dead_code)]
    pub async fn sent_count(&self) -> usize {
        let guard = self.sent.lock().await;
        guard.len()
    }
}

/// Resolves codes of the form `email:Display Name` so tests can sign in
/// arbitrary identities without a real provider round trip.
pub struct FakeOAuth;

#[async_trait]
impl OAuthProviders for FakeOAuth {
    async fn exchange_code(&self, provider: &str, code: &str) -> Result<OAuthProfile, OAuthError> {
        if provider != "google" && provider != "github" {
            return Err(OAuthError::UnknownProvider(provider.to_string()));
        }
        let (email, name) = code
            .split_once(':')
            .ok_or_else(|| OAuthError::Exchange("invalid code".to_string()))?;
        if email.is_empty() {
            return Err(OAuthError::MissingEmail);
        }
        Ok(OAuthProfile {
            email: email.to_string(),
            name: name.to_string(),
        })
    }
}

pub struct TestApp {
    pub state: AppState,
    router: Router,
    storage: Arc<FakeStorage>,
    mailer: Arc<RecordingMailer>,
}

impl TestApp {
    pub async fn new() -> Result<Self> {
        let database_url = env::var("TEST_DATABASE_URL")
            .context("TEST_DATABASE_URL must be set for integration tests")?;

        let config = AppConfig {
            database_url: database_url.clone(),
            database_max_pool_size: db::DEFAULT_MAX_POOL_SIZE,
            server_host: "127.0.0.1".to_string(),
            server_port: 0,
            jwt_secret: "test-secret".to_string(),
            jwt_issuer: "test-issuer".to_string(),
            jwt_audience: "test-audience".to_string(),
            jwt_expiry_minutes: 60,
            google_client_id: None,
            google_client_secret: None,
            github_client_id: None,
            github_client_secret: None,
            email_api_key: None,
            email_endpoint: None,
            email_from: "noreply@test".to_string(),
            parser_api_key: None,
            parser_endpoint: None,
            storage_path: "/tmp/unused".into(),
            cors_allowed_origin: None,
        };

        let pool = db::init_pool_with_size(&config.database_url, config.database_max_pool_size)?;
        prepare_database(&pool).await?;

        let storage = Arc::new(FakeStorage::default());
        let mailer = Arc::new(RecordingMailer::default());
        let storage_for_state: Arc<dyn FileStorage> = storage.clone();
        let mailer_for_state: Arc<dyn Mailer> = mailer.clone();
        let jwt = JwtService::from_config(&config)?;
        let state = AppState::new(
            pool.clone(),
            config,
            storage_for_state,
            jwt,
            Arc::new(FakeOAuth),
            Arc::new(FakeExtractor),
            mailer_for_state,
        );
        let router = routes::create_router(state.clone());

        Ok(Self {
            state,
            router,
            storage,
            mailer,
        })
    }

    pub async fn cleanup(&self) -> Result<()> {
        let pool = self.state.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let mut conn = pool
                .get()
                .map_err(|err| anyhow!("failed to get cleanup connection: {err}"))?;
            truncate_all(&mut conn)?;
            Ok(())
        })
        .await
        .context("cleanup task panicked")?
    }

    #[allow(dead_code)]
    pub fn storage(&self) -> Arc<FakeStorage> {
        self.storage.clone()
    }

    #[allow(dead_code)]
    pub fn mailer(&self) -> Arc<RecordingMailer> {
        self.mailer.clone()
    }

    #[allow(dead_code)]
    pub async fn insert_user(&self, email: &str, name: &str, provider: &str) -> Result<Uuid> {
        let email = email.to_string();
        let name = name.to_string();
        let provider = provider.to_string();
        self.with_conn(move |conn| {
            let user = NewUser {
                id: Uuid::new_v4(),
                email,
                name,
                provider,
            };
            diesel::insert_into(researchhub::schema::users::table)
                .values(&user)
                .execute(conn)
                .context("failed to insert user")?;
            Ok(user.id)
        })
        .await
    }

    #[allow(dead_code)]
    pub fn token_for(&self, user_id: Uuid, email: &str, name: &str) -> Result<String> {
        self.state
            .jwt
            .generate_token(user_id, email, name)
            .map_err(|err| anyhow!("failed to mint token: {err}"))
    }

    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        self.send_json(Method::POST, path, payload, token).await
    }

    #[allow(dead_code)]
    pub async fn patch_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        self.send_json(Method::PATCH, path, payload, token).await
    }

    async fn send_json<T: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        let body = serde_json::to_vec(payload)?;
        let mut builder = Request::builder()
            .method(method)
            .uri(path)
            .header("content-type", "application/json");
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let request = builder.body(Body::from(body))?;
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }

    pub async fn get(&self, path: &str, token: Option<&str>) -> Result<hyper::Response<Body>> {
        let mut builder = Request::builder().method(Method::GET).uri(path);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let request = builder.body(Body::empty())?;
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }

    #[allow(dead_code)]
    pub async fn delete(&self, path: &str, token: Option<&str>) -> Result<hyper::Response<Body>> {
        let builder = Request::builder().method(Method::DELETE).uri(path);
        let builder = if let Some(token) = token {
            builder.header("authorization", format!("Bearer {token}"))
        } else {
            builder
        };
        let request = builder.body(Body::empty())?;
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }

    #[allow(dead_code)]
    pub async fn upload_document(
        &self,
        report_id: Uuid,
        filename: &str,
        content_type: &str,
        data: &[u8],
        tags_json: Option<&str>,
        token: &str,
    ) -> Result<hyper::Response<Body>> {
        let boundary = format!("boundary-{}", Uuid::new_v4());
        let mut body = Vec::new();
        body.extend(format!("--{boundary}\r\n").as_bytes());
        body.extend(
            format!(
                "Content-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\n",
                filename
            )
            .as_bytes(),
        );
        body.extend(format!("Content-Type: {}\r\n\r\n", content_type).as_bytes());
        body.extend(data);
        body.extend(b"\r\n");

        if let Some(tags) = tags_json {
            body.extend(format!("--{boundary}\r\n").as_bytes());
            body.extend(b"Content-Disposition: form-data; name=\"tags\"\r\n\r\n");
            body.extend(tags.as_bytes());
            body.extend(b"\r\n");
        }

        body.extend(format!("--{boundary}--\r\n").as_bytes());

        let builder = Request::builder()
            .method(Method::POST)
            .uri(format!("/api/reports/{report_id}/documents"))
            .header(
                "content-type",
                format!("multipart/form-data; boundary={boundary}"),
            )
            .header("authorization", format!("Bearer {token}"));

        let request = builder.body(Body::from(body))?;
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }

    #[allow(dead_code)]
    pub async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut PgConnection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.state.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool
                .get()
                .map_err(|err| anyhow!("failed to get database connection: {err}"))?;
            f(&mut conn)
        })
        .await
        .context("connection task panicked")?
    }
}

pub async fn acquire_db_lock() -> tokio::sync::MutexGuard<'static, ()> {
    DB_LOCK.lock().await
}

pub async fn body_to_vec(body: Body) -> Result<Vec<u8>> {
    let collected = body
        .collect()
        .await
        .map_err(|err| anyhow!("failed to read response body: {err}"))?;
    Ok(collected.to_bytes().to_vec())
}

#[allow(dead_code)]
pub async fn status_and_error(response: hyper::Response<Body>) -> Result<(StatusCode, String)> {
    let status = response.status();
    let body = body_to_vec(response.into_body()).await?;
    #[derive(serde::Deserialize)]
    struct ErrorBody {
        error: String,
    }
    let parsed: ErrorBody = serde_json::from_slice(&body)?;
    Ok((status, parsed.error))
}

async fn prepare_database(pool: &PgPool) -> Result<()> {
    let pool = pool.clone();
    tokio::task::spawn_blocking(move || -> Result<()> {
        let mut conn = pool
            .get()
            .map_err(|err| anyhow!("failed to acquire connection: {err}"))?;
        conn.run_pending_migrations(MIGRATIONS)
            .map_err(|err| anyhow!("failed to run migrations: {err}"))?;
        truncate_all(&mut conn)?;
        Ok(())
    })
    .await
    .context("migration task panicked")?
}

fn truncate_all(conn: &mut PgConnection) -> Result<()> {
    conn.batch_execute("TRUNCATE TABLE tags, documents, reports, users RESTART IDENTITY CASCADE;")
        .context("failed to truncate tables")?;
    Ok(())
}
