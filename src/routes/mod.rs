use axum::http::HeaderValue;
use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{delete, get, post},
    Router,
};
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::{auth::AuthenticatedUser, state::AppState};

pub mod auth;
pub mod documents;
pub mod health;
pub mod reports;
pub mod tags;

pub fn create_router(state: AppState) -> Router<()> {
    let cors = if let Some(origins) = state.config.cors_allowed_origin.as_ref() {
        let headers: Vec<HeaderValue> = origins
            .split(',')
            .filter_map(|value| {
                let trimmed = value.trim();
                (!trimmed.is_empty()).then(|| {
                    trimmed
                        .parse::<HeaderValue>()
                        .expect("invalid CORS allowed origin")
                })
            })
            .collect();

        CorsLayer::new()
            .allow_origin(AllowOrigin::list(headers))
            .allow_methods(tower_http::cors::AllowMethods::mirror_request())
            .allow_headers(tower_http::cors::AllowHeaders::mirror_request())
            .allow_credentials(true)
    } else {
        CorsLayer::new()
            .allow_origin(AllowOrigin::mirror_request())
            .allow_methods(tower_http::cors::AllowMethods::mirror_request())
            .allow_headers(tower_http::cors::AllowHeaders::mirror_request())
            .allow_credentials(true)
    };

    let reports_routes = Router::new()
        .route("/", get(reports::list_reports).post(reports::create_report))
        .route(
            "/:id",
            get(reports::get_report)
                .patch(reports::update_report)
                .delete(reports::delete_report),
        )
        .route(
            "/:id/documents",
            get(documents::list_report_documents).post(documents::upload_document),
        );

    let documents_routes = Router::new()
        .route(
            "/:id",
            get(documents::get_document).delete(documents::delete_document),
        )
        .route("/:id/download", get(documents::download_document))
        .route("/:id/tags", post(tags::attach_tag))
        .route("/:id/tags/:tag_id", delete(tags::detach_tag));

    let protected_state = state.clone();
    let protected_routes = Router::new()
        .nest("/api/reports", reports_routes)
        .nest("/api/documents", documents_routes)
        .route("/api/auth/me", get(auth::me))
        .layer(middleware::from_extractor_with_state::<AuthenticatedUser, _>(protected_state));

    Router::new()
        .merge(protected_routes)
        .route("/api/auth/signin", post(auth::signin))
        .route("/api/health", get(health::health_check))
        .with_state(state)
        .layer(cors)
        .layer(DefaultBodyLimit::max(1024 * 1024 * 64))
}
