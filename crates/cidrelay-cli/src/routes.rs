//! HTTP route definitions

use crate::{handlers, middleware, AppState};
use axum::{
    extract::DefaultBodyLimit,
    http::HeaderValue,
    middleware as axum_middleware,
    routing::{get, head, post},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

/// Create the main router
pub fn create_router(state: Arc<AppState>) -> Router {
    let router = Router::new()
        // Service endpoints
        .route("/", head(handlers::health_check))
        .route("/health", get(handlers::gateway_health))
        // Gateway selection
        .route(
            "/gateway",
            get(handlers::get_gateway).post(handlers::set_gateway),
        )
        // Metadata and directories
        .route("/metadata", get(handlers::get_metadata))
        .route("/fetch/{cid}", get(handlers::fetch_cid))
        .route("/ls", get(handlers::list_directory))
        .route("/navigate", get(handlers::navigate))
        // Content streaming
        .route("/preview", get(handlers::preview))
        .route("/preview-file", get(handlers::preview_file))
        .route("/download", get(handlers::download))
        .route("/content", get(handlers::content))
        .route("/preview-private/{cid}", get(handlers::preview_private))
        // Uploads
        .route("/upload", post(handlers::upload))
        .route("/upload-folder", post(handlers::upload_folder))
        .layer(axum_middleware::from_fn(middleware::logging_middleware));

    let router = if state.config.cors_enabled {
        router.layer(cors_layer(&state.config.cors_origins))
    } else {
        router
    };

    router
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(state.config.max_body_size))
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.iter().any(|o| o == "*") {
        AllowOrigin::from(Any)
    } else {
        AllowOrigin::list(
            origins
                .iter()
                .filter_map(|o| HeaderValue::from_str(o).ok()),
        )
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers(Any)
}
