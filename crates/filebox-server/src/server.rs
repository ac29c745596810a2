//! HTTP server for the file endpoints
//!
//! Owner-scoped routes require the `X-Owner-Id` header; `/share/{id}` and
//! `/health` are public.

use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderName, Method};
use axum::routing::{get, post, put};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::auth::OWNER_HEADER;
use crate::routes;
use crate::state::AppState;

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }

    let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static(OWNER_HEADER),
        ])
}

/// Create the HTTP router
pub fn create_router(state: AppState, cors_origins: &[String], max_upload_bytes: usize) -> Router {
    Router::new()
        // Health
        .route("/health", get(routes::health::health))
        // Files
        .route("/files", get(routes::files::list_files))
        .route(
            "/files/{id}",
            get(routes::files::get_file).put(routes::files::rename),
        )
        .route("/upload", post(routes::files::upload))
        .route("/rename", put(routes::files::rename_by_query))
        .route("/search", get(routes::files::search))
        // Share links
        .route("/share", post(routes::share::share))
        .route(
            "/share/{id}",
            get(routes::share::access).delete(routes::share::unshare),
        )
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(cors_layer(cors_origins))
        .with_state(state)
}

/// Start the HTTP server
pub async fn start_server(router: Router, port: u16) -> std::io::Result<()> {
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await
}
