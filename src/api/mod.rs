//! REST API module using Axum
//!
//! Read-only chart feed for remote dashboards:
//! - `GET /api/v1/health` - loop state and sample count
//! - `GET /api/v1/chart`  - latest rendered chart frame

pub mod handlers;

pub use handlers::ApiState;

use axum::http::{header, Method};
use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// v1 API routes.
pub fn api_routes(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(handlers::get_health))
        .route("/chart", get(handlers::get_chart))
        .with_state(state)
}

/// Create the complete application router.
pub fn create_app(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .nest("/api/v1", api_routes(state))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
