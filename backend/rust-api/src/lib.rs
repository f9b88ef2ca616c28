use axum::{
    http::{header, Method},
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

pub mod config;
pub mod extractors;
pub mod handlers;
pub mod metrics;
pub mod middlewares;
pub mod models;
pub mod offline;
pub mod services;
pub mod utils;

pub use config::Config;
pub use services::AppState;

pub fn create_router(app_state: Arc<AppState>) -> Router {
    // Offline clients run from arbitrary origins (installed apps, file://)
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_origin(tower_http::cors::Any);

    Router::new()
        .route("/health", get(handlers::health_check))
        .route(
            "/metrics",
            get(handlers::metrics_handler).layer(middleware::from_fn_with_state(
                app_state.clone(),
                handlers::metrics_auth_middleware,
            )),
        )
        .nest("/api/sync", sync_routes().layer(cors.clone()))
        .nest("/api/ai", ai_routes().layer(cors))
        .with_state(app_state)
        .layer(middleware::from_fn(
            middlewares::metrics::metrics_middleware,
        ))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
}

fn sync_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/{collection}",
            post(handlers::sync::sync_record).get(handlers::sync::list_records),
        )
        .route("/{collection}/{id}", get(handlers::sync::get_record))
}

fn ai_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/quiz", post(handlers::ai::generate_quiz))
        .route("/feedback", post(handlers::ai::feedback))
        .route("/explain", post(handlers::ai::explain))
        .route("/chat", post(handlers::ai::chat))
}
