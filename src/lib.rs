use std::sync::Arc;

use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::trace::TraceLayer;

pub mod auth;
pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod health;
pub mod memory;
pub mod metrics;
pub mod models;
pub mod probe;
pub mod service;
pub mod shortid;
pub mod store;

use auth::Authenticator;
use metrics::Metrics;
use service::LinkService;

// ── Shared application state ───────────────────────────────────────────────

pub struct AppState {
    pub service: LinkService,
    pub authenticator: Arc<dyn Authenticator>,
    pub metrics: Arc<Metrics>,
}

// ── Router ─────────────────────────────────────────────────────────────────

pub fn router(state: Arc<AppState>) -> Router {
    let account_router = Router::new()
        .route("/:id", get(handlers::accounts::list_links))
        .route("/:id/links", post(handlers::accounts::create_link))
        .route(
            "/:id/links/:short_id",
            delete(handlers::accounts::delete_link),
        );

    Router::new()
        .route("/health", get(|| async { axum::http::StatusCode::OK }))
        .route("/metrics", get(handlers::metrics::export))
        .route("/links", post(handlers::links::create_link))
        .route("/link/:short_id", get(handlers::links::redirect))
        .nest("/accounts", account_router)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
