//! pejl-se library - Survey Engine module
//!
//! Token ledger, response store, scoring engine, assessment lifecycle and
//! the background scheduler, exposed through an axum command/query surface.

use axum::Router;
use sqlx::SqlitePool;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod delivery;
pub mod error;
pub mod lifecycle;
pub mod ports;
pub mod questions;
pub mod responses;
pub mod scheduler;
pub mod scoring;
pub mod tokens;

pub use error::{Error, Result};

use scoring::ScoringConfig;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Scoring thresholds and scale, loaded at startup
    pub scoring: ScoringConfig,
}

impl AppState {
    /// Create new application state
    pub fn new(db: SqlitePool, scoring: ScoringConfig) -> Self {
        Self { db, scoring }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::{get, post};

    Router::new()
        .route("/health", get(api::health_check))
        .nest(
            "/api",
            Router::new()
                .route("/assessments", post(api::create_assessment))
                .route("/assessments", get(api::list_assessments))
                .route("/assessments/:id", get(api::get_assessment))
                .route("/assessments/:id/schedule", post(api::schedule_assessment))
                .route("/assessments/:id/cancel", post(api::cancel_assessment))
                .route("/assessments/:id/tokens", post(api::issue_tokens))
                .route("/assessments/:id/results", get(api::get_results))
                .route("/redeem", post(api::redeem)),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
