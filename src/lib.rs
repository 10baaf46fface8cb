//! Lending Ledger
//!
//! Borrowing and returning units from a shared pool of library items, with
//! overdue tracking and read-only loan queries, served over a REST JSON API.

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod repository;
pub mod services;

pub use config::AppConfig;
pub use error::{AppError, AppResult};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub services: Arc<services::Services>,
    pub store: Arc<dyn repository::Store>,
}

impl AppState {
    pub fn new(config: AppConfig, store: Arc<dyn repository::Store>) -> Self {
        let services = services::Services::new(store.clone(), &config.ledger);
        Self {
            config: Arc::new(config),
            services: Arc::new(services),
            store,
        }
    }
}

/// Create the application router with all routes
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_v1 = Router::new()
        // Health check
        .route("/health", get(api::health::health_check))
        .route("/ready", get(api::health::readiness_check))
        // Loans
        .route("/loans", get(api::loans::list_loans).post(api::loans::create_loan))
        .route("/loans/overdue", get(api::loans::list_overdue))
        .route("/loans/mine", get(api::loans::my_loans))
        .route("/loans/sweep", post(api::loans::sweep_overdue))
        .route("/loans/:id", get(api::loans::get_loan))
        .route("/loans/:id/return", post(api::loans::return_loan))
        // Items
        .route("/items/most-borrowed", get(api::items::most_borrowed))
        .route("/items/:id/stock", get(api::items::get_stock))
        .with_state(state);

    Router::new()
        .nest("/api/v1", api_v1)
        .merge(api::openapi::create_openapi_router())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
