pub mod adapters;
pub mod cli;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod gateway;
pub mod handlers;
pub mod middleware;
pub mod ports;
pub mod services;
pub mod startup;
pub mod utils;

use std::sync::Arc;

use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};

use crate::services::PaymentOrchestrator;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<PaymentOrchestrator>,
    pub log_request_body: bool,
}

pub fn create_app(state: AppState) -> Router {
    let log_request_body = state.log_request_body;

    Router::new()
        .route("/health", get(handlers::health))
        .route(
            "/payments/initiate-payment",
            post(handlers::payments::initiate_payment),
        )
        .route(
            "/payments/status",
            get(handlers::payments::payment_status).post(handlers::payments::payment_status),
        )
        .route("/payments/callback", post(handlers::payments::callback))
        .route("/payments/:id", get(handlers::payments::get_transaction))
        .layer(axum_middleware::from_fn_with_state(
            log_request_body,
            middleware::request_logger::request_logger_middleware,
        ))
        .layer(tower_http::cors::CorsLayer::permissive())
        .with_state(state)
}
