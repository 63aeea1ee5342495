//! Meridian API gateway library.
//!
//! The router is built here, separate from `main.rs`, so integration
//! tests can drive the full pipeline (interceptors included) against an
//! in-memory store without binding a socket.

pub mod auth;
pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod state;

use axum::routing::{get, post};
use axum::Router;

pub use config::ApiConfig;
pub use state::AppState;

/// Build the full router with both interceptors attached.
///
/// Layer ordering: the revocation check is added last so it runs first,
/// leaving the authenticated principal in place for the rate limiter.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(routes::health))
        .route("/api/auth/login", post(routes::auth::login))
        .route("/api/auth/logout", post(routes::auth::logout))
        .route("/api/auth/logout-all", post(routes::auth::logout_all))
        .route("/api/numbering/{rule}/next", post(routes::numbering::next_number))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::rate_limit::enforce,
        ))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::revocation::check,
        ))
        .with_state(state)
}
