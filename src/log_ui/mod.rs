//! Log viewer API.
//!
//! Read-only JSON endpoints over the in-memory log table, mounted under the
//! configured route prefix and protected by HTTP Basic auth. Requests to
//! this prefix are excluded from request recording.

pub mod auth;
pub mod handlers;

use axum::{middleware, routing::get, Router};

use self::auth::basic_auth_middleware;
use self::handlers::{get_keys, get_logs};
use crate::config::LogUiConfig;
use crate::observability::MemoryLogStore;

#[derive(Clone)]
pub struct LogUiState {
    pub store: MemoryLogStore,
    pub username: String,
    pub password: String,
}

pub fn setup_log_ui_router(config: &LogUiConfig, store: MemoryLogStore) -> Router {
    let prefix = config.route_prefix.trim_matches('/');
    let state = LogUiState {
        store,
        username: config.username.clone(),
        password: config.password.clone(),
    };

    Router::new()
        .route(&format!("/{}/api/logs", prefix), get(get_logs))
        .route(&format!("/{}/api/keys", prefix), get(get_keys))
        .route_layer(middleware::from_fn_with_state(state.clone(), basic_auth_middleware))
        .with_state(state)
}
