use crate::db::KvStore;
use crate::handlers::plugins::{get_plugin, get_plugin_data, list_plugins, run_plugin};
use crate::handlers::totp::{replace_totp_secrets, totp_codes};
use crate::service::PluginRegistry;
use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    routing::{get, post, put},
};
use serde_json::{Value, json};
use std::sync::Arc;

/// Request bodies larger than this are rejected with 413.
pub const BODY_LIMIT: usize = 64 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub registry: PluginRegistry,
    pub store: Arc<dyn KvStore>,
    pub api_key: Arc<str>,
}

impl AppState {
    pub fn new(registry: PluginRegistry, store: Arc<dyn KvStore>, api_key: Arc<str>) -> Self {
        Self {
            registry,
            store,
            api_key,
        }
    }
}

async fn health() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

pub fn pilot_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/api/plugins", get(list_plugins))
        .route("/api/plugins/{id}", get(get_plugin))
        .route("/api/plugins/{id}/run", post(run_plugin))
        .route("/api/plugins/{id}/data/{key}", get(get_plugin_data))
        .route("/api/totp/codes", get(totp_codes))
        .route("/api/totp/secrets", put(replace_totp_secrets));

    Router::new()
        .route("/health", get(health))
        .merge(api)
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .with_state(state)
}
