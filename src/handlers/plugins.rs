use crate::db::PluginData;
use crate::error::{ApiErrorBody, ApiErrorResponse, PilotError};
use crate::middleware::auth::RequireKeyAuth;
use crate::server::router::AppState;
use crate::types::{PluginStatus, TriggerAck, TriggerSource};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::info;

fn error_response(status: StatusCode, code: &str, message: String) -> Response {
    (
        status,
        Json(ApiErrorResponse {
            error: ApiErrorBody {
                code: code.to_string(),
                message,
            },
        }),
    )
        .into_response()
}

/// GET /api/plugins
pub async fn list_plugins(
    _auth: RequireKeyAuth,
    State(state): State<AppState>,
) -> Result<Json<Vec<PluginStatus>>, PilotError> {
    Ok(Json(state.registry.statuses().await?))
}

/// GET /api/plugins/{id}
pub async fn get_plugin(
    _auth: RequireKeyAuth,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<PluginStatus>, PilotError> {
    Ok(Json(state.registry.status(&id).await?))
}

/// POST /api/plugins/{id}/run -> 202 when started, 409 when busy or closing.
pub async fn run_plugin(
    _auth: RequireKeyAuth,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, PilotError> {
    let ack = state.registry.trigger(&id, TriggerSource::Manual).await?;
    info!(plugin = %id, ?ack, "manual trigger");
    Ok(match ack {
        TriggerAck::Started => (
            StatusCode::ACCEPTED,
            Json(json!({"plugin": id, "status": "started"})),
        )
            .into_response(),
        TriggerAck::Busy => error_response(
            StatusCode::CONFLICT,
            "BUSY",
            format!("plugin `{id}` is already running"),
        ),
        TriggerAck::Closed => error_response(
            StatusCode::CONFLICT,
            "CLOSED",
            format!("plugin `{id}` is shutting down"),
        ),
    })
}

/// GET /api/plugins/{id}/data/{key}
pub async fn get_plugin_data(
    _auth: RequireKeyAuth,
    State(state): State<AppState>,
    Path((id, key)): Path<(String, String)>,
) -> Result<Response, PilotError> {
    let handle = state.registry.get(&id)?;
    let data = PluginData::new(state.store.clone(), handle.id());
    Ok(match data.raw(&key).await? {
        Some(value) => Json(value).into_response(),
        None => error_response(
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            format!("plugin `{id}` has no data under `{key}`"),
        ),
    })
}
