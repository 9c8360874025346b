use crate::db::PluginData;
use crate::error::{ApiErrorBody, ApiErrorResponse, PilotError};
use crate::middleware::auth::RequireKeyAuth;
use crate::plugins::totp::{self, CodeSheet, TotpSecret};
use crate::server::router::AppState;
use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::info;

fn totp_data(state: &AppState) -> PluginData {
    PluginData::new(state.store.clone(), totp::ID)
}

/// GET /api/totp/codes
pub async fn totp_codes(
    _auth: RequireKeyAuth,
    State(state): State<AppState>,
) -> Result<Json<CodeSheet>, PilotError> {
    let secrets = totp::stored_secrets(&totp_data(&state)).await?;
    Ok(Json(totp::current_codes(&secrets)))
}

/// PUT /api/totp/secrets -> replaces the stored list; the secrets are not echoed back.
pub async fn replace_totp_secrets(
    _auth: RequireKeyAuth,
    State(state): State<AppState>,
    body: Result<Json<Vec<TotpSecret>>, JsonRejection>,
) -> Result<Response, PilotError> {
    let Json(secrets) = match body {
        Ok(body) => body,
        Err(rejection) => {
            let status = rejection.status();
            return Ok((
                status,
                Json(ApiErrorResponse {
                    error: ApiErrorBody {
                        code: status
                            .canonical_reason()
                            .unwrap_or("BAD_REQUEST")
                            .to_uppercase()
                            .replace(' ', "_"),
                        message: rejection.body_text(),
                    },
                }),
            )
                .into_response());
        }
    };

    let stored = totp::replace_secrets(&totp_data(&state), secrets).await?;
    info!(count = stored.len(), "totp secrets replaced");
    Ok(Json(json!({"count": stored.len()})).into_response())
}
