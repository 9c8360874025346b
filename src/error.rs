use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use sqlx::Error as SqlxError;
use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum PilotError {
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("HTTP request error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    DatabaseError(#[from] SqlxError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid cron expression `{expr}`: {reason}")]
    Cron { expr: String, reason: String },

    #[error("Login failed for site {site}: {reason}")]
    LoginFailed { site: String, reason: String },

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("Upstream error with status: {0}")]
    UpstreamStatus(StatusCode),

    #[error("Could not extract {0} from page")]
    Extraction(String),

    #[error("Invalid TOTP secret: {0}")]
    InvalidSecret(String),

    #[error("Unknown site: {0}")]
    UnknownSite(String),

    #[error("Unknown plugin: {0}")]
    UnknownPlugin(String),

    #[error("Ractor error: {0}")]
    RactorError(String),
}

impl From<figment::Error> for PilotError {
    fn from(e: figment::Error) -> Self {
        PilotError::Config(e.to_string())
    }
}

/// Whether a failed request is worth repeating after the fixed retry delay.
pub trait IsRetryable {
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for PilotError {
    fn is_retryable(&self) -> bool {
        match self {
            PilotError::Reqwest(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.status().is_some_and(|s| s.is_server_error())
            }
            PilotError::UpstreamStatus(code) => {
                code.is_server_error() || *code == StatusCode::TOO_MANY_REQUESTS
            }
            _ => false,
        }
    }
}

impl IntoResponse for PilotError {
    fn into_response(self) -> axum::response::Response {
        let (status, error_body) = match self {
            PilotError::UnknownPlugin(id) => (
                StatusCode::NOT_FOUND,
                ApiErrorBody {
                    code: "NOT_FOUND".to_string(),
                    message: format!("no plugin named `{id}`"),
                },
            ),
            PilotError::InvalidSecret(reason) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ApiErrorBody {
                    code: "INVALID_SECRET".to_string(),
                    message: reason,
                },
            ),
            PilotError::Json(e) => (
                StatusCode::BAD_REQUEST,
                ApiErrorBody {
                    code: "BAD_REQUEST".to_string(),
                    message: e.to_string(),
                },
            ),
            PilotError::DatabaseError(_) | PilotError::RactorError(_) | PilotError::Io(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ApiErrorBody {
                    code: "INTERNAL_ERROR".to_string(),
                    message: "An internal server error occurred.".to_string(),
                },
            ),
            PilotError::Reqwest(_)
            | PilotError::UrlParse(_)
            | PilotError::UpstreamStatus(_)
            | PilotError::LoginFailed { .. }
            | PilotError::UnexpectedResponse(_)
            | PilotError::Extraction(_) => (
                StatusCode::BAD_GATEWAY,
                ApiErrorBody {
                    code: "BAD_GATEWAY".to_string(),
                    message: "Upstream site is unavailable.".to_string(),
                },
            ),
            PilotError::Config(_) | PilotError::Cron { .. } | PilotError::UnknownSite(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ApiErrorBody {
                    code: "CONFIG_ERROR".to_string(),
                    message: "Server configuration error.".to_string(),
                },
            ),
        };
        (status, Json(ApiErrorResponse { error: error_body })).into_response()
    }
}

/// Standardized API error response body
#[derive(Serialize)]
pub struct ApiErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Serialize)]
pub struct ApiErrorResponse {
    pub error: ApiErrorBody,
}
