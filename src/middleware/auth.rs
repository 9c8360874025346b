use axum::Json;
use axum::extract::FromRequestParts;
use axum::http::{HeaderMap, StatusCode, request::Parts};
use axum::response::{IntoResponse, Response};
use subtle::ConstantTimeEq;

use crate::error::{ApiErrorBody, ApiErrorResponse};
use crate::server::router::AppState;

fn key_matches(candidate: &str, expected: &str) -> bool {
    candidate.as_bytes().ct_eq(expected.as_bytes()).into()
}

/// Ensure the inbound request carries the configured API key.
/// Accepts either:
/// - Header: `x-api-key: ...`
/// - Header: `Authorization: Bearer ...`
/// - Query string: `?key=...`
///
/// An empty configured key locks the API entirely.
pub fn ensure_authorized(
    headers: &HeaderMap,
    query: Option<&str>,
    expected: &str,
) -> Result<(), Response> {
    if !expected.is_empty() {
        // 1) header: x-api-key
        if let Some(hv) = headers.get("x-api-key").and_then(|v| v.to_str().ok())
            && key_matches(hv, expected)
        {
            return Ok(());
        }

        // 2) header: Authorization: Bearer <key>
        if let Some(auth) = headers.get("authorization").and_then(|v| v.to_str().ok()) {
            let auth = auth.trim();
            if let Some(token) = auth
                .strip_prefix("Bearer ")
                .or_else(|| auth.strip_prefix("bearer "))
                && key_matches(token.trim(), expected)
            {
                return Ok(());
            }
        }

        // 3) query: key=...
        if let Some(qs) = query {
            for (k, v) in url::form_urlencoded::parse(qs.as_bytes()) {
                if k == "key" && key_matches(&v, expected) {
                    return Ok(());
                }
            }
        }
    }

    Err((
        StatusCode::UNAUTHORIZED,
        Json(ApiErrorResponse {
            error: ApiErrorBody {
                code: "UNAUTHORIZED".to_string(),
                message: "invalid or missing key".to_string(),
            },
        }),
    )
        .into_response())
}

#[derive(Debug, Clone, Copy)]
pub struct RequireKeyAuth;

impl FromRequestParts<AppState> for RequireKeyAuth {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        ensure_authorized(&parts.headers, parts.uri.query(), &state.api_key)?;
        Ok(Self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn accepts_each_key_location() {
        let mut h = HeaderMap::new();
        h.insert("x-api-key", HeaderValue::from_static("pwd"));
        assert!(ensure_authorized(&h, None, "pwd").is_ok());

        let mut h = HeaderMap::new();
        h.insert("authorization", HeaderValue::from_static("Bearer pwd"));
        assert!(ensure_authorized(&h, None, "pwd").is_ok());

        assert!(ensure_authorized(&HeaderMap::new(), Some("a=1&key=pwd"), "pwd").is_ok());
    }

    #[test]
    fn rejects_wrong_or_missing_key() {
        let mut h = HeaderMap::new();
        h.insert("x-api-key", HeaderValue::from_static("pw"));
        assert!(ensure_authorized(&h, None, "pwd").is_err());
        assert!(ensure_authorized(&HeaderMap::new(), None, "pwd").is_err());
    }

    #[test]
    fn empty_configured_key_locks_the_api() {
        assert!(ensure_authorized(&HeaderMap::new(), Some("key="), "").is_err());
    }
}
