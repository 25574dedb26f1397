//! Key-extraction relay.
//!
//! Rewrites the inbound `url`/`user_id` query into the fixed upstream
//! template, performs a single bounded GET with the desktop impersonation
//! bundle, and relays the upstream JSON body and status verbatim. Failures
//! are shaped into JSON envelopes; nothing is retried.

use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;

use crate::config::{CALLER_TAG, EXTRACT_HEADERS};
use crate::proxy::RelayState;

fn default_user_id() -> String {
    "unknown".to_string()
}

#[derive(Debug, Deserialize)]
pub struct ExtractParams {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_user_id")]
    pub user_id: String,
}

/// Build the outbound key-service URL.
///
/// Plain text concatenation on purpose: the upstream matches the embedded
/// target URL and the `@` tag literally, so nothing here may percent-encode
/// or otherwise normalise the caller's value.
pub fn build_key_url(endpoint: &str, target_url: &str, user_id: &str) -> String {
    format!("{endpoint}?url={target_url}@{CALLER_TAG}&user_id={user_id}")
}

pub async fn handle_extract(
    State(state): State<RelayState>,
    Query(params): Query<ExtractParams>,
) -> Result<Response, ExtractError> {
    let target_url = match params.url.as_deref() {
        Some(url) if !url.is_empty() => url,
        _ => return Err(ExtractError::MissingUrl),
    };

    let request_url = build_key_url(state.config.key_endpoint(), target_url, &params.user_id);

    tracing::debug!(
        url = %request_url,
        user_id = %params.user_id,
        "Forwarding key-extraction request"
    );

    let mut builder = state
        .client
        .get(&request_url)
        .timeout(state.config.key_timeout());
    for (name, value) in EXTRACT_HEADERS {
        builder = builder.header(name, value);
    }

    let upstream = builder.send().await.map_err(|e| {
        if e.is_timeout() {
            ExtractError::Timeout
        } else {
            ExtractError::Transport(e.to_string())
        }
    })?;

    let status = upstream.status();
    let body = upstream
        .text()
        .await
        .map_err(|e| ExtractError::Transport(e.to_string()))?;

    if status != StatusCode::OK {
        return Err(ExtractError::Upstream {
            status: status.as_u16(),
            details: body,
            request_url,
        });
    }

    // A 200 with a non-JSON body is an upstream-contract violation; report it
    // instead of relaying malformed data.
    if let Err(e) = serde_json::from_str::<serde_json::Value>(&body) {
        return Err(ExtractError::Decode {
            details: e.to_string(),
            request_url,
        });
    }

    tracing::debug!(bytes = body.len(), "Relaying key-extraction response");

    // Relay the validated body byte-for-byte rather than re-serialising it.
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        body,
    )
        .into_response())
}

/// Errors the key-extraction handler can produce (shaped into JSON envelopes).
#[derive(Debug)]
pub enum ExtractError {
    /// Caller omitted the `url` query parameter.
    MissingUrl,
    /// Upstream answered with a non-200 status.
    Upstream {
        status: u16,
        details: String,
        request_url: String,
    },
    /// Upstream answered 200 but the body was not valid JSON.
    Decode {
        details: String,
        request_url: String,
    },
    /// The upstream call exceeded the configured bound.
    Timeout,
    /// Transport-level failure before a response arrived.
    Transport(String),
}

impl std::fmt::Display for ExtractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingUrl => write!(f, "Missing 'url' parameter"),
            Self::Upstream { status, .. } => {
                write!(f, "Backend API error: upstream returned {}", status)
            }
            Self::Decode { details, .. } => {
                write!(f, "Upstream returned invalid JSON: {}", details)
            }
            Self::Timeout => write!(f, "Upstream key extraction timed out"),
            Self::Transport(e) => write!(f, "Upstream request failed: {}", e),
        }
    }
}

impl std::error::Error for ExtractError {}

impl IntoResponse for ExtractError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            Self::MissingUrl => (
                StatusCode::BAD_REQUEST,
                serde_json::json!({ "error": "Missing 'url' parameter" }),
            ),
            // Mirror the upstream status; echo the outbound URL for
            // operability. All header/URL material is public impersonation
            // values, so the echo leaks nothing.
            Self::Upstream {
                status,
                details,
                request_url,
            } => (
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY),
                serde_json::json!({
                    "error": "Backend API Error",
                    "status": status,
                    "details": details,
                    "request_url": request_url,
                }),
            ),
            Self::Decode {
                details,
                request_url,
            } => (
                StatusCode::BAD_GATEWAY,
                serde_json::json!({
                    "error": "Upstream returned invalid JSON",
                    "details": details,
                    "request_url": request_url,
                }),
            ),
            Self::Timeout => (
                StatusCode::GATEWAY_TIMEOUT,
                serde_json::json!({ "error": "Upstream Timeout" }),
            ),
            Self::Transport(details) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                serde_json::json!({ "error": "Internal Proxy Error", "details": details }),
            ),
        };

        if status.is_server_error() {
            tracing::error!(error = %self, "Key extraction failed");
        } else {
            tracing::warn!(error = %self, "Key extraction rejected");
        }

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KEY_API_URL;

    #[test]
    fn key_url_matches_the_upstream_template_exactly() {
        let url = build_key_url(KEY_API_URL, "https://x/y.m3u8", "abc");
        assert_eq!(
            url,
            "https://head-micheline-botupdatevip-f1804c58.koyeb.app/get_keys\
             ?url=https://x/y.m3u8@botupdatevip4u&user_id=abc"
        );
    }

    #[test]
    fn key_url_never_reencodes_the_target() {
        // Already-encoded or reserved characters must pass through untouched.
        let url = build_key_url("http://h/get_keys", "https://x/a%20b.m3u8?tok=1&sig=2", "u1");
        assert_eq!(
            url,
            "http://h/get_keys?url=https://x/a%20b.m3u8?tok=1&sig=2@botupdatevip4u&user_id=u1"
        );
    }

    #[test]
    fn missing_url_maps_to_400() {
        let resp = ExtractError::MissingUrl.into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn upstream_error_mirrors_the_status() {
        let resp = ExtractError::Upstream {
            status: 404,
            details: "not found".to_string(),
            request_url: "http://h/get_keys?url=x@botupdatevip4u&user_id=u".to_string(),
        }
        .into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn unmappable_upstream_status_falls_back_to_502() {
        let resp = ExtractError::Upstream {
            status: 99,
            details: String::new(),
            request_url: String::new(),
        }
        .into_response();
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn decode_error_maps_to_502() {
        let resp = ExtractError::Decode {
            details: "expected value at line 1".to_string(),
            request_url: String::new(),
        }
        .into_response();
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn timeout_maps_to_504() {
        let resp = ExtractError::Timeout.into_response();
        assert_eq!(resp.status(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[test]
    fn transport_error_maps_to_500() {
        let resp = ExtractError::Transport("connection refused".to_string()).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn upstream_error_envelope_carries_status_and_details() {
        let resp = ExtractError::Upstream {
            status: 404,
            details: "not found".to_string(),
            request_url: "http://h/get_keys?url=x@botupdatevip4u&user_id=u".to_string(),
        }
        .into_response();

        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "Backend API Error");
        assert_eq!(body["status"], 404);
        assert_eq!(body["details"], "not found");
        assert!(body["request_url"]
            .as_str()
            .unwrap()
            .contains("@botupdatevip4u"));
    }

    #[tokio::test]
    async fn missing_url_envelope_matches_the_contract() {
        let resp = ExtractError::MissingUrl.into_response();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "Missing 'url' parameter");
    }
}
