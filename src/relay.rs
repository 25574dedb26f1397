//! Streaming media relay.
//!
//! Forwards an arbitrary upstream GET to the caller chunk-by-chunk. The
//! upstream body is never materialised: reads are re-split to a fixed chunk
//! size and pushed straight into the response body, so relay memory stays
//! O(chunk) for any payload. Dropping the inbound connection drops the body
//! stream, which releases the upstream connection — cancellation propagates
//! structurally, with no explicit token.

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use serde::Deserialize;

use crate::config::STREAM_HEADERS;
use crate::proxy::RelayState;

/// Fixed forwarding chunk size.
pub const STREAM_CHUNK_SIZE: usize = 1024;

/// Hop-by-hop response headers that must not be forwarded. The relay
/// re-frames the body, so the upstream's transport framing no longer applies.
pub const EXCLUDED_HEADERS: [&str; 4] = [
    "content-encoding",
    "content-length",
    "transfer-encoding",
    "connection",
];

#[derive(Debug, Deserialize)]
pub struct StreamParams {
    #[serde(default)]
    pub url: Option<String>,
}

pub async fn handle_stream(
    State(state): State<RelayState>,
    Query(params): Query<StreamParams>,
) -> Result<Response, StreamError> {
    let target_url = match params.url.as_deref() {
        Some(url) if !url.is_empty() => url,
        _ => return Err(StreamError::MissingUrl),
    };

    tracing::debug!(url = %target_url, "Opening upstream media stream");

    let mut builder = state.client.get(target_url);
    for (name, value) in STREAM_HEADERS {
        builder = builder.header(name, value);
    }

    let upstream = builder
        .send()
        .await
        .map_err(|e| StreamError::Transport(e.to_string()))?;

    let status = upstream.status();
    if status != StatusCode::OK {
        // No stream was established; report the status without reading the
        // body.
        return Err(StreamError::UpstreamStatus {
            status: status.as_u16(),
        });
    }

    let headers = forward_headers(upstream.headers());

    tracing::debug!(
        url = %target_url,
        content_type = headers
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown"),
        "Relaying upstream media stream"
    );

    let mut response = Response::builder().status(status);
    if let Some(response_headers) = response.headers_mut() {
        *response_headers = headers;
    }

    Ok(response
        .body(Body::from_stream(rechunk(upstream.bytes_stream())))
        .unwrap())
}

/// Copy every upstream header except the hop-by-hop denylist, preserving
/// order and duplicates (e.g. multiple `Set-Cookie`).
pub fn forward_headers(upstream: &HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::with_capacity(upstream.len());
    for (name, value) in upstream {
        if EXCLUDED_HEADERS
            .iter()
            .any(|excluded| name.as_str().eq_ignore_ascii_case(excluded))
        {
            continue;
        }
        out.append(name.clone(), value.clone());
    }
    out
}

/// Re-split an upstream byte stream into chunks of at most
/// [`STREAM_CHUNK_SIZE`] bytes.
///
/// `Bytes::split_to` shares the underlying buffer, so splitting never copies
/// payload data, and only one upstream read is held at a time.
pub fn rechunk<S, E>(upstream: S) -> impl Stream<Item = Result<Bytes, E>>
where
    S: Stream<Item = Result<Bytes, E>>,
{
    upstream.flat_map(|read| {
        let chunks = match read {
            Ok(mut bytes) => {
                let mut out = Vec::with_capacity(bytes.len() / STREAM_CHUNK_SIZE + 1);
                while bytes.len() > STREAM_CHUNK_SIZE {
                    out.push(Ok(bytes.split_to(STREAM_CHUNK_SIZE)));
                }
                if !bytes.is_empty() {
                    out.push(Ok(bytes));
                }
                out
            }
            Err(e) => vec![Err(e)],
        };
        futures_util::stream::iter(chunks)
    })
}

/// Errors the streaming handler can produce (shaped into plain-text
/// responses, unlike the key route's JSON envelopes).
#[derive(Debug)]
pub enum StreamError {
    /// Caller omitted the `url` query parameter.
    MissingUrl,
    /// Upstream answered non-200; the body was never read.
    UpstreamStatus { status: u16 },
    /// Transport-level failure before a response arrived.
    Transport(String),
}

impl std::fmt::Display for StreamError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingUrl => write!(
                f,
                "Missing 'url' parameter. Use /extract_keys?url=... for key extraction."
            ),
            Self::UpstreamStatus { status } => write!(f, "Error fetching media: {}", status),
            Self::Transport(e) => write!(f, "Internal Server Error: {}", e),
        }
    }
}

impl std::error::Error for StreamError {}

impl IntoResponse for StreamError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::MissingUrl => StatusCode::BAD_REQUEST,
            Self::UpstreamStatus { status } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            Self::Transport(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            tracing::error!(error = %self, "Media relay failed");
        } else {
            tracing::warn!(error = %self, "Media relay rejected");
        }

        (status, self.to_string()).into_response()
    }
}
