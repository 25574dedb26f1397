//! Axum router and shared relay state.

use std::sync::Arc;

use axum::routing::get;
use axum::Router;

use crate::config::Config;
use crate::{extract, relay};

/// State shared by every handler: the outbound HTTP client and the immutable
/// configuration. Cloning is cheap (both are reference-counted).
#[derive(Clone)]
pub struct RelayState {
    pub client: reqwest::Client,
    pub config: Arc<Config>,
}

impl RelayState {
    pub fn new(config: Config) -> Self {
        Self {
            client: reqwest::Client::new(),
            config: Arc::new(config),
        }
    }
}

/// Build the axum router.
///
/// The two exact paths serve key extraction; every other path (including the
/// root) is handled by the streaming media relay.
pub fn router(state: RelayState) -> Router {
    Router::new()
        .route("/extract_keys", get(extract::handle_extract))
        .route("/get_keys", get(extract::handle_extract))
        .route("/", get(relay::handle_stream))
        .route("/{*path}", get(relay::handle_stream))
        .with_state(state)
}
