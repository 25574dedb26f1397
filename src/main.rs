//! Media relay binary.
//!
//! Listens on `RELAY_PORT` (default 8080) and serves two routes:
//! `/extract_keys` (alias `/get_keys`) relays key-extraction requests to the
//! fixed upstream key service; every other path stream-proxies the media URL
//! given in `?url=`.
//!
//! # Environment variables
//!
//! | Variable                      | Default | Description                          |
//! |-------------------------------|---------|--------------------------------------|
//! | `RELAY_PORT`                  | `8080`  | TCP port to listen on                |
//! | `RELAY_KEY_TIMEOUT_SECS`      | `20`    | Key-extraction upstream timeout      |
//! | `RELAY_KEY_ENDPOINT_OVERRIDE` | —       | Override the key endpoint (tests)    |
//! | `RUST_LOG`                    | `info`  | Log filter (tracing-subscriber)      |

use std::time::Duration;

use media_relay::config::Config;
use media_relay::proxy::{router, RelayState};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let port: u16 = std::env::var("RELAY_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(8080);
    let timeout_secs: u64 = std::env::var("RELAY_KEY_TIMEOUT_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(20);

    let mut config = Config::new()
        .with_port(port)
        .with_key_timeout(Duration::from_secs(timeout_secs));
    if let Ok(endpoint) = std::env::var("RELAY_KEY_ENDPOINT_OVERRIDE") {
        config = config.with_key_endpoint(endpoint);
    }

    tracing::info!(
        port,
        key_endpoint = %config.key_endpoint(),
        timeout_secs,
        "Media relay starting"
    );

    let state = RelayState::new(config);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port))
        .await
        .expect("Failed to bind TCP listener");

    tracing::info!(port, "Listening");
    axum::serve(listener, router(state)).await.expect("Server error");
}
