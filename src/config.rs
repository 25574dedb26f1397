//! Configuration for the relay, including the fixed upstream contract.

use std::time::Duration;

/// Fixed upstream key-extraction endpoint.
pub const KEY_API_URL: &str =
    "https://head-micheline-botupdatevip-f1804c58.koyeb.app/get_keys";

/// Opaque tag the key service expects appended to the target URL
/// (`?url=<target>@botupdatevip4u`). The upstream's matching rule is
/// undocumented; the literal must be preserved byte-for-byte.
pub const CALLER_TAG: &str = "botupdatevip4u";

/// Header bundle sent on key-extraction calls. Impersonates a desktop
/// Chrome session of the web client the upstream recognises.
pub const EXTRACT_HEADERS: [(&str, &str); 3] = [
    (
        "User-Agent",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
         (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36",
    ),
    ("Referer", "https://web.classplusapp.com/"),
    ("x-cdn-tag", "empty"),
];

/// Minimal header bundle sent on media stream calls.
pub const STREAM_HEADERS: [(&str, &str); 3] = [
    ("User-Agent", "Mobile"),
    ("Referer", "https://web.classplusapp.com/"),
    ("x-cdn-tag", "empty"),
];

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_KEY_TIMEOUT: Duration = Duration::from_secs(20);

/// Immutable relay configuration, built once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// TCP port the relay listens on. Default: `8080`.
    pub(crate) port: u16,
    /// Key-extraction endpoint. Defaults to [`KEY_API_URL`]; overridden only
    /// so tests can point the relay at a mock server.
    pub(crate) key_endpoint: String,
    /// Upper bound on the key-extraction upstream call. Default: `20s`.
    pub(crate) key_timeout: Duration,
}

impl Config {
    /// Create a config with the production defaults.
    pub fn new() -> Self {
        Self {
            port: DEFAULT_PORT,
            key_endpoint: KEY_API_URL.to_string(),
            key_timeout: DEFAULT_KEY_TIMEOUT,
        }
    }

    /// Override the TCP port the relay listens on.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Override the key-extraction endpoint (tests only).
    pub fn with_key_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.key_endpoint = endpoint.into();
        self
    }

    /// Override the key-extraction timeout.
    pub fn with_key_timeout(mut self, timeout: Duration) -> Self {
        self.key_timeout = timeout;
        self
    }

    /// Listen port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Key-extraction endpoint.
    pub fn key_endpoint(&self) -> &str {
        &self.key_endpoint
    }

    /// Key-extraction timeout.
    pub fn key_timeout(&self) -> Duration {
        self.key_timeout
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}
