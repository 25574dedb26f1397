//! HTTP relay for protected media: key extraction plus a streaming download
//! proxy.
//!
//! # Architecture
//!
//! ```text
//! Caller → GET /extract_keys?url=<manifest>&user_id=<id>
//!              ↓
//!          [Key-Extraction Relay (axum)]
//!              ↓ GET <key endpoint>?url=<manifest>@botupdatevip4u&user_id=<id>
//!              ↓ desktop-browser impersonation headers, 20 s bound
//!          [Upstream key service]
//!              ↓ JSON body + status relayed verbatim
//!
//! Caller → GET /<any path>?url=<media url>
//!              ↓
//!          [Streaming Media Relay (axum)]
//!              ↓ GET <media url> with mobile impersonation headers
//!          [Origin]
//!              ↓ hop-by-hop headers stripped, status mirrored,
//!              ↓ body forwarded in 1024-byte chunks
//! ```
//!
//! Both relays are stateless; every request is handled independently on the
//! shared tokio runtime with one outbound call per invocation.

pub mod config;
pub mod extract;
pub mod proxy;
pub mod relay;
