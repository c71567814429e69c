//! Authenticated Google Compute Engine and Cloud Storage client for cloud
//! provider plugins.
//!
//! [`GoogleClient::new`] resolves credentials from the [`Config`] (inline
//! service account key or ambient discovery), wraps each scope's transport
//! in a [`RetryTransport`](gcp::retry::RetryTransport) and exposes the two
//! service facades plus the operator defaults.

pub mod config;
pub mod error;
pub mod gcp;

pub use config::Config;
pub use error::ClientError;
pub use gcp::client::GoogleClient;

/// Label every outbound request carries as its User-Agent
pub const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));
