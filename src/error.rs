//! Client construction errors
//!
//! Every failure while building a [`GoogleClient`](crate::gcp::client::GoogleClient)
//! is fatal. Each variant names the step that failed and keeps the
//! underlying cause as its source.

use crate::gcp::auth::AccessScope;
use thiserror::Error;

/// Errors returned by [`GoogleClient::new`](crate::gcp::client::GoogleClient::new)
#[derive(Debug, Error)]
pub enum ClientError {
    /// Inline service account key material could not be parsed for a scope
    #[error("reading key for {scope} scope: {source}")]
    CredentialParse {
        scope: AccessScope,
        #[source]
        source: anyhow::Error,
    },

    /// Ambient credential discovery failed for a scope
    #[error("creating default client for {scope} scope: {source}")]
    DefaultCredential {
        scope: AccessScope,
        #[source]
        source: anyhow::Error,
    },

    /// A service facade rejected its authorized sender
    #[error("creating service client for {service}: {source}")]
    ServiceConstruction {
        service: &'static str,
        #[source]
        source: anyhow::Error,
    },

    /// The base HTTP client could not be built
    #[error("building HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),
}

impl ClientError {
    /// Short label of the construction step that failed
    pub fn operation(&self) -> &'static str {
        match self {
            ClientError::CredentialParse { .. } => "reading key",
            ClientError::DefaultCredential { .. } => "creating default client",
            ClientError::ServiceConstruction { .. } => "creating service client",
            ClientError::HttpClient(_) => "building HTTP client",
        }
    }
}
