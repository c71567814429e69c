//! GCP Client
//!
//! Builds the authenticated client used for the lifetime of the plugin:
//! credentials are resolved once per scope, each scope gets its own
//! authorizing transport wrapped in its own [`RetryTransport`], and the
//! compute and storage facades are assembled on top.
//!
//! Construction is all or nothing. Any failure aborts the build and only
//! the error is returned.

use super::auth::{
    AccessScope, AuthorizedTransport, CredentialResolver, CredentialStrategy, GcpAuthResolver,
    ScopedCredentials,
};
use super::compute::ComputeService;
use super::retry::RetryTransport;
use super::storage::StorageService;
use super::transport::{self, HttpSend};
use crate::config::Config;
use crate::error::ClientError;
use std::sync::Arc;
use tracing::{Instrument, Span};

/// Main GCP client
///
/// Cheap to clone and safe to share across tasks; nothing is mutated after
/// construction.
#[derive(Clone)]
pub struct GoogleClient {
    config: Arc<Config>,
    compute: Arc<ComputeService>,
    storage: Arc<StorageService>,
    logger: Span,
}

impl GoogleClient {
    /// Create a new client using `gcp_auth` for credential resolution
    pub async fn new(config: Config, logger: Span) -> Result<Self, ClientError> {
        let http = transport::base_client().map_err(ClientError::HttpClient)?;
        let resolver = GcpAuthResolver::new(http.clone());
        Self::build(config, logger, &resolver, http).await
    }

    /// Create a new client with a custom credential resolver
    pub async fn with_resolver(
        config: Config,
        logger: Span,
        resolver: &dyn CredentialResolver,
    ) -> Result<Self, ClientError> {
        let http = transport::base_client().map_err(ClientError::HttpClient)?;
        Self::build(config, logger, resolver, http).await
    }

    async fn build(
        config: Config,
        logger: Span,
        resolver: &dyn CredentialResolver,
        http: reqwest::Client,
    ) -> Result<Self, ClientError> {
        let span = logger.clone();

        async move {
            let (compute_credentials, storage_credentials) =
                resolve_credentials(&config, resolver).await?;

            let compute_sender = retrying_sender(&http, compute_credentials);
            let storage_sender = retrying_sender(&http, storage_credentials);

            let compute = build_compute(&config, compute_sender).map_err(|source| {
                ClientError::ServiceConstruction {
                    service: "compute",
                    source,
                }
            })?;
            let storage = build_storage(&config, storage_sender).map_err(|source| {
                ClientError::ServiceConstruction {
                    service: "storage",
                    source,
                }
            })?;

            tracing::info!("GCP client ready for project {}", config.project);

            Ok::<_, ClientError>(Self {
                config: Arc::new(config),
                compute: Arc::new(compute),
                storage: Arc::new(storage),
                logger,
            })
        }
        .instrument(span)
        .await
    }

    pub fn project(&self) -> &str {
        &self.config.project
    }

    pub fn default_root_disk_size_gb(&self) -> u32 {
        self.config.default_root_disk_size_gb
    }

    pub fn default_root_disk_type(&self) -> &str {
        &self.config.default_root_disk_type
    }

    pub fn default_zone(&self) -> &str {
        &self.config.default_zone
    }

    pub fn compute_service(&self) -> &ComputeService {
        &self.compute
    }

    pub fn storage_service(&self) -> &StorageService {
        &self.storage
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Logging span supplied by the caller, for higher-level operations
    pub fn logger(&self) -> &Span {
        &self.logger
    }
}

/// Resolve one credential per scope with whichever strategy the config selects
async fn resolve_credentials(
    config: &Config,
    resolver: &dyn CredentialResolver,
) -> Result<(ScopedCredentials, ScopedCredentials), ClientError> {
    match CredentialStrategy::select(config) {
        CredentialStrategy::ServiceAccountKey(key) => {
            tracing::info!("Using inline service account key");

            // Parsed once per scope: the parsed credentials are scope-bound
            let parse = |scope: AccessScope| {
                resolver
                    .from_service_account_key(key, scope)
                    .map_err(|source| ClientError::CredentialParse { scope, source })
            };
            Ok((parse(AccessScope::Compute)?, parse(AccessScope::Storage)?))
        }
        CredentialStrategy::Ambient { metadata_host } => {
            tracing::info!("Using default credentials (metadata host {})", metadata_host);

            let compute = resolver
                .ambient(AccessScope::Compute, &metadata_host)
                .await
                .map_err(|source| ClientError::DefaultCredential {
                    scope: AccessScope::Compute,
                    source,
                })?;
            let storage = resolver
                .ambient(AccessScope::Storage, &metadata_host)
                .await
                .map_err(|source| ClientError::DefaultCredential {
                    scope: AccessScope::Storage,
                    source,
                })?;
            Ok((compute, storage))
        }
    }
}

fn retrying_sender(http: &reqwest::Client, credentials: ScopedCredentials) -> Arc<dyn HttpSend> {
    Arc::new(RetryTransport::new(AuthorizedTransport::new(
        http.clone(),
        credentials,
    )))
}

fn build_compute(config: &Config, sender: Arc<dyn HttpSend>) -> anyhow::Result<ComputeService> {
    let mut compute = match config.compute_endpoint.as_deref() {
        Some(endpoint) => ComputeService::with_base_url(sender, endpoint)?,
        None => ComputeService::new(sender)?,
    };
    compute.set_user_agent(crate::USER_AGENT)?;
    Ok(compute)
}

fn build_storage(config: &Config, sender: Arc<dyn HttpSend>) -> anyhow::Result<StorageService> {
    let mut storage = match config.storage_endpoint.as_deref() {
        Some(endpoint) => StorageService::with_base_url(sender, endpoint)?,
        None => StorageService::new(sender)?,
    };
    storage.set_user_agent(crate::USER_AGENT)?;
    Ok(storage)
}
