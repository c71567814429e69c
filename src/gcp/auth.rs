//! GCP Authentication
//!
//! Picks one of two credential strategies from the configuration and turns
//! it into one authorized sender per access scope:
//!
//! - inline service account key material, parsed once per scope
//! - ambient discovery (credentials file, gcloud, metadata server)
//!
//! The metadata host used by ambient discovery is resolved up front and
//! passed along explicitly; the process environment is only read.

use super::transport::HttpSend;
use crate::config::Config;
use anyhow::{Context, Result};
use async_trait::async_trait;
use gcp_auth::{ConfigDefaultCredentials, CustomServiceAccount, TokenProvider};
use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::{Request, Response};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Environment variable operators use to redirect metadata discovery
pub const METADATA_HOST_ENV: &str = "GCE_METADATA_HOST";

/// Well-known metadata server hostname
pub const METADATA_HOST: &str = "metadata.google.internal";

const METADATA_TOKEN_PATH: &str = "/computeMetadata/v1/instance/service-accounts/default/token";
const METADATA_FLAVOR: &str = "Metadata-Flavor";
const METADATA_FLAVOR_VALUE: &str = "Google";

/// Refresh metadata tokens this much before they actually expire
const TOKEN_EXPIRY_BUFFER: Duration = Duration::from_secs(60);

/// Permission grant requested from the credential system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessScope {
    Compute,
    Storage,
}

impl AccessScope {
    /// Every scope the client needs, one per API
    pub const ALL: [AccessScope; 2] = [AccessScope::Compute, AccessScope::Storage];

    /// OAuth scope URL
    pub const fn url(self) -> &'static str {
        match self {
            AccessScope::Compute => "https://www.googleapis.com/auth/compute",
            AccessScope::Storage => "https://www.googleapis.com/auth/devstorage.full_control",
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            AccessScope::Compute => "compute",
            AccessScope::Storage => "storage",
        }
    }
}

impl fmt::Display for AccessScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Resolve the metadata host from an optional operator-supplied value.
/// A non-empty value wins, anything else falls back to [`METADATA_HOST`].
pub fn resolve_metadata_host(configured: Option<String>) -> String {
    configured
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| METADATA_HOST.to_string())
}

/// Metadata host for ambient discovery, honoring `GCE_METADATA_HOST`
pub fn metadata_host() -> String {
    resolve_metadata_host(std::env::var(METADATA_HOST_ENV).ok())
}

/// How credentials are acquired; the two strategies are mutually exclusive
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialStrategy<'a> {
    /// Inline service account key material
    ServiceAccountKey(&'a str),
    /// Discovery from the hosting environment
    Ambient { metadata_host: String },
}

impl<'a> CredentialStrategy<'a> {
    pub fn select(config: &'a Config) -> Self {
        match config.json_key.as_deref() {
            Some(key) if !key.is_empty() => CredentialStrategy::ServiceAccountKey(key),
            _ => CredentialStrategy::Ambient {
                metadata_host: metadata_host(),
            },
        }
    }
}

/// Produces bearer tokens for a scope
#[async_trait]
pub trait AccessTokenSource: Send + Sync {
    async fn access_token(&self, scope: AccessScope) -> Result<String>;
}

/// Credentials bound to exactly one access scope
#[derive(Clone)]
pub struct ScopedCredentials {
    scope: AccessScope,
    source: Arc<dyn AccessTokenSource>,
}

impl ScopedCredentials {
    pub fn new(scope: AccessScope, source: Arc<dyn AccessTokenSource>) -> Self {
        Self { scope, source }
    }

    pub fn scope(&self) -> AccessScope {
        self.scope
    }

    /// Get an access token for this scope
    pub async fn token(&self) -> Result<String> {
        self.source.access_token(self.scope).await
    }
}

impl fmt::Debug for ScopedCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedCredentials")
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

/// The credential library seam: key parsing and ambient discovery
#[async_trait]
pub trait CredentialResolver: Send + Sync {
    /// Parse inline key material into credentials for one scope
    fn from_service_account_key(&self, key: &str, scope: AccessScope) -> Result<ScopedCredentials>;

    /// Discover credentials for one scope from the hosting environment
    async fn ambient(&self, scope: AccessScope, metadata_host: &str) -> Result<ScopedCredentials>;
}

/// Token source backed by a `gcp_auth` provider
pub struct GcpAuthTokens {
    provider: Arc<dyn TokenProvider>,
}

impl GcpAuthTokens {
    pub fn new(provider: Arc<dyn TokenProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl AccessTokenSource for GcpAuthTokens {
    async fn access_token(&self, scope: AccessScope) -> Result<String> {
        let token = self
            .provider
            .token(&[scope.url()])
            .await
            .context("Failed to get access token")?;
        Ok(token.as_str().to_string())
    }
}

#[derive(Clone)]
struct CachedToken {
    token: String,
    /// When this token expires (with buffer applied)
    expires_at: Instant,
}

impl CachedToken {
    fn is_valid(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

#[derive(Deserialize)]
struct MetadataToken {
    access_token: String,
    #[serde(default)]
    expires_in: u64,
}

/// Token source querying the metadata server at an explicit host
pub struct MetadataServer {
    http: reqwest::Client,
    token_url: url::Url,
    token_cache: RwLock<HashMap<AccessScope, CachedToken>>,
}

impl MetadataServer {
    /// `host` is a hostname with an optional port, e.g. `169.254.169.254:80`
    pub fn new(http: reqwest::Client, host: &str) -> Result<Self> {
        let token_url = url::Url::parse(&format!("http://{}{}", host, METADATA_TOKEN_PATH))
            .with_context(|| format!("Invalid metadata host: {}", host))?;

        Ok(Self {
            http,
            token_url,
            token_cache: RwLock::new(HashMap::new()),
        })
    }

    pub fn token_url(&self) -> &url::Url {
        &self.token_url
    }

    async fn fetch_token(&self, scope: AccessScope) -> Result<MetadataToken> {
        tracing::debug!("GET {} (scope {})", self.token_url, scope);

        self.http
            .get(self.token_url.clone())
            .header(METADATA_FLAVOR, METADATA_FLAVOR_VALUE)
            .query(&[("scopes", scope.url())])
            .send()
            .await
            .context("Failed to reach metadata server")?
            .error_for_status()
            .context("Metadata server refused token request")?
            .json::<MetadataToken>()
            .await
            .context("Failed to parse metadata token response")
    }
}

#[async_trait]
impl AccessTokenSource for MetadataServer {
    async fn access_token(&self, scope: AccessScope) -> Result<String> {
        {
            let cache = self.token_cache.read().await;
            if let Some(cached) = cache.get(&scope) {
                if cached.is_valid() {
                    return Ok(cached.token.clone());
                }
                tracing::debug!("Cached {} token expired, fetching new token", scope);
            }
        }

        let fetched = self.fetch_token(scope).await?;
        let ttl = Duration::from_secs(fetched.expires_in).saturating_sub(TOKEN_EXPIRY_BUFFER);

        {
            let mut cache = self.token_cache.write().await;
            cache.insert(
                scope,
                CachedToken {
                    token: fetched.access_token.clone(),
                    expires_at: Instant::now() + ttl,
                },
            );
        }

        Ok(fetched.access_token)
    }
}

/// Production resolver on top of `gcp_auth`
#[derive(Clone)]
pub struct GcpAuthResolver {
    http: reqwest::Client,
}

impl GcpAuthResolver {
    /// `http` is used to reach an operator-supplied metadata host
    pub fn new(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl CredentialResolver for GcpAuthResolver {
    fn from_service_account_key(&self, key: &str, scope: AccessScope) -> Result<ScopedCredentials> {
        let account =
            CustomServiceAccount::from_json(key).context("Invalid service account key")?;
        let provider: Arc<dyn TokenProvider> = Arc::new(account);

        Ok(ScopedCredentials::new(
            scope,
            Arc::new(GcpAuthTokens::new(provider)),
        ))
    }

    async fn ambient(&self, scope: AccessScope, metadata_host: &str) -> Result<ScopedCredentials> {
        if metadata_host == METADATA_HOST {
            let provider = gcp_auth::provider()
                .await
                .context("Failed to discover application default credentials")?;
            return Ok(ScopedCredentials::new(
                scope,
                Arc::new(GcpAuthTokens::new(provider)),
            ));
        }

        // Only the metadata server moves; file-based sources still come first
        if let Some(provider) = file_credentials().await? {
            return Ok(ScopedCredentials::new(
                scope,
                Arc::new(GcpAuthTokens::new(provider)),
            ));
        }

        tracing::info!("Using metadata server at {} for {} credentials", metadata_host, scope);
        let server = MetadataServer::new(self.http.clone(), metadata_host)?;
        Ok(ScopedCredentials::new(scope, Arc::new(server)))
    }
}

/// Credentials from `GOOGLE_APPLICATION_CREDENTIALS`, then the gcloud
/// application default credentials file
async fn file_credentials() -> Result<Option<Arc<dyn TokenProvider>>> {
    if let Some(account) = CustomServiceAccount::from_env()
        .context("Failed to read GOOGLE_APPLICATION_CREDENTIALS")?
    {
        tracing::info!("Using service account from GOOGLE_APPLICATION_CREDENTIALS");
        return Ok(Some(Arc::new(account)));
    }

    match ConfigDefaultCredentials::new().await {
        Ok(credentials) => {
            tracing::info!("Using gcloud application default credentials");
            Ok(Some(Arc::new(credentials)))
        }
        Err(e) => {
            tracing::debug!("No gcloud application default credentials: {}", e);
            Ok(None)
        }
    }
}

/// [`HttpSend`] that attaches a bearer token for its scope to every request
#[derive(Debug, Clone)]
pub struct AuthorizedTransport<S = reqwest::Client> {
    inner: S,
    credentials: ScopedCredentials,
}

impl<S: HttpSend> AuthorizedTransport<S> {
    pub fn new(inner: S, credentials: ScopedCredentials) -> Self {
        Self { inner, credentials }
    }

    pub fn scope(&self) -> AccessScope {
        self.credentials.scope()
    }
}

#[async_trait]
impl<S: HttpSend> HttpSend for AuthorizedTransport<S> {
    async fn send(&self, mut request: Request) -> Result<Response> {
        let token = self
            .credentials
            .token()
            .await
            .with_context(|| format!("Failed to authorize {} request", self.scope()))?;

        // Security: keep the token out of Debug output and HTTP/2 header tables
        let mut value =
            HeaderValue::from_str(&format!("Bearer {}", token)).context("Invalid access token")?;
        value.set_sensitive(true);
        request.headers_mut().insert(AUTHORIZATION, value);

        self.inner.send(request).await
    }
}
