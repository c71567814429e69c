//! Compute Engine service facade

use super::http::ApiClient;
use super::transport::HttpSend;
use anyhow::{bail, Context, Result};
use serde_json::Value;
use std::sync::Arc;
use url::Url;

/// Production Compute Engine v1 endpoint
pub const COMPUTE_BASE_URL: &str = "https://compute.googleapis.com/compute/v1/";

/// Parse and normalize a service base URL (http/https, trailing slash)
pub(crate) fn parse_base_url(base_url: &str) -> Result<Url> {
    let mut url = Url::parse(base_url).with_context(|| format!("Invalid base URL: {}", base_url))?;

    if !matches!(url.scheme(), "http" | "https") {
        bail!("Unsupported base URL scheme: {}", url.scheme());
    }

    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }

    Ok(url)
}

/// Typed access to the Compute Engine API over an authorized sender
#[derive(Clone)]
pub struct ComputeService {
    api: ApiClient,
    base_url: Url,
}

impl ComputeService {
    pub fn new(sender: Arc<dyn HttpSend>) -> Result<Self> {
        Self::with_base_url(sender, COMPUTE_BASE_URL)
    }

    /// Target another endpoint (emulators, private service connect, tests)
    pub fn with_base_url(sender: Arc<dyn HttpSend>, base_url: &str) -> Result<Self> {
        Ok(Self {
            api: ApiClient::new(sender),
            base_url: parse_base_url(base_url)?,
        })
    }

    pub fn set_user_agent(&mut self, user_agent: &str) -> Result<()> {
        self.api.set_user_agent(user_agent)
    }

    pub fn user_agent(&self) -> &str {
        self.api.user_agent()
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    // =========================================================================
    // URL helpers
    // =========================================================================

    /// Build Compute Engine API URL
    pub fn project_url(&self, project: &str, path: &str) -> String {
        if path.is_empty() {
            format!("{}projects/{}", self.base_url, project)
        } else {
            format!("{}projects/{}/{}", self.base_url, project, path)
        }
    }

    /// Build zonal Compute Engine API URL
    pub fn zonal_url(&self, project: &str, zone: &str, resource: &str) -> String {
        self.project_url(project, &format!("zones/{}/{}", zone, resource))
    }

    /// Build regional Compute Engine API URL
    pub fn regional_url(&self, project: &str, region: &str, resource: &str) -> String {
        self.project_url(project, &format!("regions/{}/{}", region, resource))
    }

    /// Build global Compute Engine API URL
    pub fn global_url(&self, project: &str, resource: &str) -> String {
        self.project_url(project, &format!("global/{}", resource))
    }

    /// Build aggregated Compute Engine API URL (all zones)
    pub fn aggregated_url(&self, project: &str, resource: &str) -> String {
        self.project_url(project, &format!("aggregated/{}", resource))
    }

    // =========================================================================
    // Requests
    // =========================================================================

    pub async fn get(&self, url: &str) -> Result<Value> {
        self.api.get(url).await
    }

    pub async fn post(&self, url: &str, body: Option<&Value>) -> Result<Value> {
        self.api.post(url, body).await
    }

    pub async fn patch(&self, url: &str, body: &Value) -> Result<Value> {
        self.api.patch(url, body).await
    }

    pub async fn delete(&self, url: &str) -> Result<Value> {
        self.api.delete(url).await
    }

    /// Fetch project metadata and quotas
    pub async fn get_project(&self, project: &str) -> Result<Value> {
        self.get(&self.project_url(project, ""))
            .await
            .with_context(|| format!("Failed to get project {}", project))
    }

    pub async fn get_zone(&self, project: &str, zone: &str) -> Result<Value> {
        self.get(&self.project_url(project, &format!("zones/{}", zone)))
            .await
            .with_context(|| format!("Failed to get zone {}", zone))
    }

    pub async fn get_disk_type(&self, project: &str, zone: &str, disk_type: &str) -> Result<Value> {
        self.get(&self.zonal_url(project, zone, &format!("diskTypes/{}", disk_type)))
            .await
            .with_context(|| format!("Failed to get disk type {} in {}", disk_type, zone))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(base: &str) -> ComputeService {
        ComputeService::with_base_url(Arc::new(reqwest::Client::new()), base).unwrap()
    }

    #[test]
    fn test_default_urls() {
        let compute = ComputeService::new(Arc::new(reqwest::Client::new())).unwrap();
        assert_eq!(
            compute.zonal_url("bosh", "us-central1-a", "disks"),
            "https://compute.googleapis.com/compute/v1/projects/bosh/zones/us-central1-a/disks"
        );
        assert_eq!(
            compute.global_url("bosh", "images"),
            "https://compute.googleapis.com/compute/v1/projects/bosh/global/images"
        );
        assert_eq!(
            compute.project_url("bosh", ""),
            "https://compute.googleapis.com/compute/v1/projects/bosh"
        );
    }

    #[test]
    fn test_base_url_gets_trailing_slash() {
        let compute = service("http://127.0.0.1:9000/compute/v1");
        assert_eq!(
            compute.regional_url("bosh", "us-east1", "addresses"),
            "http://127.0.0.1:9000/compute/v1/projects/bosh/regions/us-east1/addresses"
        );
        assert_eq!(
            compute.aggregated_url("bosh", "instances"),
            "http://127.0.0.1:9000/compute/v1/projects/bosh/aggregated/instances"
        );
    }

    #[test]
    fn test_invalid_base_url_is_rejected() {
        let sender: Arc<dyn HttpSend> = Arc::new(reqwest::Client::new());
        assert!(ComputeService::with_base_url(sender.clone(), "not a url").is_err());
        assert!(ComputeService::with_base_url(sender, "ftp://example.com/compute/v1/").is_err());
    }

    #[test]
    fn test_user_agent_is_settable() {
        let mut compute = service(COMPUTE_BASE_URL);
        assert_eq!(compute.user_agent(), crate::USER_AGENT);
        compute.set_user_agent("bosh-google-cpi/1.0").unwrap();
        assert_eq!(compute.user_agent(), "bosh-google-cpi/1.0");
        assert!(compute.set_user_agent("bad\nagent").is_err());
    }
}
