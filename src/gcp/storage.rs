//! Cloud Storage service facade

use super::compute::parse_base_url;
use super::http::ApiClient;
use super::transport::HttpSend;
use anyhow::{Context, Result};
use serde_json::Value;
use std::sync::Arc;
use url::Url;

/// Production Cloud Storage JSON API endpoint
pub const STORAGE_BASE_URL: &str = "https://storage.googleapis.com/storage/v1/";

/// Typed access to the Cloud Storage API over an authorized sender
#[derive(Clone)]
pub struct StorageService {
    api: ApiClient,
    base_url: Url,
}

impl StorageService {
    pub fn new(sender: Arc<dyn HttpSend>) -> Result<Self> {
        Self::with_base_url(sender, STORAGE_BASE_URL)
    }

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

    /// Build Cloud Storage API URL
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Build Cloud Storage bucket URL
    pub fn bucket_url(&self, bucket: &str) -> String {
        self.url(&format!("b/{}", bucket))
    }

    /// Build Cloud Storage objects URL
    pub fn objects_url(&self, bucket: &str) -> String {
        self.url(&format!("b/{}/o", bucket))
    }

    /// Object names may contain slashes, so they are percent-encoded whole
    pub fn object_url(&self, bucket: &str, object: &str) -> String {
        format!("{}/{}", self.objects_url(bucket), urlencoding::encode(object))
    }

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

    /// List bucket names in a project, following `nextPageToken` until
    /// every page has been read
    pub async fn list_buckets(&self, project: &str) -> Result<Vec<String>> {
        let mut buckets = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut url = format!("{}?project={}", self.url("b"), urlencoding::encode(project));
            if let Some(token) = &page_token {
                url.push_str(&format!("&pageToken={}", urlencoding::encode(token)));
            }

            let response = self
                .get(&url)
                .await
                .with_context(|| format!("Failed to list buckets in {}", project))?;

            if let Some(items) = response.get("items").and_then(|v| v.as_array()) {
                buckets.extend(
                    items
                        .iter()
                        .filter_map(|b| b.get("name").and_then(|v| v.as_str()))
                        .map(String::from),
                );
            }

            page_token = response
                .get("nextPageToken")
                .and_then(|v| v.as_str())
                .filter(|t| !t.is_empty())
                .map(String::from);

            if page_token.is_none() {
                break;
            }
            tracing::debug!("Listing next page of buckets in {}", project);
        }

        Ok(buckets)
    }

    pub async fn get_bucket(&self, bucket: &str) -> Result<Value> {
        self.get(&self.bucket_url(bucket))
            .await
            .with_context(|| format!("Failed to get bucket {}", bucket))
    }

    pub async fn delete_object(&self, bucket: &str, object: &str) -> Result<()> {
        self.delete(&self.object_url(bucket, object))
            .await
            .with_context(|| format!("Failed to delete gs://{}/{}", bucket, object))?;
        Ok(())
    }
}
