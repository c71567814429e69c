//! Request-sending seam
//!
//! [`HttpSend`] is the single primitive every layer of the client stack
//! implements: the base `reqwest` client, the authorizing transport and
//! the retrying transport all take a fully formed request and hand back
//! the response.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Request, Response};
use std::sync::Arc;

/// Something that can send one HTTP request
#[async_trait]
pub trait HttpSend: Send + Sync {
    /// Send the request and return the response, whatever its status
    async fn send(&self, request: Request) -> Result<Response>;
}

#[async_trait]
impl HttpSend for reqwest::Client {
    async fn send(&self, request: Request) -> Result<Response> {
        self.execute(request).await.context("Failed to send request")
    }
}

#[async_trait]
impl<T: HttpSend + ?Sized> HttpSend for Arc<T> {
    async fn send(&self, request: Request) -> Result<Response> {
        (**self).send(request).await
    }
}

/// Build the base HTTP client shared by every authorized transport
pub fn base_client() -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder().build()
}
