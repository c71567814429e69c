//! GCP API interaction module
//!
//! Builds an authenticated, retrying client for the Compute Engine and
//! Cloud Storage APIs.
//!
//! # Module Structure
//!
//! - [`transport`] - The [`HttpSend`](transport::HttpSend) request-sending seam
//! - [`retry`] - Retrying transport with exponential backoff on 5xx
//! - [`auth`] - Access scopes, credential strategies and the authorizing transport
//! - [`http`] - JSON request helper shared by the service facades
//! - [`compute`] - Compute Engine facade
//! - [`storage`] - Cloud Storage facade
//! - [`client`] - The composite client and its builder
//!
//! # Example
//!
//! ```ignore
//! use gcp_cpi_client::{Config, GoogleClient};
//!
//! async fn example(config: Config) -> anyhow::Result<()> {
//!     let client = GoogleClient::new(config, tracing::info_span!("cpi")).await?;
//!     let compute = client.compute_service();
//!     let disks = compute
//!         .get(&compute.zonal_url(client.project(), client.default_zone(), "disks"))
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod client;
pub mod compute;
pub mod http;
pub mod retry;
pub mod storage;
pub mod transport;
