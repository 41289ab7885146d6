//! # cirrus-collector
//!
//! A forensic evidence collector for Google Cloud Platform and Google
//! Workspace, written in Rust.
//!
//! ## Overview
//!
//! Every collection is a paged Google API action described by a
//! [`models::RequestDescriptor`]. The [`collectors::CollectionDriver`] pages
//! through it with bounded retries and flushes oversized results as partial
//! dumps, so memory stays bounded however much evidence a tenant holds.
//! [`collectors::BatchIterator`] repeats one action over many users or
//! groups, delegating credentials per user when a call must act as them.
//! Results land in an [`utils::output::OutputSink`]: one JSON artifact per
//! delivery plus a running text log that doubles as the audit trail.
//!
//! ## Features
//!
//! - **Google Workspace**: Admin Directory, Reports activity logs, Gmail settings and content
//! - **Google Cloud Platform**: historical Cloud Logging entries, log previews, asset inventory
//! - **Partial dumps**: results past the page threshold are written as numbered chunks
//! - **Per-subject isolation**: a failing user never stops the rest of a batch
//! - **Integrity**: SHA-256 of every artifact in the running log and the run summary
//!
//! ## Usage
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use cirrus_collector::cloud::{DiscoveryCache, EnvTokenSource, RestClient, ServiceAccountCredentials, ServiceAccountKey, ServiceEndpoint};
//! use cirrus_collector::collectors::CollectionDriver;
//! use cirrus_collector::models::RequestDescriptor;
//! use cirrus_collector::utils::output::FileSink;
//!
//! # fn main() -> anyhow::Result<()> {
//! let key = ServiceAccountKey::load(Path::new("key.json"))?;
//! let credentials = Arc::new(ServiceAccountCredentials::new(
//!     key,
//!     &["https://www.googleapis.com/auth/cloud-platform.read-only"],
//! ));
//! let client = RestClient::new(
//!     ServiceEndpoint::cloud_asset(),
//!     credentials.clone(),
//!     Arc::new(EnvTokenSource::new("CIRRUS_ACCESS_TOKEN")),
//!     Arc::new(DiscoveryCache::new()),
//! )?;
//! let sink = Arc::new(FileSink::new(Path::new("output"), Path::new("google_collectors.log"), "example")?);
//!
//! let driver = CollectionDriver::new("asset_inventory", Box::new(client), credentials, sink);
//! let descriptor = RequestDescriptor::list("assets")
//!     .param("parent", "projects/case-123")
//!     .param("contentType", "IAM_POLICY")
//!     .inner("assets");
//! driver.execute(&descriptor);
//! driver.close();
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Organization
//!
//! - [`cli`]: Command-line interface definitions and argument validation
//! - [`models`]: Request descriptors, result envelopes and probe results
//! - [`collectors`]: Collection driver, batch iterator and the Workspace / GCP collectors
//! - [`config`]: YAML configuration
//! - [`cloud`]: Google API client capability, REST implementation and credentials
//! - [`utils`]: Output sink, hashing and the run summary
//! - [`security`]: Credential scrubbing
//! - [`constants`]: Application-wide constants

/// Command-line interface definitions and argument validation
pub mod cli;

/// Core data models used throughout the collector
pub mod models;

/// Collection engine and the Google Workspace / GCP collectors
pub mod collectors;

/// Output sink, hashing and run summary
pub mod utils;

/// Google API access
pub mod cloud;

/// Configuration management
pub mod config;

/// Application constants and configuration values
pub mod constants;

/// Credential protection for logged error text
pub mod security;

/// Test utilities and helpers
#[cfg(test)]
pub mod test_utils;
