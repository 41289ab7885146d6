//! Google API access.
//!
//! The collectors only see the [`client::ApiClient`] capability: one call,
//! one classified result. [`rest::RestClient`] implements it over HTTPS
//! using the services' discovery documents, and [`credentials`] carries the
//! service account identity and its per-user delegation.
//!
//! ## Usage Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use cirrus_collector::cloud::credentials::{EnvTokenSource, ServiceAccountCredentials, ServiceAccountKey};
//! use cirrus_collector::cloud::rest::{DiscoveryCache, RestClient, ServiceEndpoint};
//!
//! # fn example() -> anyhow::Result<()> {
//! let key = ServiceAccountKey::load(Path::new("key.json"))?;
//! let creds = Arc::new(ServiceAccountCredentials::new(key, &["https://www.googleapis.com/auth/gmail.readonly"]));
//! let client = RestClient::new(
//!     ServiceEndpoint::gmail(),
//!     creds,
//!     Arc::new(EnvTokenSource::new("CIRRUS_ACCESS_TOKEN")),
//!     Arc::new(DiscoveryCache::new()),
//! )?;
//! # Ok(())
//! # }
//! ```

/// The paged-API client capability and its error classification
pub mod client;

/// Service account keys, delegation and bearer tokens
pub mod credentials;

/// Discovery-driven REST implementation
pub mod rest;

pub use client::{ApiClient, ClientError, ClientFactory};
pub use credentials::{Credentials, EnvTokenSource, ServiceAccountCredentials, ServiceAccountKey, TokenSource};
pub use rest::{DiscoveryCache, RestClient, RestClientFactory, ServiceEndpoint};
