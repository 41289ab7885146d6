//! Collection engine and the collectors built on it.
//!
//! [`driver::CollectionDriver`] pages through one API action at a time and
//! [`batch::BatchIterator`] repeats it over subjects. The `workspace` and
//! `gcp` modules hold the descriptors and orchestration for each data
//! category; they own a driver instead of extending one.

pub mod batch;
pub mod driver;
pub mod error;
pub mod gcp;
pub mod workspace;

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use log::warn;

use crate::cloud::client::ClientFactory;
use crate::cloud::credentials::Credentials;
use crate::utils::output::OutputSink;

pub use batch::{BatchIterator, BatchOptions, BatchReport};
pub use driver::{CollectionDriver, DriverLimits, Outcome};
pub use error::CollectionError;

/// A driver for `module` whose own client is built for `credentials`
pub fn build_driver(
    module: &str,
    factory: &dyn ClientFactory,
    credentials: &Arc<dyn Credentials>,
    sink: &Arc<dyn OutputSink>,
    limits: &DriverLimits,
) -> Result<CollectionDriver> {
    let client = factory
        .build(Arc::clone(credentials))
        .with_context(|| format!("Failed to build the {} client", module))?;
    Ok(CollectionDriver::new(module, client, Arc::clone(credentials), Arc::clone(sink)).with_limits(limits.clone()))
}

/// Remember a failed operation and keep going
pub(crate) fn track(outcome: Outcome, failures: &mut Vec<String>) {
    if let Outcome::Failed(e) = outcome {
        failures.push(e.to_string());
    }
}

/// Turn the failures of independent operations into one error
pub(crate) fn settle(module: &str, failures: Vec<String>) -> Result<()> {
    if failures.is_empty() {
        return Ok(());
    }
    warn!("{} operation(s) failed in {}", failures.len(), module);
    bail!("{} operation(s) failed in {}:\n{}", failures.len(), module, failures.join("\n"))
}

/// Comma separated CLI list, trimmed, empty entries dropped
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}
