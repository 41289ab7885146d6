//! Output handling for collected results.
//!
//! ## Components
//!
//! - **Output**: the output sink writing JSON artifacts and the running log
//! - **Hashing**: SHA-256 of every written artifact
//! - **Summary**: end-of-run summary listing all artifacts
//!
//! ## Usage Example
//!
//! ```no_run
//! use std::path::Path;
//! use cirrus_collector::utils::output::{Destination, FileSink, OutputSink};
//!
//! # fn example() -> anyhow::Result<()> {
//! let sink = FileSink::new(Path::new("output"), Path::new("google_collectors.log"), "cirrus gw ...")?;
//! let receipt = sink.deliver(&serde_json::json!([{"id": "1"}]), &Destination::new("gmail", "labels", false))?;
//! println!("Wrote {} ({:?})", receipt.path.display(), receipt.sha256);
//! # Ok(())
//! # }
//! ```

/// Run summary generation
pub mod summary;

/// Cryptographic hash calculation utilities
pub mod hash;

/// Output sink for artifacts and the running log
pub mod output;
