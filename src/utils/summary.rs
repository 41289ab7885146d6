use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde_json::json;
use uuid::Uuid;

use crate::utils::output::{artifact_timestamp, ArtifactReceipt, FileSink};

/// Create a JSON summary of a collection run.
///
/// Lists every artifact the sink wrote with its record count and hash, so
/// the output folder can be checked for completeness and tampering later.
///
/// # Example Output
///
/// ```json
/// {
///   "collection_id": "550e8400-e29b-41d4-a716-446655440000",
///   "hostname": "ir-workstation",
///   "started_at": "2024-01-15T14:30:52Z",
///   "finished_at": "2024-01-15T14:41:07Z",
///   "artifact_count": 12,
///   "record_count": 40412,
///   "artifacts": [...]
/// }
/// ```
pub fn create_run_summary(
    hostname: &str,
    started: DateTime<Utc>,
    finished: DateTime<Utc>,
    receipts: &[ArtifactReceipt],
) -> Result<String> {
    let artifacts: Vec<_> = receipts
        .iter()
        .map(|r| {
            json!({
                "path": r.path.to_string_lossy().replace('\\', "/"),
                "module": r.module,
                "function": r.function_item,
                "records": r.records,
                "sha256": r.sha256,
                "partial_dump": r.partial,
                "written_at": r.written_at,
            })
        })
        .collect();

    let summary = json!({
        "collection_id": Uuid::new_v4().to_string(),
        "hostname": hostname,
        "started_at": started.to_rfc3339(),
        "finished_at": finished.to_rfc3339(),
        "duration_seconds": (finished - started).num_seconds(),
        "collector_version": env!("CARGO_PKG_VERSION"),
        "artifact_count": receipts.len(),
        "record_count": receipts.iter().map(|r| r.records).sum::<usize>(),
        "artifacts": artifacts,
    });

    serde_json::to_string_pretty(&summary).context("Failed to serialize run summary to JSON")
}

/// Write `run_summary_{timestamp}.json` into the sink's output folder
pub fn write_run_summary(sink: &FileSink, started: DateTime<Utc>) -> Result<PathBuf> {
    let hostname = hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    let summary = create_run_summary(&hostname, started, Utc::now(), &sink.receipts())?;
    let path = sink
        .folder()
        .join(format!("run_summary_{}.json", artifact_timestamp()));
    fs::write(&path, summary)
        .with_context(|| format!("Failed to write run summary {}", path.display()))?;
    Ok(path)
}
