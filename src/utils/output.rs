//! Output sink: JSON artifacts plus the running text log.
//!
//! Every delivery becomes one uniquely named file in the output folder and
//! one line in the running log. The running log is the audit trail of a run
//! and is separate from console logging.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;
use log::debug;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::constants::LOG_SEPARATOR;
use crate::utils::hash::calculate_sha256;

#[derive(Error, Debug)]
pub enum SinkError {
    /// The output folder or running log cannot be created
    #[error("cannot create {what} {}: {source}", .path.display())]
    Unavailable {
        what: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to serialize results for {function}: {source}")]
    Serialize {
        function: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Where a delivery belongs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub module: String,
    pub function_item: String,
    /// Flushed by the page threshold rather than at the end of paging
    pub partial: bool,
}

impl Destination {
    pub fn new(module: &str, function_item: &str, partial: bool) -> Self {
        Self {
            module: module.to_string(),
            function_item: function_item.to_string(),
            partial,
        }
    }

    /// `{module}_{function_item}`, the artifact name before its timestamp.
    /// Path separators coming from subjects or filters become `_`.
    pub fn stem(&self) -> String {
        format!("{}_{}", self.module, self.function_item).replace(['/', '\\', '\0'], "_")
    }
}

/// Record of one written artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactReceipt {
    pub path: PathBuf,
    pub module: String,
    pub function_item: String,
    pub records: usize,
    pub sha256: Option<String>,
    pub partial: bool,
    pub written_at: String,
}

/// Durable storage for results and notes.
pub trait OutputSink: Send + Sync {
    fn deliver(&self, payload: &Value, destination: &Destination) -> Result<ArtifactReceipt, SinkError>;

    fn append_note(&self, text: &str) -> Result<(), SinkError>;
}

/// Records in a payload: array length, envelope `data` length, or 1
pub fn record_count(payload: &Value) -> usize {
    match payload {
        Value::Array(items) => items.len(),
        Value::Object(map) => match map.get("data") {
            Some(Value::Array(items)) if map.contains_key("module") => items.len(),
            _ => 1,
        },
        Value::Null => 0,
        _ => 1,
    }
}

/// Timestamp used in artifact names, `2024-01-31_12_00_59.123`
pub fn artifact_timestamp() -> String {
    Utc::now().format("%Y-%m-%d_%H_%M_%S%.3f").to_string()
}

/// Output sink writing into a local folder.
#[derive(Debug)]
pub struct FileSink {
    folder: PathBuf,
    log_path: PathBuf,
    log: Mutex<File>,
    receipts: Mutex<Vec<ArtifactReceipt>>,
}

impl FileSink {
    /// Create the output folder and open the running log, writing the run header.
    pub fn new(folder: &Path, log_path: &Path, command_line: &str) -> Result<Self, SinkError> {
        fs::create_dir_all(folder).map_err(|source| SinkError::Unavailable {
            what: "output folder",
            path: folder.to_path_buf(),
            source,
        })?;

        if let Some(parent) = log_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| SinkError::Unavailable {
                what: "log folder",
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let unavailable = |source: io::Error| SinkError::Unavailable {
            what: "log file",
            path: log_path.to_path_buf(),
            source,
        };
        let mut log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)
            .map_err(unavailable)?;
        writeln!(
            log,
            "{}\nTime: {}\nRunning command: {}",
            LOG_SEPARATOR,
            artifact_timestamp(),
            command_line
        )
        .map_err(unavailable)?;

        Ok(Self {
            folder: folder.to_path_buf(),
            log_path: log_path.to_path_buf(),
            log: Mutex::new(log),
            receipts: Mutex::new(Vec::new()),
        })
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Every artifact written so far, in delivery order
    pub fn receipts(&self) -> Vec<ArtifactReceipt> {
        self.receipts.lock().map(|r| r.clone()).unwrap_or_default()
    }

    /// Open `{stem}.json` with create-new semantics, appending `_` to the stem
    /// until an unused name is found.
    fn create_artifact(&self, stem: &str) -> Result<(PathBuf, File), SinkError> {
        let mut stem = stem.to_string();
        loop {
            let path = self.folder.join(format!("{}.json", stem));
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => return Ok((path, file)),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => stem.push('_'),
                Err(source) => return Err(SinkError::Write { path, source }),
            }
        }
    }
}

impl OutputSink for FileSink {
    fn deliver(&self, payload: &Value, destination: &Destination) -> Result<ArtifactReceipt, SinkError> {
        let written_at = artifact_timestamp();
        let (path, file) = self.create_artifact(&format!("{}_{}", destination.stem(), written_at))?;

        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, payload).map_err(|source| SinkError::Serialize {
            function: destination.function_item.clone(),
            source,
        })?;
        writer.flush().map_err(|source| SinkError::Write {
            path: path.clone(),
            source,
        })?;
        drop(writer);

        let sha256 = match calculate_sha256(&path) {
            Ok(hash) => Some(hash),
            Err(e) => {
                debug!("Could not hash {}: {}", path.display(), e);
                None
            }
        };

        let records = record_count(payload);
        let full_path = fs::canonicalize(&path).unwrap_or_else(|_| path.clone());
        self.append_note(&format!(
            "{} results for function {} {} can be found here: {} (sha256: {}){}",
            records,
            destination.module,
            destination.function_item,
            full_path.display(),
            sha256.as_deref().unwrap_or("unavailable"),
            if destination.partial { " [partial dump]" } else { "" }
        ))?;

        let receipt = ArtifactReceipt {
            path,
            module: destination.module.clone(),
            function_item: destination.function_item.clone(),
            records,
            sha256,
            partial: destination.partial,
            written_at,
        };
        if let Ok(mut receipts) = self.receipts.lock() {
            receipts.push(receipt.clone());
        }
        Ok(receipt)
    }

    fn append_note(&self, text: &str) -> Result<(), SinkError> {
        let write_error = |source: io::Error| SinkError::Write {
            path: self.log_path.clone(),
            source,
        };
        let mut log = self
            .log
            .lock()
            .map_err(|_| write_error(io::Error::new(ErrorKind::Other, "running log lock poisoned")))?;
        writeln!(log, "{}", text).map_err(write_error)?;
        log.flush().map_err(write_error)
    }
}
