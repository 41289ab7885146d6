//! Shared fakes for the integration tests.
//!
//! The library's own test helpers are `cfg(test)` only, so the integration
//! tests carry small stand-ins for the client capability and credentials.

#![allow(dead_code)]

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Result};
use serde_json::{json, Value};
use tempfile::TempDir;

use cirrus_collector::cloud::{ApiClient, ClientError, ClientFactory, Credentials};
use cirrus_collector::collectors::DriverLimits;
use cirrus_collector::models::Params;
use cirrus_collector::utils::output::{record_count, ArtifactReceipt, Destination, FileSink, OutputSink, SinkError};

pub const RECORDS_PER_PAGE: usize = 10;

/// Limits without retry delays
pub fn test_limits(max_pages: usize) -> DriverLimits {
    DriverLimits {
        max_pages,
        max_retry: 3,
        retry_delay: Duration::ZERO,
        event_milestone: 0,
    }
}

/// A temporary output folder with a `FileSink` writing into it
pub fn file_sink() -> Result<(TempDir, Arc<FileSink>)> {
    let dir = TempDir::new()?;
    let sink = FileSink::new(
        &dir.path().join("output"),
        &dir.path().join("google_collectors.log"),
        "cirrus gw --key-file key.json all",
    )?;
    Ok((dir, Arc::new(sink)))
}

/// Client serving `total_pages` pages of records, chained by `pageToken`.
///
/// Subjects listed in `rejected` (matched on any param value) get a
/// non-retryable error instead.
#[derive(Clone, Default)]
pub struct PagedClient {
    total_pages: usize,
    rejected: Arc<HashSet<String>>,
    calls: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
}

impl PagedClient {
    pub fn new(total_pages: usize) -> Self {
        Self {
            total_pages,
            ..Default::default()
        }
    }

    pub fn rejecting(mut self, subjects: &[&str]) -> Self {
        self.rejected = Arc::new(subjects.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    fn page(&self, params: &Params) -> Result<Value, ClientError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let rejected = params
            .values()
            .filter_map(Value::as_str)
            .any(|value| self.rejected.contains(value));
        if rejected {
            return Err(ClientError::Other("HTTP 403: Not Authorized to access this resource/api".to_string()));
        }

        let number: usize = params
            .get("pageToken")
            .and_then(Value::as_str)
            .and_then(|token| token.trim_start_matches('p').parse().ok())
            .unwrap_or(1);
        let offset = (number - 1) * RECORDS_PER_PAGE;
        let items: Vec<Value> = (offset..offset + RECORDS_PER_PAGE)
            .map(|i| json!({"id": i, "kind": "admin#directory#user"}))
            .collect();
        let mut page = json!({ "items": items });
        if number < self.total_pages {
            page["nextPageToken"] = json!(format!("p{}", number + 1));
        }
        Ok(page)
    }
}

impl ApiClient for PagedClient {
    fn list(&self, _base: &[String], _function: &str, params: &Params) -> Result<Value, ClientError> {
        self.page(params)
    }

    fn get(&self, _base: &[String], _function: &str, params: &Params) -> Result<Value, ClientError> {
        self.page(params)
    }

    fn create(&self, _base: &[String], _function: &str, params: &Params) -> Result<Value, ClientError> {
        self.page(params)
    }

    fn invoke(&self, _base: &[String], _function: &str, params: &Params) -> Result<Value, ClientError> {
        self.page(params)
    }

    fn close(&self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Builds a clone of one `PagedClient` for every credential, remembering the identities
#[derive(Clone)]
pub struct PagedFactory {
    client: PagedClient,
    builds: Arc<Mutex<Vec<String>>>,
}

impl PagedFactory {
    pub fn new(client: PagedClient) -> Self {
        Self {
            client,
            builds: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn builds(&self) -> Vec<String> {
        self.builds.lock().unwrap().clone()
    }
}

impl ClientFactory for PagedFactory {
    fn build(&self, credentials: Arc<dyn Credentials>) -> Result<Box<dyn ApiClient>> {
        self.builds.lock().unwrap().push(credentials.identity());
        Ok(Box::new(self.client.clone()))
    }
}

/// Service account stand-in counting delegations per subject
#[derive(Debug, Clone)]
pub struct FakeServiceAccount {
    email: String,
    subject: Option<String>,
    scopes: Vec<String>,
    derivations: Arc<Mutex<Vec<String>>>,
}

impl FakeServiceAccount {
    pub fn new(email: &str) -> Self {
        Self {
            email: email.to_string(),
            subject: None,
            scopes: vec!["https://www.googleapis.com/auth/gmail.readonly".to_string()],
            derivations: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn derivations(&self) -> Vec<String> {
        self.derivations.lock().unwrap().clone()
    }
}

impl Credentials for FakeServiceAccount {
    fn identity(&self) -> String {
        self.subject.clone().unwrap_or_else(|| self.email.clone())
    }

    fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    fn scopes(&self) -> &[String] {
        &self.scopes
    }

    fn derive_scoped(&self, subject: &str) -> Result<Arc<dyn Credentials>> {
        if subject.is_empty() {
            bail!("Cannot delegate to an empty subject");
        }
        self.derivations.lock().unwrap().push(subject.to_string());
        Ok(Arc::new(Self {
            subject: Some(subject.to_string()),
            ..self.clone()
        }))
    }
}

/// In-memory sink for property tests that would otherwise hit the disk
#[derive(Default)]
pub struct MemorySink {
    deliveries: Mutex<Vec<(usize, Destination)>>,
}

impl MemorySink {
    pub fn deliveries(&self) -> Vec<(usize, Destination)> {
        self.deliveries.lock().unwrap().clone()
    }
}

impl OutputSink for MemorySink {
    fn deliver(&self, payload: &Value, destination: &Destination) -> Result<ArtifactReceipt, SinkError> {
        let records = record_count(payload);
        self.deliveries.lock().unwrap().push((records, destination.clone()));
        Ok(ArtifactReceipt {
            path: PathBuf::from(format!("{}.json", destination.stem())),
            module: destination.module.clone(),
            function_item: destination.function_item.clone(),
            records,
            sha256: None,
            partial: destination.partial,
            written_at: String::new(),
        })
    }

    fn append_note(&self, _text: &str) -> Result<(), SinkError> {
        Ok(())
    }
}
