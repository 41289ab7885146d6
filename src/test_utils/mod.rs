//! Test utilities for cirrus-collector
//!
//! Scripted API clients, a recording output sink and counting credentials
//! shared by the unit tests of the driver, the batch iterator and the
//! domain collectors.

#![cfg(test)]

use std::time::Duration;

use anyhow::Result;
use tempfile::TempDir;

use crate::collectors::driver::DriverLimits;

/// Creates a temporary directory that is automatically cleaned up
pub fn create_temp_dir() -> Result<TempDir> {
    Ok(TempDir::new()?)
}

/// Driver limits with no sleeping between retries
pub fn fast_limits() -> DriverLimits {
    DriverLimits {
        retry_delay: Duration::ZERO,
        ..DriverLimits::default()
    }
}

/// Test data generators for API responses
pub mod generators {
    use serde_json::{json, Value};

    use crate::constants::test::TEST_RECORDS_PER_PAGE;

    /// One page of `count` records under `items`, numbered from `offset`
    pub fn page(count: usize, offset: usize, next_token: Option<&str>) -> Value {
        let items: Vec<Value> = (offset..offset + count)
            .map(|i| json!({ "id": format!("id-{}", i), "index": i }))
            .collect();
        let mut page = json!({ "kind": "test#page", "items": items });
        if let Some(token) = next_token {
            page["nextPageToken"] = json!(token);
        }
        page
    }

    /// `total` pages of `TEST_RECORDS_PER_PAGE` records, chained by tokens
    pub fn paged_responses(total: usize) -> Vec<Value> {
        (0..total)
            .map(|i| {
                let token = format!("token-{}", i + 1);
                let next = if i + 1 < total { Some(token.as_str()) } else { None };
                page(TEST_RECORDS_PER_PAGE, i * TEST_RECORDS_PER_PAGE, next)
            })
            .collect()
    }
}

/// Fake collaborators for the collection driver
pub mod fakes {
    use std::collections::{HashMap, VecDeque};
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use anyhow::{bail, Result};
    use serde_json::{json, Value};

    use crate::cloud::client::{ApiClient, ClientError, ClientFactory};
    use crate::cloud::credentials::Credentials;
    use crate::models::{ActionKind, Params};
    use crate::utils::output::{record_count, ArtifactReceipt, Destination, OutputSink, SinkError};

    /// A recorded call: action, base, function, params
    pub type RecordedCall = (ActionKind, Vec<String>, String, Params);

    /// Client replaying scripted results in order; `{}` once exhausted.
    ///
    /// Clones share the script and the call log, so a test can keep a handle
    /// after moving the client into a driver.
    #[derive(Clone, Default)]
    pub struct ScriptedClient {
        script: Arc<Mutex<VecDeque<Result<Value, ClientError>>>>,
        calls: Arc<Mutex<Vec<RecordedCall>>>,
        closed: Arc<AtomicUsize>,
    }

    impl ScriptedClient {
        pub fn new(script: Vec<Result<Value, ClientError>>) -> Self {
            Self {
                script: Arc::new(Mutex::new(script.into())),
                ..Default::default()
            }
        }

        pub fn pages(pages: Vec<Value>) -> Self {
            Self::new(pages.into_iter().map(Ok).collect())
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }

        pub fn calls(&self) -> Vec<RecordedCall> {
            self.calls.lock().unwrap().clone()
        }

        pub fn close_count(&self) -> usize {
            self.closed.load(Ordering::SeqCst)
        }

        fn next(&self, action: ActionKind, base: &[String], function: &str, params: &Params) -> Result<Value, ClientError> {
            self.calls
                .lock()
                .unwrap()
                .push((action, base.to_vec(), function.to_string(), params.clone()));
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(json!({})))
        }
    }

    impl ApiClient for ScriptedClient {
        fn list(&self, base: &[String], function: &str, params: &Params) -> Result<Value, ClientError> {
            self.next(ActionKind::List, base, function, params)
        }

        fn get(&self, base: &[String], function: &str, params: &Params) -> Result<Value, ClientError> {
            self.next(ActionKind::Get, base, function, params)
        }

        fn create(&self, base: &[String], function: &str, params: &Params) -> Result<Value, ClientError> {
            self.next(ActionKind::Create, base, function, params)
        }

        fn invoke(&self, base: &[String], function: &str, params: &Params) -> Result<Value, ClientError> {
            self.next(ActionKind::Invoke, base, function, params)
        }

        fn close(&self) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Factory handing out a scripted client per identity
    #[derive(Clone, Default)]
    pub struct ScriptedFactory {
        clients: Arc<Mutex<HashMap<String, ScriptedClient>>>,
        builds: Arc<Mutex<Vec<String>>>,
    }

    impl ScriptedFactory {
        pub fn new() -> Self {
            Self::default()
        }

        /// Script the client built for `identity`
        pub fn with_client(self, identity: &str, client: ScriptedClient) -> Self {
            self.clients.lock().unwrap().insert(identity.to_string(), client);
            self
        }

        pub fn client_for(&self, identity: &str) -> Option<ScriptedClient> {
            self.clients.lock().unwrap().get(identity).cloned()
        }

        /// Identities clients were built for, in order
        pub fn builds(&self) -> Vec<String> {
            self.builds.lock().unwrap().clone()
        }
    }

    impl ClientFactory for ScriptedFactory {
        fn build(&self, credentials: Arc<dyn Credentials>) -> Result<Box<dyn ApiClient>> {
            let identity = credentials.identity();
            self.builds.lock().unwrap().push(identity.clone());
            let client = self
                .clients
                .lock()
                .unwrap()
                .entry(identity)
                .or_default()
                .clone();
            Ok(Box::new(client))
        }
    }

    /// Sink keeping deliveries and notes in memory
    #[derive(Default)]
    pub struct RecordingSink {
        deliveries: Mutex<Vec<(Value, Destination)>>,
        notes: Mutex<Vec<String>>,
    }

    impl RecordingSink {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn deliveries(&self) -> Vec<(Value, Destination)> {
            self.deliveries.lock().unwrap().clone()
        }

        /// Record counts of each delivery, in order
        pub fn delivered_counts(&self) -> Vec<usize> {
            self.deliveries()
                .iter()
                .map(|(payload, _)| record_count(payload))
                .collect()
        }

        pub fn notes(&self) -> Vec<String> {
            self.notes.lock().unwrap().clone()
        }

        pub fn has_note(&self, fragment: &str) -> bool {
            self.notes().iter().any(|n| n.contains(fragment))
        }
    }

    impl OutputSink for RecordingSink {
        fn deliver(&self, payload: &Value, destination: &Destination) -> Result<ArtifactReceipt, SinkError> {
            let mut deliveries = self.deliveries.lock().unwrap();
            deliveries.push((payload.clone(), destination.clone()));
            Ok(ArtifactReceipt {
                path: PathBuf::from(format!("{}_{}.json", destination.stem(), deliveries.len())),
                module: destination.module.clone(),
                function_item: destination.function_item.clone(),
                records: record_count(payload),
                sha256: None,
                partial: destination.partial,
                written_at: "test".to_string(),
            })
        }

        fn append_note(&self, text: &str) -> Result<(), SinkError> {
            self.notes.lock().unwrap().push(text.to_string());
            Ok(())
        }
    }

    /// Credentials counting how often each subject is derived
    #[derive(Debug, Clone)]
    pub struct CountingCredentials {
        identity: String,
        subject: Option<String>,
        scopes: Vec<String>,
        derived: Arc<Mutex<Vec<String>>>,
    }

    impl CountingCredentials {
        pub fn new(identity: &str) -> Self {
            Self {
                identity: identity.to_string(),
                subject: None,
                scopes: Vec::new(),
                derived: Arc::new(Mutex::new(Vec::new())),
            }
        }

        pub fn derive_count(&self, subject: &str) -> usize {
            self.derived.lock().unwrap().iter().filter(|s| *s == subject).count()
        }

        pub fn total_derivations(&self) -> usize {
            self.derived.lock().unwrap().len()
        }
    }

    impl Credentials for CountingCredentials {
        fn identity(&self) -> String {
            self.subject.clone().unwrap_or_else(|| self.identity.clone())
        }

        fn subject(&self) -> Option<&str> {
            self.subject.as_deref()
        }

        fn scopes(&self) -> &[String] {
            &self.scopes
        }

        fn derive_scoped(&self, subject: &str) -> Result<Arc<dyn Credentials>> {
            if subject.is_empty() {
                bail!("empty subject");
            }
            self.derived.lock().unwrap().push(subject.to_string());
            Ok(Arc::new(Self {
                subject: Some(subject.to_string()),
                ..self.clone()
            }))
        }
    }
}

/// Assertion helpers for driver outcomes
pub mod assertions {
    use crate::collectors::driver::Outcome;

    /// Assert the outcome was delivered with the given total record count
    pub fn assert_delivered(outcome: &Outcome, expected_records: usize) {
        match outcome {
            Outcome::Delivered { records, .. } => {
                assert_eq!(*records, expected_records, "Delivered record count mismatch")
            }
            other => panic!("Expected Delivered, got {:?}", other),
        }
    }
}
