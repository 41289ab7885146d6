//! The collection driver.
//!
//! Runs one "fetch every page of X" operation: pages through the API by
//! continuation token, retries transient page failures, flushes partial
//! dumps every `max_pages` pages and hands the records to the output sink
//! (or back to the caller).

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{debug, info, warn};
use serde_json::Value;

use crate::cloud::client::{call, ApiClient, ClientError};
use crate::cloud::credentials::Credentials;
use crate::collectors::error::CollectionError;
use crate::constants::{MAX_EVENTS, MAX_PAGES, MAX_RETRY, NEXT_PAGE_TOKEN_FIELD, RETRY_BASE_DELAY_SECS};
use crate::models::{Delivery, Params, ProbeResult, RequestDescriptor, ResultEnvelope};
use crate::security::scrub_credentials;
use crate::utils::output::{ArtifactReceipt, Destination, OutputSink, SinkError};

/// Bounds applied to every operation a driver runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverLimits {
    /// Pages held in memory before a partial dump
    pub max_pages: usize,
    /// Attempts per page
    pub max_retry: usize,
    /// Attempt N waits N times this before retrying
    pub retry_delay: Duration,
    /// Progress is logged every time this many records accumulate
    pub event_milestone: usize,
}

impl Default for DriverLimits {
    fn default() -> Self {
        Self {
            max_pages: MAX_PAGES,
            max_retry: MAX_RETRY,
            retry_delay: Duration::from_secs(RETRY_BASE_DELAY_SECS),
            event_milestone: MAX_EVENTS,
        }
    }
}

/// Result of one operation.
#[derive(Debug)]
pub enum Outcome {
    /// Records were flushed to the sink
    Delivered {
        pages: usize,
        records: usize,
        artifacts: Vec<ArtifactReceipt>,
    },
    /// Records handed back instead of persisted
    Returned(Vec<Value>),
    /// Nothing matched; not an error
    Empty,
    Failed(CollectionError),
}

impl Outcome {
    /// `Failed` becomes `Err` so single operations can use `?`
    pub fn into_result(self) -> Result<Outcome, CollectionError> {
        match self {
            Outcome::Failed(e) => Err(e),
            other => Ok(other),
        }
    }

    /// Returned records, or none for every other outcome
    pub fn into_records(self) -> Vec<Value> {
        match self {
            Outcome::Returned(records) => records,
            _ => Vec::new(),
        }
    }

    /// Returned records; an oversized result still yields what was gathered
    pub fn into_returned(self) -> Result<Vec<Value>, CollectionError> {
        match self {
            Outcome::Failed(CollectionError::OversizedResult { records, .. }) => Ok(records),
            other => Ok(other.into_result()?.into_records()),
        }
    }
}

/// Pull the records out of one page.
///
/// With an inner field, only that field is taken; a missing field counts as
/// empty. Arrays contribute their items, a non-empty object or scalar
/// contributes itself.
pub fn extract_records(response: Value, inner_field: Option<&str>) -> Vec<Value> {
    let selected = match inner_field {
        Some(field) => match response {
            Value::Object(mut map) => map.remove(field).unwrap_or(Value::Null),
            _ => Value::Null,
        },
        None => response,
    };

    match selected {
        Value::Array(items) => items,
        Value::Object(map) if map.is_empty() => Vec::new(),
        Value::String(s) if s.is_empty() => Vec::new(),
        Value::Null => Vec::new(),
        other => vec![other],
    }
}

fn next_page_token(response: &Value) -> Option<String> {
    response
        .get(NEXT_PAGE_TOKEN_FIELD)
        .and_then(Value::as_str)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
}

/// Drives paged API calls for one collector module.
pub struct CollectionDriver {
    module: String,
    client: Box<dyn ApiClient>,
    credentials: Arc<dyn Credentials>,
    sink: Arc<dyn OutputSink>,
    limits: DriverLimits,
}

impl CollectionDriver {
    pub fn new(
        module: &str,
        client: Box<dyn ApiClient>,
        credentials: Arc<dyn Credentials>,
        sink: Arc<dyn OutputSink>,
    ) -> Self {
        Self {
            module: module.to_string(),
            client,
            credentials,
            sink,
            limits: DriverLimits::default(),
        }
    }

    pub fn with_limits(mut self, limits: DriverLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn credentials(&self) -> Arc<dyn Credentials> {
        Arc::clone(&self.credentials)
    }

    pub fn limits(&self) -> &DriverLimits {
        &self.limits
    }

    /// Write a line to the running log; failures only reach the console
    pub fn note(&self, text: &str) {
        if let Err(e) = self.sink.append_note(text) {
            warn!("Can't write to log: {}", e);
            info!("{}", text);
        }
    }

    /// Fetch every page of the descriptor with the driver's own client
    pub fn execute(&self, descriptor: &RequestDescriptor) -> Outcome {
        let identity = self.credentials.identity();
        self.execute_with(self.client.as_ref(), &identity, descriptor)
    }

    /// Fetch every page of the descriptor through `client`, acting as `identity`
    pub fn execute_with(&self, client: &dyn ApiClient, identity: &str, descriptor: &RequestDescriptor) -> Outcome {
        let label = descriptor.action_label();
        let shown_params = Value::Object(descriptor.params.clone());
        info!("Executing {}=>{}", self.module, label);
        self.note(&format!("Executing {}=>{}, params: {}", self.module, label, shown_params));

        let mut buffer: Vec<Value> = Vec::new();
        let mut artifacts = Vec::new();
        let mut total_records = 0;
        let mut next_milestone = self.limits.event_milestone;
        let mut partial_dump = false;
        let mut token: Option<String> = None;
        let mut page = 1;

        loop {
            let params = descriptor.params_for_page(token.as_deref());
            let response = match self.fetch_page(client, descriptor, &params, page) {
                Ok(Some(response)) => response,
                Ok(None) => break,
                Err(e) => return Outcome::Failed(e),
            };

            token = next_page_token(&response);
            let records = extract_records(response, descriptor.inner_field.as_deref());
            total_records += records.len();
            buffer.extend(records);

            while self.limits.event_milestone > 0 && total_records >= next_milestone {
                info!("{} events recorded and counting ...", next_milestone);
                next_milestone += self.limits.event_milestone;
            }

            if self.limits.max_pages > 0 && page % self.limits.max_pages == 0 {
                match descriptor.delivery {
                    Delivery::Persist => {
                        partial_dump = true;
                        if !buffer.is_empty() {
                            match self.flush(descriptor, &mut buffer, true) {
                                Ok(receipt) => artifacts.push(receipt),
                                Err(e) => return Outcome::Failed(e),
                            }
                            self.note(&format!(
                                "Partial dump for function {}, params: {}. Total Pages written: {}",
                                descriptor.function, shown_params, page
                            ));
                        }
                    }
                    Delivery::Return if token.is_some() => {
                        let error = CollectionError::OversizedResult {
                            function: descriptor.function.clone(),
                            pages: page,
                            records: buffer,
                        };
                        warn!("{}", error);
                        self.note(&error.to_string());
                        return Outcome::Failed(error);
                    }
                    Delivery::Return => {}
                }
            }

            if token.is_none() {
                break;
            }
            page += 1;
        }

        if !buffer.is_empty() {
            if descriptor.delivery == Delivery::Return {
                return Outcome::Returned(buffer);
            }

            info!("{} results were found", total_records);
            match self.flush(descriptor, &mut buffer, false) {
                Ok(receipt) => artifacts.push(receipt),
                Err(e) => return Outcome::Failed(e),
            }
            if partial_dump {
                self.note(&format!(
                    "Ended partial dump for function {}, params: {}. Total Pages written: {}",
                    descriptor.function, shown_params, page
                ));
            }
        }

        if artifacts.is_empty() {
            let message = format!(
                "No results for {} with the following params {}. Acting as {}",
                label,
                Value::Object(descriptor.display_params()),
                identity
            );
            info!("No Results Found");
            match descriptor.delivery {
                Delivery::Persist => self.note(&message),
                Delivery::Return => debug!("{}", message),
            }
            return Outcome::Empty;
        }

        Outcome::Delivered {
            pages: page,
            records: total_records,
            artifacts,
        }
    }

    /// One page with retries. `Ok(None)` means the entity does not exist.
    fn fetch_page(
        &self,
        client: &dyn ApiClient,
        descriptor: &RequestDescriptor,
        params: &Params,
        page: usize,
    ) -> Result<Option<Value>, CollectionError> {
        let attempts = self.limits.max_retry.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match call(client, descriptor.action, &descriptor.base, &descriptor.function, params) {
                Ok(response) => return Ok(Some(response)),
                Err(ClientError::NotFound(message)) => {
                    debug!("{}: {}", descriptor.action_label(), scrub_credentials(&message));
                    self.note("Requested entity was not found");
                    return Ok(None);
                }
                Err(error) if error.is_retryable() => {
                    last_error = scrub_credentials(error.message());
                    if attempt < attempts {
                        let delay = self.limits.retry_delay.saturating_mul(attempt as u32);
                        info!(
                            "Failed to retrieve {}, page #{}, params {}.\nException: {}\nRetrying in {} seconds...",
                            descriptor.action_label(),
                            page,
                            Value::Object(descriptor.display_params()),
                            last_error,
                            delay.as_secs()
                        );
                        thread::sleep(delay);
                    }
                }
                Err(rejected) => {
                    let error = CollectionError::Rejected {
                        function: descriptor.function.clone(),
                        action: descriptor.action.suffix(),
                        page,
                        message: scrub_credentials(rejected.message()),
                    };
                    warn!("{}", error);
                    self.note(&error.to_string());
                    return Err(error);
                }
            }
        }

        let error = CollectionError::RetriesExhausted {
            function: descriptor.function.clone(),
            action: descriptor.action.suffix(),
            page,
            attempts,
            last_error,
        };
        warn!("{}", error);
        self.note(&error.to_string());
        Err(error)
    }

    /// Hand the buffer to the sink and clear it
    fn flush(
        &self,
        descriptor: &RequestDescriptor,
        buffer: &mut Vec<Value>,
        partial: bool,
    ) -> Result<ArtifactReceipt, CollectionError> {
        let records = std::mem::take(buffer);
        let delivery_error = |source: SinkError| CollectionError::Delivery {
            function: descriptor.function.clone(),
            source,
        };

        let payload = if descriptor.results_only {
            Value::Array(records)
        } else {
            let envelope = ResultEnvelope {
                module: self.module.clone(),
                function: descriptor.function.clone(),
                params: descriptor.display_params(),
                data: records,
            };
            serde_json::to_value(envelope).map_err(|source| {
                delivery_error(SinkError::Serialize {
                    function: descriptor.function.clone(),
                    source,
                })
            })?
        };

        let destination = Destination::new(&self.module, &descriptor.function_item(), partial);
        self.sink.deliver(&payload, &destination).map_err(delivery_error)
    }

    /// Single un-retried call, for checking access before a collection
    pub fn probe(&self, descriptor: &RequestDescriptor) -> ProbeResult {
        match call(
            self.client.as_ref(),
            descriptor.action,
            &descriptor.base,
            &descriptor.function,
            &descriptor.params,
        ) {
            Ok(response) => ProbeResult {
                success: true,
                response: Some(response),
                error: None,
            },
            Err(e) => ProbeResult {
                success: false,
                response: None,
                error: Some(scrub_credentials(e.message())),
            },
        }
    }

    /// Release the driver's client
    pub fn close(&self) {
        self.client.close();
    }
}
