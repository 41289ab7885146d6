//! Per-subject batches over a collection driver.
//!
//! Runs one descriptor template once per subject (user, group, application,
//! resource) in input order. A failing subject is logged and skipped; the
//! batch always runs to the end.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use log::{info, warn};
use serde_json::Value;

use crate::cloud::client::{ApiClient, ClientFactory};
use crate::cloud::credentials::Credentials;
use crate::collectors::driver::{CollectionDriver, Outcome};
use crate::models::RequestDescriptor;
use crate::security::scrub_credentials;

/// How each subject shapes its call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOptions {
    /// Request parameter set to the subject
    pub inject_as_param: Option<String>,
    /// Act as the subject through a delegated credential
    pub delegate: bool,
    /// Appended to the subject in artifact names
    pub qualifier: Option<String>,
    /// Envelope metadata key the subject is recorded under
    pub main_key: Option<String>,
}

impl BatchOptions {
    pub fn inject(param: &str) -> Self {
        Self {
            inject_as_param: Some(param.to_string()),
            ..Default::default()
        }
    }

    pub fn delegated(mut self) -> Self {
        self.delegate = true;
        self
    }

    pub fn qualified(mut self, qualifier: &str) -> Self {
        self.qualifier = Some(qualifier.to_string());
        self
    }

    pub fn keyed(mut self, main_key: &str) -> Self {
        self.main_key = Some(main_key.to_string());
        self
    }
}

/// What happened to each subject of a batch
#[derive(Debug, Default)]
pub struct BatchReport {
    pub delivered: Vec<String>,
    pub empty: Vec<String>,
    pub failed: Vec<(String, String)>,
    /// Records of subjects run in return mode, in subject order
    pub returned: Vec<Value>,
}

impl BatchReport {
    fn record(&mut self, subject: &str, outcome: Outcome) {
        match outcome {
            Outcome::Delivered { .. } => self.delivered.push(subject.to_string()),
            Outcome::Returned(records) => {
                self.delivered.push(subject.to_string());
                self.returned.extend(records);
            }
            Outcome::Empty => self.empty.push(subject.to_string()),
            Outcome::Failed(e) => self.failed.push((subject.to_string(), e.to_string())),
        }
    }

    pub fn processed(&self) -> usize {
        self.delivered.len() + self.empty.len() + self.failed.len()
    }

    pub fn failed_subjects(&self) -> Vec<&str> {
        self.failed.iter().map(|(s, _)| s.as_str()).collect()
    }

    /// Fold another batch's results into this one
    pub fn merge(&mut self, other: BatchReport) {
        self.delivered.extend(other.delivered);
        self.empty.extend(other.empty);
        self.failed.extend(other.failed);
        self.returned.extend(other.returned);
    }
}

/// Drives a [`CollectionDriver`] over subject lists.
///
/// Delegated credentials are derived once per subject and kept for the
/// lifetime of the iterator; per-subject clients are closed after each call.
pub struct BatchIterator {
    driver: CollectionDriver,
    factory: Option<Box<dyn ClientFactory>>,
    delegates: HashMap<String, Arc<dyn Credentials>>,
}

impl BatchIterator {
    pub fn new(driver: CollectionDriver) -> Self {
        Self {
            driver,
            factory: None,
            delegates: HashMap::new(),
        }
    }

    /// Factory used to build a client per delegated subject
    pub fn with_factory(mut self, factory: Box<dyn ClientFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    pub fn driver(&self) -> &CollectionDriver {
        &self.driver
    }

    /// Single operation on the underlying driver
    pub fn execute(&self, descriptor: &RequestDescriptor) -> Outcome {
        self.driver.execute(descriptor)
    }

    pub fn cached_delegates(&self) -> usize {
        self.delegates.len()
    }

    fn delegate_for(&mut self, subject: &str) -> Result<Arc<dyn Credentials>> {
        if let Some(credentials) = self.delegates.get(subject) {
            return Ok(Arc::clone(credentials));
        }
        let credentials = self.driver.credentials().derive_scoped(subject)?;
        self.delegates.insert(subject.to_string(), Arc::clone(&credentials));
        Ok(credentials)
    }

    fn delegated_client(&mut self, subject: &str) -> Result<(Box<dyn ApiClient>, String)> {
        let credentials = self.delegate_for(subject)?;
        let factory = self
            .factory
            .as_ref()
            .ok_or_else(|| anyhow!("Delegation requested for {} but no client factory is configured", subject))?;
        let identity = credentials.identity();
        Ok((factory.build(credentials)?, identity))
    }

    /// Run `template` once per subject.
    ///
    /// Subjects are processed in the given order, duplicates included.
    pub fn execute_for_each(
        &mut self,
        template: &RequestDescriptor,
        subjects: &[String],
        options: &BatchOptions,
    ) -> BatchReport {
        let mut report = BatchReport::default();
        self.driver
            .note(&format!("Iterating multiple items for function {}", template.function));

        for subject in subjects {
            let mut descriptor = template.clone();
            if let Some(param) = &options.inject_as_param {
                descriptor
                    .params
                    .insert(param.clone(), Value::String(subject.clone()));
            }
            if let Some(key) = &options.main_key {
                descriptor
                    .metadata_additions
                    .push((key.clone(), Value::String(subject.clone())));
            }
            descriptor.documented_item = Some(match &options.qualifier {
                Some(qualifier) => format!("{}_{}", subject, qualifier),
                None => subject.clone(),
            });

            info!("Collecting data for [{}] using the function {}", subject, template.function);
            self.driver.note(&format!("Current Item: {}", subject));

            let outcome = if options.delegate {
                match self.delegated_client(subject) {
                    Ok((client, identity)) => {
                        let outcome = self.driver.execute_with(client.as_ref(), &identity, &descriptor);
                        client.close();
                        outcome
                    }
                    Err(e) => {
                        let message = scrub_credentials(&format!("{:#}", e));
                        warn!("Error in collecting {} for {}: {}", template.function, subject, message);
                        self.driver.note(&format!(
                            "Failed to collect {} for {}: {}",
                            template.function, subject, message
                        ));
                        report.failed.push((subject.clone(), message));
                        continue;
                    }
                }
            } else {
                self.driver.execute(&descriptor)
            };

            if let Outcome::Failed(e) = &outcome {
                warn!("Error in collecting {} for {}: {}", template.function, subject, e);
                self.driver
                    .note(&format!("Failed to collect {} for {}", template.function, subject));
            }
            report.record(subject, outcome);
        }

        if !report.failed.is_empty() {
            warn!(
                "{} of {} items failed for function {}",
                report.failed.len(),
                subjects.len(),
                template.function
            );
        }
        report
    }

    /// Release the driver's own client; cached credentials go with the iterator
    pub fn close(&self) {
        self.driver.close();
    }
}
