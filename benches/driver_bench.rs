//! Benchmarks for paging through large results.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde_json::{json, Value};

use cirrus_collector::cloud::{ApiClient, ClientError, Credentials};
use cirrus_collector::collectors::{CollectionDriver, DriverLimits};
use cirrus_collector::models::{Params, RequestDescriptor};
use cirrus_collector::utils::output::{record_count, ArtifactReceipt, Destination, OutputSink, SinkError};

const RECORDS_PER_PAGE: usize = 500;

/// Serves `pages` pages of log entries, restarting after the last one
struct EntriesClient {
    pages: usize,
    served: AtomicUsize,
}

impl EntriesClient {
    fn page(&self) -> Result<Value, ClientError> {
        let number = self.served.fetch_add(1, Ordering::Relaxed) % self.pages + 1;
        let entries: Vec<Value> = (0..RECORDS_PER_PAGE)
            .map(|i| {
                json!({
                    "logName": "projects/case-123/logs/cloudaudit.googleapis.com%2Factivity",
                    "insertId": format!("{}-{}", number, i),
                    "timestamp": "2024-01-15T14:30:52Z",
                    "protoPayload": {"methodName": "SetIamPolicy", "serviceName": "cloudresourcemanager.googleapis.com"}
                })
            })
            .collect();
        let mut page = json!({ "entries": entries });
        if number < self.pages {
            page["nextPageToken"] = json!(format!("t{}", number));
        }
        Ok(page)
    }
}

impl ApiClient for EntriesClient {
    fn list(&self, _: &[String], _: &str, _: &Params) -> Result<Value, ClientError> {
        self.page()
    }

    fn get(&self, _: &[String], _: &str, _: &Params) -> Result<Value, ClientError> {
        self.page()
    }

    fn create(&self, _: &[String], _: &str, _: &Params) -> Result<Value, ClientError> {
        self.page()
    }

    fn invoke(&self, _: &[String], _: &str, _: &Params) -> Result<Value, ClientError> {
        self.page()
    }
}

/// Sink that only serializes, keeping the disk out of the measurement
struct DiscardSink;

impl OutputSink for DiscardSink {
    fn deliver(&self, payload: &Value, destination: &Destination) -> Result<ArtifactReceipt, SinkError> {
        let bytes = serde_json::to_vec(payload).map_err(|source| SinkError::Serialize {
            function: destination.function_item.clone(),
            source,
        })?;
        black_box(bytes);
        Ok(ArtifactReceipt {
            path: Default::default(),
            module: destination.module.clone(),
            function_item: destination.function_item.clone(),
            records: record_count(payload),
            sha256: None,
            partial: destination.partial,
            written_at: String::new(),
        })
    }

    fn append_note(&self, _text: &str) -> Result<(), SinkError> {
        Ok(())
    }
}

#[derive(Debug)]
struct BenchCredentials;

impl Credentials for BenchCredentials {
    fn identity(&self) -> String {
        "bench@case-123.iam.gserviceaccount.com".to_string()
    }

    fn subject(&self) -> Option<&str> {
        None
    }

    fn scopes(&self) -> &[String] {
        &[]
    }

    fn derive_scoped(&self, _subject: &str) -> Result<Arc<dyn Credentials>> {
        Ok(Arc::new(BenchCredentials))
    }
}

fn driver(pages: usize, max_pages: usize) -> CollectionDriver {
    CollectionDriver::new(
        "log_collection",
        Box::new(EntriesClient {
            pages,
            served: AtomicUsize::new(0),
        }),
        Arc::new(BenchCredentials),
        Arc::new(DiscardSink),
    )
    .with_limits(DriverLimits {
        max_pages,
        max_retry: 1,
        retry_delay: Duration::ZERO,
        event_milestone: 0,
    })
}

/// Benchmark paging with and without partial dumps
fn bench_paging(c: &mut Criterion) {
    let mut group = c.benchmark_group("driver_paging");
    let descriptor = RequestDescriptor::list("entries").inner("entries").documented("case-123");

    for (pages, max_pages) in [(10, 50), (100, 50), (100, 10)] {
        group.throughput(Throughput::Elements((pages * RECORDS_PER_PAGE) as u64));
        group.bench_with_input(
            BenchmarkId::new(format!("max_pages_{}", max_pages), pages),
            &pages,
            |b, &pages| {
                let driver = driver(pages, max_pages);
                b.iter(|| black_box(driver.execute(black_box(&descriptor))));
            },
        );
    }

    group.finish();
}

/// Benchmark returning results to the caller instead of persisting them
fn bench_returning(c: &mut Criterion) {
    let driver = driver(20, 50);
    let descriptor = RequestDescriptor::list("users").inner("entries").returning();

    c.bench_function("driver_returning_20_pages", |b| {
        b.iter(|| black_box(driver.execute(black_box(&descriptor)).into_records().len()));
    });
}

criterion_group!(benches, bench_paging, bench_returning);
criterion_main!(benches);
