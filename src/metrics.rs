//! Metrics and tracing helpers.
//!
//! With the `metrics` feature, [`METRICS`] collects claim and commit counters
//! through OpenTelemetry and exposes them in Prometheus text format.
//! With the `tracing` feature, [`tracing_helpers`] provides the spans used
//! around claims and transactions plus a log subscriber for binaries and tests.

#[cfg(feature = "metrics")]
pub use self::prometheus_metrics::{HaloMetrics, METRICS};

#[cfg(feature = "metrics")]
mod prometheus_metrics {
    use once_cell::sync::Lazy;
    use opentelemetry::{
        metrics::{Counter, Histogram, MeterProvider},
        KeyValue,
    };
    use opentelemetry_sdk::metrics::SdkMeterProvider;
    use prometheus::{Encoder, Registry, TextEncoder};
    use std::time::Duration;

    pub static METRICS: Lazy<HaloMetrics> = Lazy::new(HaloMetrics::init);

    pub struct HaloMetrics {
        registry: Registry,
        _provider: SdkMeterProvider,
        pub claims_total: Counter<u64>,
        pub claim_retries_total: Counter<u64>,
        pub claim_duration: Histogram<f64>,
        pub store_commits_total: Counter<u64>,
        pub store_writes_total: Counter<u64>,
        pub store_aborts_total: Counter<u64>,
    }

    impl HaloMetrics {
        pub fn init() -> Self {
            let registry = Registry::new();
            let provider = match opentelemetry_prometheus::exporter()
                .with_registry(registry.clone())
                .build()
            {
                Ok(exporter) => SdkMeterProvider::builder().with_reader(exporter).build(),
                Err(e) => {
                    log::warn!("failed to build prometheus exporter, metrics will not be exported: {e}");
                    SdkMeterProvider::builder().build()
                }
            };
            let meter = provider.meter("halo");

            let claims_total = meter
                .u64_counter("halo_claims_total")
                .with_description("Claim requests by outcome")
                .build();

            let claim_retries_total = meter
                .u64_counter("halo_claim_retries_total")
                .with_description("Claim attempts repeated after transient contention")
                .build();

            let claim_duration = meter
                .f64_histogram("halo_claim_duration_seconds")
                .with_description("End-to-end claim latency including retries")
                .build();

            let store_commits_total = meter
                .u64_counter("halo_store_commits_total")
                .with_description("Successful store commits")
                .build();

            let store_writes_total = meter
                .u64_counter("halo_store_writes_total")
                .with_description("Document writes applied by successful commits")
                .build();

            let store_aborts_total = meter
                .u64_counter("halo_store_aborts_total")
                .with_description("Commits rejected by a stale read")
                .build();

            Self {
                registry,
                _provider: provider,
                claims_total,
                claim_retries_total,
                claim_duration,
                store_commits_total,
                store_writes_total,
                store_aborts_total,
            }
        }

        pub fn record_claim(&self, outcome: &'static str, elapsed: Duration) {
            let attrs = [KeyValue::new("outcome", outcome)];
            self.claims_total.add(1, &attrs);
            self.claim_duration.record(elapsed.as_secs_f64(), &attrs);
        }

        pub fn record_claim_retry(&self) {
            self.claim_retries_total.add(1, &[]);
        }

        pub fn record_commit(&self, writes: usize) {
            self.store_commits_total.add(1, &[]);
            self.store_writes_total.add(writes as u64, &[]);
        }

        pub fn record_commit_aborted(&self) {
            self.store_aborts_total.add(1, &[]);
        }

        /// Current metrics in Prometheus text exposition format
        pub fn render(&self) -> Result<String, prometheus::Error> {
            let mut buf = Vec::new();
            TextEncoder::new().encode(&self.registry.gather(), &mut buf)?;
            String::from_utf8(buf).map_err(|e| prometheus::Error::Msg(e.to_string()))
        }
    }
}

#[cfg(feature = "tracing")]
pub mod tracing_helpers {
    use tracing::{debug_span, info_span, Span};
    use tracing_subscriber::EnvFilter;

    pub fn claim_span(item_id: &str, claimant: &str) -> Span {
        info_span!("halo.claim", item_id = %item_id, claimant = %claimant)
    }

    pub fn claim_attempt_span(attempt: u32) -> Span {
        debug_span!("halo.claim.attempt", attempt)
    }

    pub fn begin_transaction_span() -> Span {
        debug_span!("halo.transaction.begin")
    }

    pub fn commit_transaction_span(reads: usize, writes: usize) -> Span {
        debug_span!("halo.transaction.commit", reads, writes)
    }

    pub fn rollback_transaction_span() -> Span {
        debug_span!("halo.transaction.rollback")
    }

    /// Install a fmt subscriber filtered by `RUST_LOG` (default `info`).
    /// `log` records from this crate are forwarded to the same subscriber.
    pub fn init_logging() -> Result<(), String> {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .try_init()
            .map_err(|e| e.to_string())
    }
}
