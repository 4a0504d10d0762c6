use opentelemetry::global;
use opentelemetry::metrics::{Counter, Gauge, Meter, UpDownCounter};
use opentelemetry::KeyValue;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use prometheus::Registry;
use std::sync::Arc;

pub mod labels {
    pub const ERROR_TYPE: &str = "error_type";
    pub const METHOD: &str = "method";
    pub const KIND: &str = "kind";
    pub const DIRECTION: &str = "direction";
    pub const REASON: &str = "reason";
    pub const VERSION: &str = "version";
    pub const RUST_VERSION: &str = "rust_version";
}

pub mod values {
    pub const KIND_TUNNEL: &str = "tunnel";
    pub const KIND_FORWARD: &str = "forward";
    pub const DIRECTION_UPSTREAM: &str = "upstream";
    pub const DIRECTION_DOWNSTREAM: &str = "downstream";
    pub const WAIT_RETRY_AFTER: &str = "retry_after";
    pub const WAIT_RESERVATION: &str = "reservation";
}

#[derive(Clone)]
pub struct Metrics {
    pub connections_total: Counter<u64>,
    pub connections_active: UpDownCounter<i64>,
    pub connections_rejected_total: Counter<u64>,

    pub requests_total: Counter<u64>,
    pub errors_total: Counter<u64>,

    pub tunnels_active: UpDownCounter<i64>,

    // Bytes that made it through the copy engine
    pub bytes_copied_total: Counter<u64>,

    // Copy iterations that had to back off
    pub rate_limit_waits_total: Counter<u64>,

    pub build_info: Gauge<u64>,
}

impl Metrics {
    fn new(meter: Meter) -> Self {
        Self {
            connections_total: meter
                .u64_counter("throttle_connections_total")
                .with_description("Total number of client connections accepted")
                .build(),
            connections_active: meter
                .i64_up_down_counter("throttle_connections_active")
                .with_description("Number of active client connections")
                .build(),
            connections_rejected_total: meter
                .u64_counter("throttle_connections_rejected_total")
                .with_description("Total number of connections rejected due to connection limit")
                .build(),

            requests_total: meter
                .u64_counter("throttle_requests_total")
                .with_description("Total number of dispatched requests by method and kind (tunnel, forward)")
                .build(),
            errors_total: meter
                .u64_counter("throttle_errors_total")
                .with_description("Total number of request failures by error type")
                .build(),

            tunnels_active: meter
                .i64_up_down_counter("throttle_tunnels_active")
                .with_description("Number of CONNECT tunnels currently relaying")
                .build(),

            bytes_copied_total: meter
                .u64_counter("throttle_bytes_copied_total")
                .with_description("Total bytes relayed by direction (upstream, downstream)")
                .build(),

            rate_limit_waits_total: meter
                .u64_counter("throttle_rate_limit_waits_total")
                .with_description("Total number of rate limit waits by reason (retry_after, reservation)")
                .build(),

            build_info: meter
                .u64_gauge("throttle_build_info")
                .with_description("Build information (version, rust version)")
                .build(),
        }
    }

    /// Set build info metric with version labels
    pub fn set_build_info(&self) {
        let version = env!("CARGO_PKG_VERSION");
        let rust_version = env!("CARGO_PKG_RUST_VERSION");

        self.build_info.record(
            1,
            &[
                KeyValue::new(labels::VERSION, version),
                KeyValue::new(labels::RUST_VERSION, rust_version),
            ],
        );
    }

    pub fn record_request(&self, method: &str, kind: &'static str) {
        self.requests_total.add(
            1,
            &[KeyValue::new(labels::METHOD, method.to_string()), KeyValue::new(labels::KIND, kind)],
        );
    }

    pub fn record_error(&self, error_type: &'static str) {
        self.errors_total.add(1, &[KeyValue::new(labels::ERROR_TYPE, error_type)]);
    }

    pub fn record_bytes_copied(&self, bytes: u64, direction: &'static str) {
        if bytes > 0 {
            self.bytes_copied_total.add(bytes, &[KeyValue::new(labels::DIRECTION, direction)]);
        }
    }

    pub fn record_rate_limit_wait(&self, reason: &str) {
        self.rate_limit_waits_total.add(1, &[KeyValue::new(labels::REASON, reason.to_string())]);
    }
}

pub fn init_metrics() -> Result<(Arc<Metrics>, Registry), Box<dyn std::error::Error + Send + Sync>>
{
    let registry = Registry::default();

    let exporter = opentelemetry_prometheus::exporter()
        .with_registry(registry.clone())
        .build()?;

    let meter_provider = SdkMeterProvider::builder().with_reader(exporter).build();

    global::set_meter_provider(meter_provider);

    let meter = global::meter("throttle-proxy");
    let metrics = Arc::new(Metrics::new(meter));

    metrics.set_build_info();

    Ok((metrics, registry))
}
