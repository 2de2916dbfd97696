use lazy_static::lazy_static;
use prometheus::{Counter, Encoder, Histogram, HistogramOpts, Opts, Registry, TextEncoder};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    pub static ref POLLS_TOTAL: Counter = Counter::with_opts(Opts::new(
        "dashboard_polls_total",
        "Total telemetry poll cycles attempted"
    ))
    .expect("valid metric options");
    pub static ref POLL_FAILURES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "dashboard_poll_failures_total",
        "Total poll cycles that left state untouched because a fetch failed"
    ))
    .expect("valid metric options");
    pub static ref STALE_RESULTS_TOTAL: Counter = Counter::with_opts(Opts::new(
        "dashboard_stale_results_total",
        "Total results discarded because a newer query or a stop superseded them"
    ))
    .expect("valid metric options");
    pub static ref COMMANDS_TOTAL: Counter = Counter::with_opts(Opts::new(
        "dashboard_commands_total",
        "Total device commands sent"
    ))
    .expect("valid metric options");
    pub static ref COMMAND_FAILURES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "dashboard_command_failures_total",
        "Total device commands rolled back"
    ))
    .expect("valid metric options");
    pub static ref TABLE_REQUESTS_TOTAL: Counter = Counter::with_opts(Opts::new(
        "dashboard_table_requests_total",
        "Total paginated log requests issued"
    ))
    .expect("valid metric options");
    pub static ref REQUEST_LATENCY_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "dashboard_request_latency_seconds",
            "Time taken by successful requests to the remote service"
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0
        ])
    )
    .expect("valid metric options");
}

pub fn init_metrics() -> prometheus::Result<()> {
    REGISTRY.register(Box::new(POLLS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(POLL_FAILURES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(STALE_RESULTS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(COMMANDS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(COMMAND_FAILURES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(TABLE_REQUESTS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(REQUEST_LATENCY_SECONDS.clone()))?;
    Ok(())
}

pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return format!("# failed to encode metrics: {}\n", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
