use lazy_static::lazy_static;
use prometheus::{
    Counter, Encoder, Gauge, Histogram, HistogramOpts, Opts, Registry, TextEncoder,
};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    pub static ref FEED_SUBSCRIBERS: Gauge = Gauge::with_opts(Opts::new(
        "monitor_feed_subscribers",
        "Live feed subscribers currently connected"
    ))
    .expect("metric can be created");
    pub static ref FEED_ADMITTED_TOTAL: Counter = Counter::with_opts(Opts::new(
        "monitor_feed_admitted_total",
        "Total live feed subscribers admitted"
    ))
    .expect("metric can be created");
    pub static ref FEED_ENVELOPES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "monitor_feed_envelopes_total",
        "Total device envelopes delivered to subscribers"
    ))
    .expect("metric can be created");
    pub static ref FEED_SEND_FAILURES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "monitor_feed_send_failures_total",
        "Total failed envelope sends (subscriber terminated)"
    ))
    .expect("metric can be created");
    pub static ref FEED_STORE_FAILURES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "monitor_feed_store_failures_total",
        "Total ticks skipped because the device store could not be read"
    ))
    .expect("metric can be created");
    pub static ref FEED_TICK_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "monitor_feed_tick_seconds",
            "Time taken to sample, encode and send one envelope"
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0
        ])
    )
    .expect("metric can be created");
}

pub fn init_metrics() -> prometheus::Result<()> {
    REGISTRY.register(Box::new(FEED_SUBSCRIBERS.clone()))?;
    REGISTRY.register(Box::new(FEED_ADMITTED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(FEED_ENVELOPES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(FEED_SEND_FAILURES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(FEED_STORE_FAILURES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(FEED_TICK_SECONDS.clone()))?;
    Ok(())
}

pub fn gather_metrics() -> prometheus::Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}
