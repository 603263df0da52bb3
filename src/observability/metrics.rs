use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub poll_cycles_total: IntCounterVec,
    pub location_publish_total: IntCounterVec,
    pub api_requests_total: IntCounterVec,
    pub api_request_latency_seconds: HistogramVec,
    pub assigned_orders: IntGauge,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let poll_cycles_total = IntCounterVec::new(
            Opts::new("poll_cycles_total", "Order poll cycles by outcome"),
            &["outcome"],
        )
        .expect("valid poll_cycles_total metric");

        let location_publish_total = IntCounterVec::new(
            Opts::new(
                "location_publish_total",
                "Driver location publish attempts by outcome",
            ),
            &["outcome"],
        )
        .expect("valid location_publish_total metric");

        let api_requests_total = IntCounterVec::new(
            Opts::new("api_requests_total", "Dispatch API requests by endpoint and outcome"),
            &["endpoint", "outcome"],
        )
        .expect("valid api_requests_total metric");

        let api_request_latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                "api_request_latency_seconds",
                "Latency of dispatch API requests in seconds",
            ),
            &["endpoint"],
        )
        .expect("valid api_request_latency_seconds metric");

        let assigned_orders = IntGauge::new(
            "assigned_orders",
            "Orders in the most recently applied list",
        )
        .expect("valid assigned_orders metric");

        registry
            .register(Box::new(poll_cycles_total.clone()))
            .expect("register poll_cycles_total");
        registry
            .register(Box::new(location_publish_total.clone()))
            .expect("register location_publish_total");
        registry
            .register(Box::new(api_requests_total.clone()))
            .expect("register api_requests_total");
        registry
            .register(Box::new(api_request_latency_seconds.clone()))
            .expect("register api_request_latency_seconds");
        registry
            .register(Box::new(assigned_orders.clone()))
            .expect("register assigned_orders");

        Self {
            registry,
            poll_cycles_total,
            location_publish_total,
            api_requests_total,
            api_request_latency_seconds,
            assigned_orders,
        }
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
