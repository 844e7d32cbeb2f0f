use prometheus::{
    Encoder, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub assignments_total: IntCounterVec,
    pub assignment_latency_seconds: HistogramVec,
    pub delivery_status_total: IntCounterVec,
    pub active_routes: IntGauge,
    pub location_updates_total: IntCounter,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let assignments_total = IntCounterVec::new(
            Opts::new("assignments_total", "Total assignment attempts by outcome"),
            &["outcome"],
        )
        .expect("valid assignments_total metric");

        let assignment_latency_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "assignment_latency_seconds",
                "Latency of assignment processing in seconds",
            ),
            &["outcome"],
        )
        .expect("valid assignment_latency_seconds metric");

        let delivery_status_total = IntCounterVec::new(
            Opts::new(
                "delivery_status_total",
                "Delivery status transitions by new status",
            ),
            &["status"],
        )
        .expect("valid delivery_status_total metric");

        let active_routes = IntGauge::new("active_routes", "Routes currently being simulated")
            .expect("valid active_routes metric");

        let location_updates_total = IntCounter::new(
            "location_updates_total",
            "Rider position updates published by the simulator",
        )
        .expect("valid location_updates_total metric");

        registry
            .register(Box::new(assignments_total.clone()))
            .expect("register assignments_total");
        registry
            .register(Box::new(assignment_latency_seconds.clone()))
            .expect("register assignment_latency_seconds");
        registry
            .register(Box::new(delivery_status_total.clone()))
            .expect("register delivery_status_total");
        registry
            .register(Box::new(active_routes.clone()))
            .expect("register active_routes");
        registry
            .register(Box::new(location_updates_total.clone()))
            .expect("register location_updates_total");

        Self {
            registry,
            assignments_total,
            assignment_latency_seconds,
            delivery_status_total,
            active_routes,
            location_updates_total,
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
