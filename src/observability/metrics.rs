use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub parcels_created_total: IntCounter,
    pub status_updates_total: IntCounterVec,
    pub assignments_total: IntCounterVec,
    pub notifications_emitted_total: IntCounterVec,
    pub location_updates_total: IntCounter,
    pub ws_clients: IntGauge,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let parcels_created_total =
            IntCounter::new("parcels_created_total", "Total parcels booked")
                .expect("valid parcels_created_total metric");

        let status_updates_total = IntCounterVec::new(
            Opts::new("status_updates_total", "Parcel status updates by status"),
            &["status"],
        )
        .expect("valid status_updates_total metric");

        let assignments_total = IntCounterVec::new(
            Opts::new("assignments_total", "Agent assignments by mode"),
            &["mode"],
        )
        .expect("valid assignments_total metric");

        let notifications_emitted_total = IntCounterVec::new(
            Opts::new("notifications_emitted_total", "Notifications emitted by type"),
            &["type"],
        )
        .expect("valid notifications_emitted_total metric");

        let location_updates_total = IntCounter::new(
            "location_updates_total",
            "Parcel and agent location updates recorded",
        )
        .expect("valid location_updates_total metric");

        let ws_clients = IntGauge::new("ws_clients", "Currently connected websocket clients")
            .expect("valid ws_clients metric");

        registry
            .register(Box::new(parcels_created_total.clone()))
            .expect("register parcels_created_total");
        registry
            .register(Box::new(status_updates_total.clone()))
            .expect("register status_updates_total");
        registry
            .register(Box::new(assignments_total.clone()))
            .expect("register assignments_total");
        registry
            .register(Box::new(notifications_emitted_total.clone()))
            .expect("register notifications_emitted_total");
        registry
            .register(Box::new(location_updates_total.clone()))
            .expect("register location_updates_total");
        registry
            .register(Box::new(ws_clients.clone()))
            .expect("register ws_clients");

        Self {
            registry,
            parcels_created_total,
            status_updates_total,
            assignments_total,
            notifications_emitted_total,
            location_updates_total,
            ws_clients,
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
