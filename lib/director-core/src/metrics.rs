//! Prometheus metrics for route reconciliation

use crate::Result;
use prometheus::{Encoder, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::sync::Arc;

/// Counters and gauges updated by the reconciler
#[derive(Clone)]
pub struct ReconcileMetrics {
    /// Resource events received, by type
    pub events_total: IntCounterVec,
    /// Route operations, by op and outcome
    pub route_operations_total: IntCounterVec,
    /// Events skipped without changing routes, by reason
    pub skipped_events_total: IntCounterVec,
    /// Routes currently recorded in the store
    pub tracked_routes: IntGauge,
    /// Prometheus registry for metrics
    pub registry: Arc<Registry>,
}

impl ReconcileMetrics {
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());

        let events_total = IntCounterVec::new(
            Opts::new("route_updater_events_total", "TrafficDirector events received"),
            &["type"],
        )?;

        let route_operations_total = IntCounterVec::new(
            Opts::new(
                "route_updater_route_operations_total",
                "Kernel route operations attempted",
            ),
            &["op", "outcome"],
        )?;

        let skipped_events_total = IntCounterVec::new(
            Opts::new(
                "route_updater_skipped_events_total",
                "Events skipped without programming routes",
            ),
            &["reason"],
        )?;

        let tracked_routes = IntGauge::new(
            "route_updater_tracked_routes",
            "Routes the updater believes are installed",
        )?;

        registry.register(Box::new(events_total.clone()))?;
        registry.register(Box::new(route_operations_total.clone()))?;
        registry.register(Box::new(skipped_events_total.clone()))?;
        registry.register(Box::new(tracked_routes.clone()))?;

        Ok(Self {
            events_total,
            route_operations_total,
            skipped_events_total,
            tracked_routes,
            registry,
        })
    }

    pub fn record_event(&self, kind: &str) {
        self.events_total.with_label_values(&[kind]).inc();
    }

    pub fn record_route_op(&self, op: &str, ok: bool) {
        let outcome = if ok { "ok" } else { "error" };
        self.route_operations_total
            .with_label_values(&[op, outcome])
            .inc();
    }

    pub fn record_skip(&self, reason: &str) {
        self.skipped_events_total.with_label_values(&[reason]).inc();
    }

    /// Render all metrics in the Prometheus text format
    pub fn gather(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}
