//! Reconciler converging kernel routes to the latest TrafficDirector state
//!
//! Every Created/Updated event retracts whatever was recorded for the
//! resource and programs the routes derived from the new object from
//! scratch. Deleted events retract and forget. Failures are logged and
//! never escape `handle`, so one bad event cannot stop the watch loop.

use crate::route::{self, GatewayBinding, ResolvedRoute, ResourceIdentity, RouteSet};
use crate::{ReconcileMetrics, ResourceEvent, RouteProgrammer, RouteStore};
use director_api::TrafficDirector;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub struct Reconciler {
    store: Arc<dyn RouteStore>,
    programmer: Arc<dyn RouteProgrammer>,
    metrics: Arc<ReconcileMetrics>,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn RouteStore>,
        programmer: Arc<dyn RouteProgrammer>,
        metrics: Arc<ReconcileMetrics>,
    ) -> Self {
        Self {
            store,
            programmer,
            metrics,
        }
    }

    /// Process one lifecycle event
    pub async fn handle(&self, event: ResourceEvent) {
        let kind = event.kind();
        self.metrics.record_event(kind.as_str());

        let id = match ResourceIdentity::from_object(event.object()) {
            Ok(id) => id,
            Err(e) => {
                warn!("Skipping {} event: {}", kind, e);
                self.metrics.record_skip("malformed");
                return;
            }
        };
        info!("Resource {} was {}", id, kind);

        match event {
            ResourceEvent::Created(td) | ResourceEvent::Updated(td) => self.upsert(&id, &td).await,
            ResourceEvent::Deleted(_) => self.remove(&id).await,
        }

        self.refresh_tracked_routes().await;
    }

    async fn upsert(&self, id: &ResourceIdentity, td: &TrafficDirector) {
        if let Some(previous) = self.recorded(id).await {
            self.retract_all(id, &previous).await;
        }

        debug!("Processing TrafficDirector {} with spec: {:?}", id, td.spec);

        let next_hop = match route::next_hop(td) {
            Ok(Some(hop)) => hop,
            Ok(None) => {
                warn!("No nodeIp found in status for TrafficDirector {}", id);
                self.metrics.record_skip("no_next_hop");
                self.forget(id).await;
                return;
            }
            Err(e) => {
                warn!("Ignoring TrafficDirector {}: {}", id, e);
                self.metrics.record_skip("invalid_next_hop");
                self.forget(id).await;
                return;
            }
        };

        let mut routes = RouteSet::new();
        for gateway in &td.spec.gateways {
            let binding = match GatewayBinding::from_spec(gateway) {
                Ok(Some(binding)) => binding,
                Ok(None) => {
                    debug!("Skipping gateway without a VIP in {}", id);
                    continue;
                }
                Err(e) => {
                    warn!("Skipping gateway in {}: {}", id, e);
                    continue;
                }
            };

            let route = ResolvedRoute::new(&binding, next_hop);
            if routes.contains(&route) {
                debug!("Duplicate binding {} in {}", route, id);
                continue;
            }
            info!(
                "Found VIP {} for namespace {} with nodeIp {}",
                route.vip, route.gateway_namespace, next_hop
            );

            // Recorded even on failure: the store reflects what was attempted.
            self.apply(&route).await;
            routes.insert(route);
        }

        let count = routes.len();
        if let Err(e) = self.store.put(id.clone(), routes).await {
            error!("Failed to record routes for {}: {}", id, e);
            return;
        }
        info!("Stored {} routes for TrafficDirector {}", count, id);
        self.log_route_map().await;
    }

    async fn remove(&self, id: &ResourceIdentity) {
        let Some(routes) = self.recorded(id).await else {
            warn!("No routes recorded for TrafficDirector {}", id);
            self.metrics.record_skip("unknown_identity");
            return;
        };

        self.retract_all(id, &routes).await;
        self.forget(id).await;
        info!("Deleted routes for TrafficDirector {}", id);
    }

    async fn recorded(&self, id: &ResourceIdentity) -> Option<RouteSet> {
        match self.store.get(id).await {
            Ok(routes) => routes,
            Err(e) => {
                error!("Failed to read recorded routes for {}: {}", id, e);
                None
            }
        }
    }

    async fn forget(&self, id: &ResourceIdentity) {
        if let Err(e) = self.store.delete(id).await {
            error!("Failed to forget routes for {}: {}", id, e);
        }
    }

    async fn retract_all(&self, id: &ResourceIdentity, routes: &RouteSet) {
        debug!("Retracting {} routes for {}", routes.len(), id);
        for route in routes.iter() {
            self.retract(route).await;
        }
    }

    async fn apply(&self, route: &ResolvedRoute) {
        info!("Adding route {} (gateway namespace {})", route, route.gateway_namespace);
        match self.programmer.apply(route).await {
            Ok(outcome) => {
                info!("Successfully added route {}: {:?}", route, outcome);
                self.metrics.record_route_op("apply", true);
            }
            Err(e) => {
                error!("Failed to add route {}: {}", route, e);
                self.metrics.record_route_op("apply", false);
            }
        }
    }

    async fn retract(&self, route: &ResolvedRoute) {
        info!("Deleting route {} (gateway namespace {})", route, route.gateway_namespace);
        match self.programmer.retract(route).await {
            Ok(outcome) => {
                info!("Successfully deleted route {}: {:?}", route, outcome);
                self.metrics.record_route_op("retract", true);
            }
            Err(e) => {
                error!("Failed to delete route {}: {}", route, e);
                self.metrics.record_route_op("retract", false);
            }
        }
    }

    async fn refresh_tracked_routes(&self) {
        if let Ok(snapshot) = self.store.snapshot().await {
            let total: usize = snapshot.iter().map(|(_, routes)| routes.len()).sum();
            self.metrics.tracked_routes.set(total as i64);
        }
    }

    async fn log_route_map(&self) {
        if !tracing::enabled!(tracing::Level::DEBUG) {
            return;
        }
        let Ok(snapshot) = self.store.snapshot().await else {
            return;
        };
        let map: Vec<(String, RouteSet)> = snapshot
            .into_iter()
            .map(|(id, routes)| (id.to_string(), routes))
            .collect();
        match serde_json::to_string(&map) {
            Ok(json) => debug!("Current route map: {}", json),
            Err(e) => debug!("Could not render route map: {}", e),
        }
    }
}
