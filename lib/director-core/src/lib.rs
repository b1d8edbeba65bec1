//! Core route reconciliation functionality
//!
//! This library provides:
//! - The routing domain model derived from TrafficDirector resources
//! - The route state store the reconciler diffs against
//! - The route programmer seam used to mutate kernel routing state
//! - The reconciler that converges routes on every resource event

pub mod error;
pub mod event;
pub mod metrics;
pub mod programmer;
pub mod reconciler;
pub mod route;
pub mod store;

pub use error::{CoreError, Result, RouteError};
pub use event::{EventKind, ResourceEvent};
pub use metrics::ReconcileMetrics;
pub use programmer::{RouteOutcome, RouteProgrammer};
pub use reconciler::Reconciler;
pub use route::{GatewayBinding, ResolvedRoute, ResourceIdentity, RouteSet};
pub use store::{InMemoryRouteStore, RouteStore};
