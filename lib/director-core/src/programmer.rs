//! Seam between the reconciler and whatever mutates kernel routing state

use crate::{ResolvedRoute, RouteError};
use async_trait::async_trait;

/// Result of a successful route operation
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RouteOutcome {
    /// The route was installed
    Applied,
    /// An identical route was already installed
    AlreadyPresent,
    /// The route was removed
    Retracted,
    /// The route was already absent
    AlreadyAbsent,
}

/// Installs and removes individual host routes.
///
/// Both operations are idempotent: applying an existing route and
/// retracting a missing one succeed.
#[async_trait]
pub trait RouteProgrammer: Send + Sync {
    async fn apply(&self, route: &ResolvedRoute) -> Result<RouteOutcome, RouteError>;

    async fn retract(&self, route: &ResolvedRoute) -> Result<RouteOutcome, RouteError>;
}
