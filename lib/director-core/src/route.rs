//! Routing model derived from TrafficDirector resources

use crate::{CoreError, Result};
use director_api::{GatewaySpec, TrafficDirector};
use ipnetwork::Ipv4Network;
use kube::ResourceExt;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::net::Ipv4Addr;

/// Identity of one TrafficDirector instance, the key of the route store
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceIdentity {
    pub namespace: String,
    pub name: String,
}

impl ResourceIdentity {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Identity of an event object. Objects without a name or namespace are malformed.
    pub fn from_object(td: &TrafficDirector) -> Result<Self> {
        let name = td
            .metadata
            .name
            .clone()
            .filter(|n| !n.is_empty())
            .ok_or_else(|| CoreError::MalformedResource("object has no name".to_string()))?;
        let namespace = td
            .namespace()
            .filter(|ns| !ns.is_empty())
            .ok_or_else(|| {
                CoreError::MalformedResource(format!("object {} has no namespace", name))
            })?;
        Ok(Self { namespace, name })
    }
}

impl fmt::Display for ResourceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// A gateway namespace and the VIP it serves, as declared by a TrafficDirector
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GatewayBinding {
    pub gateway_namespace: String,
    pub vip: Ipv4Addr,
}

impl GatewayBinding {
    /// Parse a gateway entry. Entries without a VIP yield `None`.
    pub fn from_spec(gateway: &GatewaySpec) -> Result<Option<Self>> {
        let Some(vip) = gateway.vip.as_deref().map(str::trim).filter(|v| !v.is_empty()) else {
            return Ok(None);
        };
        let vip = vip
            .parse::<Ipv4Addr>()
            .map_err(|_| CoreError::InvalidBinding(format!("'{}' is not an IPv4 address", vip)))?;

        Ok(Some(Self {
            gateway_namespace: gateway.namespace.clone().unwrap_or_default(),
            vip,
        }))
    }
}

/// Parse the observed next-hop of a resource. `None` means not reported yet.
pub fn next_hop(td: &TrafficDirector) -> Result<Option<Ipv4Addr>> {
    match td.node_ip() {
        None => Ok(None),
        Some(ip) => ip
            .parse::<Ipv4Addr>()
            .map(Some)
            .map_err(|_| CoreError::InvalidNextHop(ip.to_string())),
    }
}

/// A binding resolved against the resource's next-hop; the unit programmed into the kernel
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ResolvedRoute {
    pub vip: Ipv4Addr,
    pub next_hop: Ipv4Addr,
    pub gateway_namespace: String,
}

impl ResolvedRoute {
    pub fn new(binding: &GatewayBinding, next_hop: Ipv4Addr) -> Self {
        Self {
            vip: binding.vip,
            next_hop,
            gateway_namespace: binding.gateway_namespace.clone(),
        }
    }

    /// Host route destination, `vip/32`
    pub fn destination(&self) -> Ipv4Network {
        Ipv4Network::from(self.vip)
    }
}

impl fmt::Display for ResolvedRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} via {}", self.destination(), self.next_hop)
    }
}

/// Routes recorded for one resource
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RouteSet(BTreeSet<ResolvedRoute>);

impl RouteSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if the route was already present
    pub fn insert(&mut self, route: ResolvedRoute) -> bool {
        self.0.insert(route)
    }

    pub fn contains(&self, route: &ResolvedRoute) -> bool {
        self.0.contains(route)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResolvedRoute> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<ResolvedRoute> for RouteSet {
    fn from_iter<I: IntoIterator<Item = ResolvedRoute>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for RouteSet {
    type Item = ResolvedRoute;
    type IntoIter = std::collections::btree_set::IntoIter<ResolvedRoute>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}
