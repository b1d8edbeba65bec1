use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// TrafficDirector declares which virtual IPs are reachable through which
/// gateway namespaces. The operator fills in the node address that traffic
/// for those VIPs should be forwarded to.
#[derive(CustomResource, Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "gateway.sdn.opsramp.com",
    version = "v1",
    kind = "TrafficDirector",
    plural = "trafficdirectors",
    namespaced,
    derive = "Default",
    status = "TrafficDirectorStatus",
)]
pub struct TrafficDirectorSpec {
    /// Gateway bindings served by this director
    #[serde(default)]
    pub gateways: Vec<GatewaySpec>,
}

/// A single gateway binding
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct GatewaySpec {
    /// Namespace the gateway runs in
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    /// Virtual IP exposed through the gateway
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vip: Option<String>,
}

/// Status of a TrafficDirector
#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TrafficDirectorStatus {
    /// Address of the node currently hosting the director
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_ip: Option<String>,
}

impl TrafficDirector {
    /// The observed next-hop address, if the operator has reported one
    pub fn node_ip(&self) -> Option<&str> {
        self.status
            .as_ref()
            .and_then(|status| status.node_ip.as_deref())
            .map(str::trim)
            .filter(|ip| !ip.is_empty())
    }
}
