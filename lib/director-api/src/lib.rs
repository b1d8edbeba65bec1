//! Traffic Director API types and CRDs for Kubernetes integration
//!
//! This library defines the custom resource watched by the route updater:
//! - TrafficDirector: binds virtual IPs to gateway namespaces, with the
//!   node address assigned by the operator reported in its status

pub mod v1;

pub use v1::{GatewaySpec, TrafficDirector, TrafficDirectorSpec, TrafficDirectorStatus};
