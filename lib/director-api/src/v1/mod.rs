/// API version v1 for Traffic Director CRDs

pub mod traffic_director;

pub use traffic_director::{GatewaySpec, TrafficDirector, TrafficDirectorSpec, TrafficDirectorStatus};

