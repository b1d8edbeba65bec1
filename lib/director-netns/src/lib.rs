//! Kernel route programming inside a router network namespace
pub mod command;
pub mod ip_route;

pub use command::{CommandOutput, CommandRunner, ProcessRunner};
pub use ip_route::{IpRouteProgrammer, NetnsConfig};
