use clap::Parser;
use director_netns::NetnsConfig;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::backoff::Backoff;

/// Keeps router namespace routes in sync with TrafficDirector resources
#[derive(Parser, Clone, Debug)]
#[command(name = "route-updater", version)]
pub struct Args {
    #[arg(
        long,
        env = "WATCH_NAMESPACE",
        default_value = "opsramp-sdn",
        help = "Namespace whose TrafficDirectors are watched"
    )]
    pub namespace: String,

    #[arg(
        long,
        env = "ROUTER_NAMESPACE",
        default_value = "n1",
        help = "Network namespace the routes are installed in"
    )]
    pub router_namespace: String,

    #[arg(
        long,
        env = "EGRESS_INTERFACE",
        default_value = "lana_1",
        help = "Interface the routes point out of"
    )]
    pub egress_interface: String,

    #[arg(
        long,
        env = "ROUTE_COMMAND_TIMEOUT_SECS",
        default_value_t = 30,
        help = "Timeout for a single `ip route` invocation, 0 disables it"
    )]
    pub command_timeout_secs: u64,

    #[arg(
        long,
        env = "ROUTE_UPDATER_LOG_FILE",
        value_hint = clap::ValueHint::FilePath,
        default_value = "/var/log/route-updater/route-updater.log",
        help = "Path of the rotating log file"
    )]
    pub log_file: PathBuf,

    #[arg(long, default_value_t = 10 * 1024 * 1024, help = "Log file size that triggers rotation")]
    pub log_max_bytes: u64,

    #[arg(long, default_value_t = 1, help = "Rotated log files to keep")]
    pub log_backups: usize,

    #[arg(long, default_value_t = 5, help = "Seconds between CRD readiness checks")]
    pub schema_poll_secs: u64,

    #[arg(long, default_value_t = 5, help = "Upper bound for the CRD readiness interval")]
    pub schema_poll_max_secs: u64,

    #[arg(long, default_value_t = 1, help = "First delay before resubscribing after a watch failure")]
    pub resubscribe_initial_secs: u64,

    #[arg(long, default_value_t = 30, help = "Upper bound for the resubscribe delay")]
    pub resubscribe_max_secs: u64,

    #[arg(long, default_value_t = 290, help = "Server-side timeout of one watch request")]
    pub watch_timeout_secs: u32,

    #[arg(
        long,
        env = "METRICS_ADDR",
        help = "Address to serve /metrics and /healthz on, e.g. 0.0.0.0:9090"
    )]
    pub metrics_addr: Option<SocketAddr>,

    #[arg(long, help = "Print the TrafficDirector CRD manifest and exit")]
    pub print_crd: bool,
}

impl Args {
    pub fn netns(&self) -> NetnsConfig {
        NetnsConfig {
            router_namespace: self.router_namespace.clone(),
            egress_interface: self.egress_interface.clone(),
            command_timeout: (self.command_timeout_secs > 0)
                .then(|| Duration::from_secs(self.command_timeout_secs)),
        }
    }

    pub fn schema_backoff(&self) -> Backoff {
        Backoff::new(
            Duration::from_secs(self.schema_poll_secs),
            Duration::from_secs(self.schema_poll_max_secs),
        )
    }

    pub fn resubscribe_backoff(&self) -> Backoff {
        Backoff::new(
            Duration::from_secs(self.resubscribe_initial_secs),
            Duration::from_secs(self.resubscribe_max_secs),
        )
    }
}
