use anyhow::{Context, Result};
use clap::Parser;
use director_api::TrafficDirector;
use director_core::{InMemoryRouteStore, ReconcileMetrics, Reconciler};
use director_netns::IpRouteProgrammer;
use kube::{Client, CustomResourceExt, Resource};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

mod backoff;
mod config;
mod error;
mod logging;
mod metrics_server;
mod schema;
mod source;
mod watch;

use config::Args;
use schema::{wait_for_schema, CrdProbe};
use source::KubeEventSource;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_crd {
        print!("{}", serde_yaml::to_string(&TrafficDirector::crd())?);
        return Ok(());
    }

    let _log_guard = logging::init(&args.log_file, args.log_max_bytes, args.log_backups)?;
    info!("Route updater started");

    if let Err(e) = run(args).await {
        error!("Fatal error: {:#}", e);
        return Err(e);
    }
    Ok(())
}

async fn run(args: Args) -> Result<()> {
    let client = Client::try_default()
        .await
        .context("failed to load Kubernetes configuration")?;
    info!("Kubernetes client initialized");

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Shutdown signal received, exiting...");
                    shutdown.cancel();
                }
                Err(e) => warn!("Cannot listen for shutdown signal: {}", e),
            }
        }
    });

    let metrics = Arc::new(ReconcileMetrics::new()?);
    if let Some(addr) = args.metrics_addr {
        let metrics = metrics.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = metrics_server::serve(addr, metrics, shutdown).await {
                error!("Metrics server error: {}", e);
            }
        });
    }

    let probe = CrdProbe::new(client.clone());
    tokio::select! {
        biased;
        _ = shutdown.cancelled() => return Ok(()),
        found = wait_for_schema(&probe, args.schema_backoff()) => {
            found.context("failed to check for the TrafficDirector CRD")?;
        }
    }

    let programmer = IpRouteProgrammer::with_config(args.netns());
    let reconciler = Reconciler::new(
        Arc::new(InMemoryRouteStore::new()),
        Arc::new(programmer),
        metrics,
    );

    info!(
        "Starting watch on {} in namespace {} (router namespace {}, egress interface {})",
        TrafficDirector::plural(&()),
        args.namespace,
        args.router_namespace,
        args.egress_interface
    );
    let source = KubeEventSource::new(client, &args.namespace, args.watch_timeout_secs);
    watch::run(&source, &reconciler, args.resubscribe_backoff(), shutdown).await;

    info!("Route updater stopped");
    Ok(())
}
