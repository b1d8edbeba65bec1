//! Feeds subscription events to the reconciler.
//!
//! Watch errors are reported by the subscription and retried inside it; the
//! loop only resubscribes, with backoff, if subscribing fails or the stream
//! ends.

use crate::backoff::Backoff;
use crate::source::EventSource;
use director_core::Reconciler;
use futures::StreamExt;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Run until `shutdown` is cancelled. Source failures are never fatal.
pub async fn run<S>(source: &S, reconciler: &Reconciler, mut backoff: Backoff, shutdown: CancellationToken)
where
    S: EventSource + ?Sized,
{
    'subscriptions: loop {
        let subscription = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break 'subscriptions,
            subscription = source.subscribe() => subscription,
        };

        let mut events = match subscription {
            Ok(events) => {
                info!("Subscribed to TrafficDirector events");
                events
            }
            Err(e) => {
                let delay = backoff.next_delay();
                warn!("Failed to subscribe to TrafficDirector events: {}; retrying in {:?}", e, delay);
                if sleep_or_cancel(delay, &shutdown).await {
                    break 'subscriptions;
                }
                continue;
            }
        };

        loop {
            let next = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break 'subscriptions,
                next = events.next() => next,
            };

            match next {
                Some(Ok(event)) => {
                    backoff.reset();
                    reconciler.handle(event).await;
                }
                Some(Err(e)) => warn!("Watch error, retrying: {}", e),
                None => break,
            }
        }

        let delay = backoff.next_delay();
        warn!("Watch stream ended; resubscribing in {:?}", delay);
        if sleep_or_cancel(delay, &shutdown).await {
            break 'subscriptions;
        }
    }

    info!("Stopped watching TrafficDirectors");
}

/// Returns true if cancelled before the delay elapsed
async fn sleep_or_cancel(delay: Duration, shutdown: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        _ = shutdown.cancelled() => true,
        _ = tokio::time::sleep(delay) => false,
    }
}
