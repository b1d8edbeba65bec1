//! Blocks until the TrafficDirector CRD is registered

use crate::backoff::Backoff;
use crate::error::SourceError;
use async_trait::async_trait;
use director_api::TrafficDirector;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::{Api, Client, CustomResourceExt};
use tracing::{debug, info};

/// Checks whether a resource type is known to the control plane
#[async_trait]
pub trait SchemaProbe: Send + Sync {
    /// Name of the schema being probed, for logging
    fn name(&self) -> &str;

    /// `Ok(false)` while the schema is missing. Errors are not retried.
    async fn is_registered(&self) -> Result<bool, SourceError>;
}

/// Looks up the TrafficDirector CustomResourceDefinition by name
pub struct CrdProbe {
    crds: Api<CustomResourceDefinition>,
    name: String,
}

impl CrdProbe {
    pub fn new(client: Client) -> Self {
        Self {
            crds: Api::all(client),
            name: TrafficDirector::crd_name().to_string(),
        }
    }
}

#[async_trait]
impl SchemaProbe for CrdProbe {
    fn name(&self) -> &str {
        &self.name
    }

    async fn is_registered(&self) -> Result<bool, SourceError> {
        Ok(self.crds.get_opt(&self.name).await?.is_some())
    }
}

/// Poll `probe` until the schema exists, sleeping per `backoff` between checks.
/// Returns the number of checks that found it missing.
pub async fn wait_for_schema<P>(probe: &P, mut backoff: Backoff) -> Result<u32, SourceError>
where
    P: SchemaProbe + ?Sized,
{
    info!("Waiting for CRD '{}' to be created...", probe.name());

    loop {
        if probe.is_registered().await? {
            info!("CRD '{}' found!", probe.name());
            return Ok(backoff.attempts());
        }

        let delay = backoff.next_delay();
        debug!("CRD '{}' not registered yet, checking again in {:?}", probe.name(), delay);
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::error::ErrorResponse;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use tokio::time::Instant;

    struct CountdownProbe {
        missing_checks: AtomicU32,
        fail: bool,
    }

    impl CountdownProbe {
        fn ready_after(missing_checks: u32) -> Self {
            Self {
                missing_checks: AtomicU32::new(missing_checks),
                fail: false,
            }
        }
    }

    #[async_trait]
    impl SchemaProbe for CountdownProbe {
        fn name(&self) -> &str {
            "trafficdirectors.gateway.sdn.opsramp.com"
        }

        async fn is_registered(&self) -> Result<bool, SourceError> {
            if self.fail {
                return Err(SourceError::Kube(kube::Error::Api(ErrorResponse {
                    status: "Failure".to_string(),
                    message: "customresourcedefinitions is forbidden".to_string(),
                    reason: "Forbidden".to_string(),
                    code: 403,
                })));
            }
            let remaining = self.missing_checks.load(Ordering::SeqCst);
            if remaining == 0 {
                return Ok(true);
            }
            self.missing_checks.store(remaining - 1, Ordering::SeqCst);
            Ok(false)
        }
    }

    fn every_5s() -> Backoff {
        Backoff::new(Duration::from_secs(5), Duration::from_secs(5))
    }

    #[tokio::test(start_paused = true)]
    async fn test_already_registered_does_not_sleep() {
        let start = Instant::now();
        let misses = wait_for_schema(&CountdownProbe::ready_after(0), every_5s()).await.unwrap();
        assert_eq!(misses, 0);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fixed_interval_polling() {
        let start = Instant::now();
        let misses = wait_for_schema(&CountdownProbe::ready_after(3), every_5s()).await.unwrap();
        assert_eq!(misses, 3);
        assert_eq!(start.elapsed(), Duration::from_secs(15));
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_is_capped() {
        let start = Instant::now();
        let backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(4));
        wait_for_schema(&CountdownProbe::ready_after(5), backoff)
            .await
            .unwrap();
        // 1 + 2 + 4 + 4 + 4
        assert_eq!(start.elapsed(), Duration::from_secs(15));
    }

    #[tokio::test]
    async fn test_probe_error_is_fatal() {
        let probe = CountdownProbe {
            missing_checks: AtomicU32::new(0),
            fail: true,
        };
        let result = wait_for_schema(&probe, every_5s()).await;
        assert!(matches!(result, Err(SourceError::Kube(_))));
    }
}
