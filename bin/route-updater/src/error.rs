use kube::runtime::watcher;
use thiserror::Error;

/// Failures talking to the control plane
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    #[error("Watch error: {0}")]
    Watcher(#[from] watcher::Error),
}
