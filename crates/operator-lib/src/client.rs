//! Kubernetes client construction

use crate::error::{OperatorError, Result};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use std::path::Path;
use tracing::info;

/// Build a Kubernetes client.
///
/// An explicit kubeconfig path wins; otherwise the configuration is inferred
/// from `KUBECONFIG`, `~/.kube/config` or the in-cluster service account.
pub async fn build_client(kubeconfig: Option<&Path>) -> Result<Client> {
    let config = match kubeconfig {
        Some(path) => {
            info!(path = %path.display(), "Loading kubeconfig");
            let kubeconfig = Kubeconfig::read_from(path)
                .map_err(|e| OperatorError::Config(e.to_string()))?;
            Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .map_err(|e| OperatorError::Config(e.to_string()))?
        }
        None => Config::infer()
            .await
            .map_err(|e| OperatorError::Config(e.to_string()))?,
    };

    Client::try_from(config).map_err(|e| OperatorError::Config(e.to_string()))
}
