//! CRD bootstrap
//!
//! Creates every CustomResourceDefinition found in a directory if it does
//! not exist yet. Existing definitions are left untouched.

use crate::error::{OperatorError, Result};
use async_trait::async_trait;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{ListParams, PostParams};
use kube::{Api, Client};
use std::path::{Path, PathBuf};
use tracing::info;

/// Label carried by every KPT CRD
pub const CRD_SELECTOR: &str = "app=kpt";

/// What happened to one CRD during bootstrap
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrdAction {
    Created(String),
    AlreadyExists(String),
}

/// Minimal CRD access needed by the bootstrap
#[async_trait]
pub trait CrdRegistry: Send + Sync {
    async fn exists(&self, name: &str) -> Result<bool>;
    async fn create(&self, crd: &CustomResourceDefinition) -> Result<()>;
    /// Names of the CRDs matching a label selector
    async fn list_names(&self, selector: &str) -> Result<Vec<String>>;
}

/// [`CrdRegistry`] backed by the apiextensions API
pub struct KubeCrdRegistry {
    api: Api<CustomResourceDefinition>,
}

impl KubeCrdRegistry {
    pub fn new(client: Client) -> Self {
        Self {
            api: Api::all(client),
        }
    }
}

#[async_trait]
impl CrdRegistry for KubeCrdRegistry {
    async fn exists(&self, name: &str) -> Result<bool> {
        let existing = self.api.get_opt(name).await.map_err(OperatorError::Store)?;
        Ok(existing.is_some())
    }

    async fn create(&self, crd: &CustomResourceDefinition) -> Result<()> {
        self.api
            .create(&PostParams::default(), crd)
            .await
            .map_err(OperatorError::Store)?;
        Ok(())
    }

    async fn list_names(&self, selector: &str) -> Result<Vec<String>> {
        let list = self
            .api
            .list(&ListParams::default().labels(selector))
            .await
            .map_err(OperatorError::Store)?;

        Ok(list
            .items
            .into_iter()
            .filter_map(|crd| crd.metadata.name)
            .collect())
    }
}

/// Load every `*.yaml` CRD definition in `dir`, sorted by file name
pub fn load_crds(dir: &Path) -> Result<Vec<(PathBuf, CustomResourceDefinition)>> {
    let entries = std::fs::read_dir(dir).map_err(|e| OperatorError::bootstrap(dir.display(), e))?;

    let mut paths = Vec::new();
    for entry in entries {
        let path = entry
            .map_err(|e| OperatorError::bootstrap(dir.display(), e))?
            .path();
        if path.is_file() && path.extension().map(|ext| ext == "yaml").unwrap_or(false) {
            paths.push(path);
        }
    }
    paths.sort();

    paths
        .into_iter()
        .map(|path| {
            let data = std::fs::read_to_string(&path)
                .map_err(|e| OperatorError::bootstrap(path.display(), e))?;
            let crd: CustomResourceDefinition = serde_yaml::from_str(&data)
                .map_err(|e| OperatorError::bootstrap(path.display(), e))?;
            Ok((path, crd))
        })
        .collect()
}

/// Create each CRD in `dir` that does not exist yet
pub async fn ensure_crds(registry: &dyn CrdRegistry, dir: &Path) -> Result<Vec<CrdAction>> {
    let mut actions = Vec::new();

    for (path, crd) in load_crds(dir)? {
        let name = crd
            .metadata
            .name
            .clone()
            .ok_or_else(|| OperatorError::bootstrap(path.display(), "CRD has no metadata.name"))?;

        if registry.exists(&name).await? {
            info!(crd = %name, "CRD already exists");
            actions.push(CrdAction::AlreadyExists(name));
            continue;
        }

        registry.create(&crd).await?;
        info!(crd = %name, "Created CRD");
        actions.push(CrdAction::Created(name));
    }

    Ok(actions)
}
