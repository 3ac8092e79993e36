//! Configuration management for the CLI

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// CLI defaults, read from `~/.config/kptctl/config.json` when present
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct CliConfig {
    /// Kubeconfig used when `--kubeconfig` is not given
    pub kubeconfig: Option<PathBuf>,
    /// Namespace used when `--namespace` is not given
    pub namespace: Option<String>,
}

impl CliConfig {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    /// Load configuration from `path`; a missing file yields defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    fn config_path() -> Option<PathBuf> {
        dirs_next::home_dir().map(|home| home.join(".config").join("kptctl").join("config.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_default() {
        let config = CliConfig::load_from(Path::new("/nonexistent/kptctl.json")).unwrap();
        assert_eq!(config, CliConfig::default());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"kubeconfig": "/home/dev/.kube/staging", "namespace": "shop"}"#,
        )
        .unwrap();

        let config = CliConfig::load_from(&path).unwrap();

        assert_eq!(config.kubeconfig, Some(PathBuf::from("/home/dev/.kube/staging")));
        assert_eq!(config.namespace.as_deref(), Some("shop"));
    }

    #[test]
    fn test_invalid_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{not json").unwrap();

        let err = CliConfig::load_from(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse"));
    }
}
