//! rpm-ostree backed node-updater client

use super::NodeUpdaterClient;
use crate::config::UpdaterConfig;
use crate::error::{UpdaterError, UpdaterResult};
use async_trait::async_trait;
use mcd_types::OperatingSystem;
use serde::Deserialize;
use std::path::PathBuf;
use tokio::process::Command;
use tracing::{debug, info, instrument};

const PIVOT_ORIGIN_PREFIX: &str = "pivot://";

/// Subset of `rpm-ostree status --json`
#[derive(Debug, Deserialize)]
struct RpmOstreeStatus {
    #[serde(default)]
    deployments: Vec<RpmOstreeDeployment>,
}

#[derive(Debug, Deserialize)]
struct RpmOstreeDeployment {
    #[serde(default)]
    booted: bool,

    #[serde(default, rename = "custom-origin")]
    custom_origin: Vec<String>,
}

/// Queries rpm-ostree for the booted image and runs the pivot tool
#[derive(Debug, Clone)]
pub struct RpmOstreeClient {
    operating_system: OperatingSystem,
    rpm_ostree_bin: PathBuf,
    pivot_bin: PathBuf,
}

impl RpmOstreeClient {
    pub fn new(operating_system: OperatingSystem, config: &UpdaterConfig) -> Self {
        Self {
            operating_system,
            rpm_ostree_bin: config.rpm_ostree_bin.clone(),
            pivot_bin: config.pivot_bin.clone(),
        }
    }
}

/// Extract the booted image reference from rpm-ostree status output.
fn booted_image_from_status(output: &[u8]) -> UpdaterResult<String> {
    let status: RpmOstreeStatus = serde_json::from_slice(output)
        .map_err(|e| UpdaterError::Query(format!("invalid rpm-ostree status: {}", e)))?;

    let booted = status
        .deployments
        .into_iter()
        .find(|d| d.booted)
        .ok_or_else(|| UpdaterError::Query("no booted deployment".to_string()))?;

    // A deployment not created by the pivot tool has no image reference.
    Ok(booted
        .custom_origin
        .first()
        .and_then(|origin| origin.strip_prefix(PIVOT_ORIGIN_PREFIX))
        .unwrap_or_default()
        .to_string())
}

#[async_trait]
impl NodeUpdaterClient for RpmOstreeClient {
    #[instrument(skip(self))]
    async fn booted_os_image_url(&self) -> UpdaterResult<String> {
        if !self.operating_system.supports_pivot() {
            return Err(UpdaterError::Query(format!(
                "booted image not available on {}",
                self.operating_system
            )));
        }

        let output = Command::new(&self.rpm_ostree_bin)
            .args(["status", "--json"])
            .output()
            .await
            .map_err(|e| {
                UpdaterError::Query(format!(
                    "failed to run {}: {}",
                    self.rpm_ostree_bin.display(),
                    e
                ))
            })?;

        if !output.status.success() {
            return Err(UpdaterError::Query(format!(
                "rpm-ostree status exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let image = booted_image_from_status(&output.stdout)?;
        debug!(image = %image, "Queried booted OS image");
        Ok(image)
    }

    #[instrument(skip(self))]
    async fn run_pivot(&self, image: &str) -> UpdaterResult<()> {
        info!(image = %image, "Pivoting OS image");

        let output = Command::new(&self.pivot_bin)
            .arg(image)
            .output()
            .await
            .map_err(|e| {
                UpdaterError::Pivot(format!("failed to run {}: {}", self.pivot_bin.display(), e))
            })?;

        if !output.status.success() {
            return Err(UpdaterError::Pivot(format!(
                "pivot to {} exited with {}: {}",
                image,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        info!(image = %image, "OS image staged for next boot");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_booted_image_from_custom_origin() {
        let status = br#"{
            "deployments": [
                {
                    "booted": false,
                    "custom-origin": ["pivot://quay.io/os@sha256:new", "Managed by pivot tool"]
                },
                {
                    "booted": true,
                    "custom-origin": ["pivot://quay.io/os@sha256:old", "Managed by pivot tool"]
                }
            ]
        }"#;
        assert_eq!(
            booted_image_from_status(status).unwrap(),
            "quay.io/os@sha256:old"
        );
    }

    #[test]
    fn test_booted_image_without_origin_is_empty() {
        let status = br#"{"deployments": [{"booted": true, "origin": "rhcos:4.2"}]}"#;
        assert_eq!(booted_image_from_status(status).unwrap(), "");
    }

    #[test]
    fn test_no_booted_deployment_is_query_error() {
        let status = br#"{"deployments": [{"booted": false}]}"#;
        assert!(matches!(
            booted_image_from_status(status),
            Err(UpdaterError::Query(_))
        ));
        assert!(matches!(
            booted_image_from_status(b"not json"),
            Err(UpdaterError::Query(_))
        ));
    }

    #[tokio::test]
    async fn test_unsupported_os_cannot_report_image() {
        let client = RpmOstreeClient::new(OperatingSystem::Rhel, &UpdaterConfig::default());
        let err = client.booted_os_image_url().await.unwrap_err();
        assert!(matches!(err, UpdaterError::Query(_)));
    }

    #[tokio::test]
    async fn test_missing_pivot_binary_is_pivot_error() {
        let config = UpdaterConfig {
            pivot_bin: PathBuf::from("/nonexistent/pivot"),
            ..Default::default()
        };
        let client = RpmOstreeClient::new(OperatingSystem::Rhcos, &config);
        let err = client.run_pivot("quay.io/os@sha256:new").await.unwrap_err();
        assert!(matches!(err, UpdaterError::Pivot(_)));
    }
}
