//! Loading configuration documents
//!
//! A document is either a full MachineConfig or a bare Ignition config,
//! encoded as JSON or YAML, read from disk or fetched over HTTP(S).

use crate::error::SourceError;
use mcd_types::{IgnitionConfig, MachineConfig};
use serde_json::Value;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Where a document came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigOrigin {
    Local(PathBuf),
    Remote(String),
}

impl ConfigOrigin {
    /// `http://` and `https://` locations are remote, anything else is a path.
    pub fn parse(location: &str) -> Self {
        if location.starts_with("http://") || location.starts_with("https://") {
            ConfigOrigin::Remote(location.to_string())
        } else {
            ConfigOrigin::Local(PathBuf::from(location))
        }
    }
}

impl fmt::Display for ConfigOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigOrigin::Local(path) => write!(f, "LOCAL {}", path.display()),
            ConfigOrigin::Remote(url) => write!(f, "REMOTE {}", url),
        }
    }
}

/// Kind of document found at an origin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    MachineConfig,
    Ignition,
}

/// A loaded document
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub origin: ConfigOrigin,
    pub file_type: FileType,
    pub config: MachineConfig,
}

/// Load the document at `origin`.
pub async fn load(origin: &ConfigOrigin) -> Result<LoadedConfig, SourceError> {
    let raw = match origin {
        ConfigOrigin::Local(path) => read_local(path).await?,
        ConfigOrigin::Remote(url) => fetch_remote(url).await?,
    };

    let (file_type, config) = parse_document(&raw, &default_name(origin))?;
    info!(origin = %origin, file_type = ?file_type, name = %config.name(), "Loaded configuration");

    Ok(LoadedConfig {
        origin: origin.clone(),
        file_type,
        config,
    })
}

/// Read the MachineConfig persisted at `path`, or an empty one if the node
/// has never applied a config.
pub async fn load_current(path: &Path) -> Result<MachineConfig, SourceError> {
    match tokio::fs::try_exists(path).await {
        Ok(true) => Ok(load(&ConfigOrigin::Local(path.to_path_buf())).await?.config),
        Ok(false) => {
            debug!(path = %path.display(), "No current config on disk");
            Ok(MachineConfig::default())
        }
        Err(source) => Err(SourceError::Read {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Persist `config` as the node's current config.
pub async fn store_current(path: &Path, config: &MachineConfig) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let json = serde_json::to_vec_pretty(config)?;
    tokio::fs::write(path, json).await
}

async fn read_local(path: &Path) -> Result<String, SourceError> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|source| SourceError::Read {
            path: path.to_path_buf(),
            source,
        })
}

async fn fetch_remote(url: &str) -> Result<String, SourceError> {
    let fetch = |source| SourceError::Fetch {
        url: url.to_string(),
        source,
    };
    reqwest::get(url)
        .await
        .and_then(|response| response.error_for_status())
        .map_err(fetch)?
        .text()
        .await
        .map_err(fetch)
}

fn default_name(origin: &ConfigOrigin) -> String {
    match origin {
        ConfigOrigin::Local(path) => path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default(),
        ConfigOrigin::Remote(url) => url.rsplit('/').next().unwrap_or_default().to_string(),
    }
}

/// Decode a JSON or YAML document and detect its type.
///
/// Documents without a name are named `fallback_name`.
pub fn parse_document(
    raw: &str,
    fallback_name: &str,
) -> Result<(FileType, MachineConfig), SourceError> {
    // YAML is a superset of JSON, but JSON is tried first for better errors.
    let value: Value = match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(_) => serde_yaml::from_str(raw).map_err(|e| SourceError::Parse(e.to_string()))?,
    };

    if value.get("spec").is_some() {
        let mut config: MachineConfig =
            serde_json::from_value(value).map_err(|e| SourceError::Parse(e.to_string()))?;
        if config.metadata.name.is_empty() {
            config.metadata.name = fallback_name.to_string();
        }
        return Ok((FileType::MachineConfig, config));
    }

    if value.pointer("/ignition/version").is_some() {
        let ignition: IgnitionConfig =
            serde_json::from_value(value).map_err(|e| SourceError::Parse(e.to_string()))?;
        return Ok((
            FileType::Ignition,
            MachineConfig::from_ignition(fallback_name, ignition),
        ));
    }

    Err(SourceError::Unrecognized(
        "expected a MachineConfig (spec) or an Ignition config (ignition.version)".to_string(),
    ))
}
