//! Facts about the machine the daemon runs on

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Operating system family of the node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum OperatingSystem {
    /// Red Hat Enterprise Linux CoreOS, the only family with image pivots
    Rhcos,
    /// Red Hat Enterprise Linux
    Rhel,
    /// CentOS
    Centos,
    /// Anything else
    #[default]
    Unknown,
}

impl OperatingSystem {
    /// Detect the family from the contents of an `os-release` file.
    pub fn from_os_release(contents: &str) -> Self {
        let mut id = None;
        let mut variant_id = None;

        for line in contents.lines() {
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let value = value.trim().trim_matches('"').trim_matches('\'');
            match key.trim() {
                "ID" => id = Some(value.to_string()),
                "VARIANT_ID" => variant_id = Some(value.to_string()),
                _ => {}
            }
        }

        match (id.as_deref(), variant_id.as_deref()) {
            (Some("rhcos"), _) => OperatingSystem::Rhcos,
            (Some("rhel"), Some("coreos")) => OperatingSystem::Rhcos,
            (Some("rhel"), _) => OperatingSystem::Rhel,
            (Some("centos"), _) => OperatingSystem::Centos,
            _ => OperatingSystem::Unknown,
        }
    }

    /// Whether the base image can be switched in place
    pub fn supports_pivot(&self) -> bool {
        matches!(self, OperatingSystem::Rhcos)
    }
}

impl fmt::Display for OperatingSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperatingSystem::Rhcos => write!(f, "RHCOS"),
            OperatingSystem::Rhel => write!(f, "RHEL"),
            OperatingSystem::Centos => write!(f, "CENTOS"),
            OperatingSystem::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Role of the node in the cluster, decided outside the daemon
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum NodeRole {
    #[default]
    Worker,
    /// Runs the coordination service; receives control-plane tuning
    #[serde(alias = "master")]
    ControlPlane,
}

impl NodeRole {
    pub fn is_control_plane(&self) -> bool {
        matches!(self, NodeRole::ControlPlane)
    }
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeRole::Worker => write!(f, "worker"),
            NodeRole::ControlPlane => write!(f, "control-plane"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown node role: {0}")]
pub struct ParseRoleError(pub String);

impl FromStr for NodeRole {
    type Err = ParseRoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "worker" => Ok(NodeRole::Worker),
            "control-plane" | "controlplane" | "master" => Ok(NodeRole::ControlPlane),
            other => Err(ParseRoleError(other.to_string())),
        }
    }
}
