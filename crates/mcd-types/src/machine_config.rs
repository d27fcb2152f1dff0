//! MachineConfig and the Ignition config it carries
//!
//! A MachineConfig describes the desired state of a machine: an Ignition
//! config (network units, storage layout, files, systemd units) plus the OS
//! image the machine should boot. Two configs are compared by content; the
//! object name only identifies which config a node is on.

use serde::{Deserialize, Serialize};

/// Desired state of a machine
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineConfig {
    /// Object metadata
    #[serde(default)]
    pub metadata: ObjectMeta,

    /// Configuration content
    #[serde(default)]
    pub spec: MachineConfigSpec,
}

impl MachineConfig {
    /// Create a named config with an empty spec
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            metadata: ObjectMeta { name: name.into() },
            spec: MachineConfigSpec::default(),
        }
    }

    /// Wrap a bare Ignition config
    pub fn from_ignition(name: impl Into<String>, config: IgnitionConfig) -> Self {
        Self {
            metadata: ObjectMeta { name: name.into() },
            spec: MachineConfigSpec {
                os_image_url: String::new(),
                config,
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn os_image_url(&self) -> &str {
        &self.spec.os_image_url
    }

    pub fn with_os_image_url(mut self, url: impl Into<String>) -> Self {
        self.spec.os_image_url = url.into();
        self
    }

    pub fn with_ignition_version(mut self, version: impl Into<String>) -> Self {
        self.spec.config.ignition.version = version.into();
        self
    }
}

/// Object metadata
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    #[serde(default)]
    pub name: String,
}

/// Content of a MachineConfig
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineConfigSpec {
    /// OS image the machine should boot
    #[serde(default, rename = "osImageURL")]
    pub os_image_url: String,

    /// Ignition config
    #[serde(default)]
    pub config: IgnitionConfig,
}

/// Ignition config
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IgnitionConfig {
    #[serde(default)]
    pub ignition: Ignition,

    #[serde(default)]
    pub networkd: Networkd,

    #[serde(default)]
    pub storage: Storage,

    #[serde(default)]
    pub systemd: Systemd,
}

/// Ignition protocol metadata
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ignition {
    /// Protocol version, e.g. `2.2.0`
    #[serde(default)]
    pub version: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Networkd {
    #[serde(default)]
    pub units: Vec<NetworkdUnit>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkdUnit {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contents: Option<String>,
}

/// Storage layout
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Storage {
    #[serde(default)]
    pub disks: Vec<Disk>,

    #[serde(default)]
    pub filesystems: Vec<Filesystem>,

    #[serde(default)]
    pub raid: Vec<Raid>,

    /// Plain files; written in place by the update engine
    #[serde(default)]
    pub files: Vec<StorageFile>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Disk {
    pub device: String,

    #[serde(default)]
    pub wipe_table: bool,

    #[serde(default)]
    pub partitions: Vec<Partition>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Partition {
    #[serde(default)]
    pub label: Option<String>,

    #[serde(default)]
    pub number: u32,

    #[serde(default)]
    pub size: Option<u64>,

    #[serde(default)]
    pub start: Option<u64>,

    #[serde(default)]
    pub type_guid: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filesystem {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub mount: Option<FilesystemMount>,

    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilesystemMount {
    pub device: String,

    pub format: String,

    #[serde(default)]
    pub wipe_filesystem: bool,

    #[serde(default)]
    pub label: Option<String>,

    #[serde(default)]
    pub options: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Raid {
    pub name: String,

    #[serde(default)]
    pub level: String,

    #[serde(default)]
    pub devices: Vec<String>,

    #[serde(default)]
    pub spares: u32,

    #[serde(default)]
    pub options: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageFile {
    pub path: String,

    #[serde(default)]
    pub filesystem: String,

    #[serde(default)]
    pub mode: Option<u32>,

    /// Data URL or remote source of the file contents
    #[serde(default)]
    pub source: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Systemd {
    #[serde(default)]
    pub units: Vec<SystemdUnit>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemdUnit {
    pub name: String,

    #[serde(default)]
    pub enabled: Option<bool>,

    #[serde(default)]
    pub contents: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_machine_config_json_field_names() {
        let json = r#"{
            "metadata": {"name": "rendered-worker-1"},
            "spec": {
                "osImageURL": "quay.io/os@sha256:abc",
                "config": {
                    "ignition": {"version": "2.2.0"},
                    "storage": {"disks": [{"device": "/dev/sdb", "wipeTable": true}]}
                }
            }
        }"#;

        let config: MachineConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.name(), "rendered-worker-1");
        assert_eq!(config.os_image_url(), "quay.io/os@sha256:abc");
        assert_eq!(config.spec.config.ignition.version, "2.2.0");
        assert!(config.spec.config.storage.disks[0].wipe_table);
        assert!(config.spec.config.networkd.units.is_empty());
    }

    #[test]
    fn test_builders() {
        let config = MachineConfig::new("mc")
            .with_os_image_url("image")
            .with_ignition_version("2.2.0");
        assert_eq!(config.os_image_url(), "image");
        assert_eq!(config.spec.config.ignition.version, "2.2.0");

        let wrapped = MachineConfig::from_ignition("ign", config.spec.config.clone());
        assert_eq!(wrapped.os_image_url(), "");
        assert_eq!(wrapped.spec.config, config.spec.config);
    }
}
