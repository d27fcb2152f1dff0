//! Configuration for mcd-daemon

use mcd_types::NodeRole;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Node identity and role
    #[serde(default)]
    pub node: NodeConfig,

    /// Host paths
    #[serde(default)]
    pub paths: PathsConfig,

    /// Node-updater client configuration
    #[serde(default)]
    pub updater: UpdaterConfig,

    /// Coordination service connection
    #[serde(default)]
    pub etcd: EtcdConfig,

    /// Control-plane tuning
    #[serde(default)]
    pub control_plane: ControlPlaneConfig,

    /// State reporting
    #[serde(default)]
    pub state: StateConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Node identity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Name of the node record this daemon reports on
    #[serde(default)]
    pub name: String,

    /// Role of the node
    #[serde(default)]
    pub role: NodeRole,

    /// Mount point of the root filesystem
    #[serde(default = "default_root_mount")]
    pub root_mount: PathBuf,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            role: NodeRole::Worker,
            root_mount: default_root_mount(),
        }
    }
}

/// Host paths used by the daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Where the applied MachineConfig is persisted
    #[serde(default = "default_current_config_path")]
    pub current_config: PathBuf,

    /// os-release file used for OS family detection
    #[serde(default = "default_os_release_path")]
    pub os_release: PathBuf,

    /// Root of the sysfs mount
    #[serde(default = "default_sysfs_path")]
    pub sysfs: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            current_config: default_current_config_path(),
            os_release: default_os_release_path(),
            sysfs: default_sysfs_path(),
        }
    }
}

/// rpm-ostree based updater configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdaterConfig {
    /// rpm-ostree executable
    #[serde(default = "default_rpm_ostree_bin")]
    pub rpm_ostree_bin: PathBuf,

    /// Executable performing the image pivot
    #[serde(default = "default_pivot_bin")]
    pub pivot_bin: PathBuf,
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self {
            rpm_ostree_bin: default_rpm_ostree_bin(),
            pivot_bin: default_pivot_bin(),
        }
    }
}

/// Coordination service (etcd) connection used by the leader watcher
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EtcdConfig {
    /// Client certificate (PEM)
    #[serde(default)]
    pub cert_path: PathBuf,

    /// Client key (PEM)
    #[serde(default)]
    pub key_path: PathBuf,

    /// Trusted CA bundle (PEM)
    #[serde(default)]
    pub ca_path: PathBuf,

    /// Endpoint address
    #[serde(default = "default_etcd_endpoint")]
    pub endpoint: String,

    /// Connection timeout in seconds
    #[serde(default = "default_dial_timeout")]
    pub dial_timeout_secs: u64,

    /// Delay between membership polls in seconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Delay after a failed membership poll in seconds
    #[serde(default = "default_backoff_interval")]
    pub backoff_interval_secs: u64,

    /// Capacity of the leader event channel
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

impl Default for EtcdConfig {
    fn default() -> Self {
        Self {
            cert_path: PathBuf::new(),
            key_path: PathBuf::new(),
            ca_path: PathBuf::new(),
            endpoint: default_etcd_endpoint(),
            dial_timeout_secs: default_dial_timeout(),
            poll_interval_secs: default_poll_interval(),
            backoff_interval_secs: default_backoff_interval(),
            event_buffer: default_event_buffer(),
        }
    }
}

impl EtcdConfig {
    pub fn dial_timeout(&self) -> Duration {
        Duration::from_secs(self.dial_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn backoff_interval(&self) -> Duration {
        Duration::from_secs(self.backoff_interval_secs)
    }
}

/// Control-plane tuning configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlPlaneConfig {
    /// I/O scheduler for the root block device
    #[serde(default = "default_scheduler")]
    pub scheduler: String,

    /// sysfs directory of the disk to tune; resolved from the root mount
    /// when unset
    #[serde(default)]
    pub device: Option<PathBuf>,
}

impl Default for ControlPlaneConfig {
    fn default() -> Self {
        Self {
            scheduler: default_scheduler(),
            device: None,
        }
    }
}

/// State reporting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateConfig {
    /// Attempts per state write before the attempt is failed
    #[serde(default = "default_write_attempts")]
    pub write_attempts: u32,

    /// Delay between state write attempts in milliseconds
    #[serde(default = "default_write_backoff")]
    pub write_backoff_ms: u64,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            write_attempts: default_write_attempts(),
            write_backoff_ms: default_write_backoff(),
        }
    }
}

impl StateConfig {
    pub fn write_backoff(&self) -> Duration {
        Duration::from_millis(self.write_backoff_ms)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// Default value helpers
fn default_root_mount() -> PathBuf {
    PathBuf::from("/")
}

fn default_current_config_path() -> PathBuf {
    PathBuf::from("/etc/machine-config-daemon/currentconfig")
}

fn default_os_release_path() -> PathBuf {
    PathBuf::from("/etc/os-release")
}

fn default_sysfs_path() -> PathBuf {
    PathBuf::from("/sys")
}

fn default_rpm_ostree_bin() -> PathBuf {
    PathBuf::from("rpm-ostree")
}

fn default_pivot_bin() -> PathBuf {
    PathBuf::from("/usr/bin/pivot")
}

fn default_etcd_endpoint() -> String {
    "https://localhost:2379".to_string()
}

fn default_dial_timeout() -> u64 {
    15
}

fn default_poll_interval() -> u64 {
    30
}

fn default_backoff_interval() -> u64 {
    10
}

fn default_event_buffer() -> usize {
    16
}

fn default_scheduler() -> String {
    "bfq".to_string()
}

fn default_write_attempts() -> u32 {
    3
}

fn default_write_backoff() -> u64 {
    500
}

fn default_log_level() -> String {
    "info".to_string()
}

impl DaemonConfig {
    /// Load configuration from defaults, an optional file, and `MCD__`
    /// environment variables, in that order of precedence.
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&DaemonConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        // MCD__ETCD__ENDPOINT=... maps to etcd.endpoint
        builder = builder.add_source(
            config::Environment::with_prefix("MCD")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }
}
