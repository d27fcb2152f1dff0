//! Error types for mcd-daemon

use mcd_types::DaemonState;
use std::path::PathBuf;
use thiserror::Error;

/// Errors reported by a node-updater client
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpdaterError {
    /// The booted OS image could not be determined
    #[error("failed to query booted OS image: {0}")]
    Query(String),

    /// Switching the OS image failed
    #[error("failed to pivot OS image: {0}")]
    Pivot(String),
}

/// Errors from the control-plane tuning action
#[derive(Debug, Error)]
pub enum ControlPlaneError {
    /// The root block device could not be located in sysfs
    #[error("failed to resolve root block device: {0}")]
    DeviceResolution(String),

    /// Reading or writing a sysfs file failed
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors from the coordination-service client
#[derive(Debug, Error)]
pub enum EtcdError {
    /// The client transport could not be established
    #[error("connection error: {0}")]
    Connection(String),

    /// A membership or status request failed
    #[error("query error: {0}")]
    Query(String),

    /// A TLS credential file could not be read
    #[error("failed to read TLS file {path}: {source}")]
    Tls {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Node metadata storage errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    /// Store could not be reached
    #[error("Unavailable: {0}")]
    Unavailable(String),

    /// A stored value could not be interpreted
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

/// Errors loading a configuration document
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to fetch {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The document is neither a MachineConfig nor an Ignition config
    #[error("unrecognized configuration document: {0}")]
    Unrecognized(String),

    #[error("failed to parse configuration document: {0}")]
    Parse(String),
}

/// Daemon-level errors
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Node updater error
    #[error("Updater error: {0}")]
    Updater(#[from] UpdaterError),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// A state transition could not be persisted
    #[error("failed to record state {state}: {source}")]
    StateWrite {
        state: DaemonState,
        #[source]
        source: StorageError,
    },

    /// Configuration source error
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for node updater operations
pub type UpdaterResult<T> = Result<T, UpdaterError>;

/// Result type alias for daemon operations
pub type DaemonResult<T> = Result<T, DaemonError>;
