//! Machine Config Daemon library
//!
//! This crate provides the per-node update agent:
//! - Reconcilability classification of config changes
//! - OS image updates through a node-updater client
//! - Working/Done/Degraded state published on the node record
//! - Control-plane scheduler tuning driven by etcd leader changes

pub mod config;
pub mod control_plane;
pub mod daemon;
pub mod error;
pub mod etcd;
pub mod reconcile;
pub mod source;
pub mod state;
pub mod storage;
pub mod update;
pub mod updater;

pub use config::DaemonConfig;
pub use daemon::{ApplyOutcome, ConfigChange, Daemon};
pub use error::{DaemonError, DaemonResult, StorageError, UpdaterError};
pub use reconcile::{classify, ReconcileVerdict};
pub use storage::{InMemoryNodeStore, NodeMetadataStore};
pub use update::update_os;
pub use updater::{NodeUpdaterClient, RpmOstreeClient};
