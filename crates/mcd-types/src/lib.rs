//! Machine Config Daemon types
//!
//! Shared data model for the per-node machine config daemon:
//!
//! - **MachineConfig**: the desired machine state (Ignition config + OS image)
//! - **DaemonState**: the update progress published on the node record
//! - **OperatingSystem** / **NodeRole**: facts about the machine the daemon runs on
//! - **LeaderEvent**: coordination-service leader changes seen by control-plane nodes
//!
//! This crate performs no I/O.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod annotations;
pub mod leader;
pub mod machine_config;
pub mod node;
pub mod state;

pub use leader::LeaderEvent;
pub use machine_config::{
    Disk, Filesystem, FilesystemMount, Ignition, IgnitionConfig, MachineConfig,
    MachineConfigSpec, Networkd, NetworkdUnit, ObjectMeta, Partition, Raid, Storage, StorageFile,
    Systemd, SystemdUnit,
};
pub use node::{NodeRole, OperatingSystem, ParseRoleError};
pub use state::{DaemonState, ParseStateError};
