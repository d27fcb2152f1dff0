//! Keys of the metadata the daemon publishes on its node record.

/// Annotation naming the MachineConfig currently applied to the node.
pub const CURRENT_CONFIG_ANNOTATION: &str = "machineconfiguration.openshift.io/currentConfig";

/// Annotation naming the MachineConfig the node is being moved to.
pub const DESIRED_CONFIG_ANNOTATION: &str = "machineconfiguration.openshift.io/desiredConfig";

/// Annotation carrying the [`DaemonState`](crate::DaemonState) of the node.
pub const STATE_ANNOTATION: &str = "machineconfiguration.openshift.io/state";

/// Label mirroring `state == Degraded` so fleets can be filtered with a
/// label selector instead of inspecting annotations.
pub const DEGRADED_LABEL: &str = "machineconfiguration.openshift.io/degraded";
