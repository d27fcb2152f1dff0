//! Reconcilability classification
//!
//! Decides whether moving a node from one MachineConfig to another can be
//! done in place or needs the machine to be reprovisioned. Sections are
//! compared in a fixed order and the first difference wins; later sections
//! are not inspected.
//!
//! Sequences are compared element by element, so reordering e.g. network
//! units counts as a change.

use mcd_types::{IgnitionConfig, MachineConfig};
use std::fmt;

/// Outcome of comparing two configs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileVerdict {
    /// The change can be applied without reprovisioning
    Reconcilable,
    /// The named section differs and cannot be changed in place
    NotReconcilable(String),
}

impl ReconcileVerdict {
    pub fn is_reconcilable(&self) -> bool {
        matches!(self, ReconcileVerdict::Reconcilable)
    }

    /// Section that blocked reconciliation, if any
    pub fn reason(&self) -> Option<&str> {
        match self {
            ReconcileVerdict::Reconcilable => None,
            ReconcileVerdict::NotReconcilable(reason) => Some(reason),
        }
    }
}

impl fmt::Display for ReconcileVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReconcileVerdict::Reconcilable => write!(f, "reconcilable"),
            ReconcileVerdict::NotReconcilable(reason) => {
                write!(f, "not reconcilable: {} changed", reason)
            }
        }
    }
}

/// A section whose changes force reprovisioning
struct Section {
    name: &'static str,
    unchanged: fn(&IgnitionConfig, &IgnitionConfig) -> bool,
}

/// Evaluation order matters: the verdict names the first differing section.
const SECTIONS: &[Section] = &[
    Section {
        name: "ignition version",
        unchanged: |old, new| old.ignition.version == new.ignition.version,
    },
    Section {
        name: "networkd",
        unchanged: |old, new| old.networkd == new.networkd,
    },
    Section {
        name: "disks",
        unchanged: |old, new| old.storage.disks == new.storage.disks,
    },
    Section {
        name: "filesystems",
        unchanged: |old, new| old.storage.filesystems == new.storage.filesystems,
    },
    Section {
        name: "raid",
        unchanged: |old, new| old.storage.raid == new.storage.raid,
    },
];

/// Classify the move from `old` to `new`.
///
/// Files, systemd units and the OS image are applied in place and never make
/// a change unreconcilable.
pub fn classify(old: &MachineConfig, new: &MachineConfig) -> ReconcileVerdict {
    let (old, new) = (&old.spec.config, &new.spec.config);

    SECTIONS
        .iter()
        .find(|section| !(section.unchanged)(old, new))
        .map(|section| ReconcileVerdict::NotReconcilable(section.name.to_string()))
        .unwrap_or(ReconcileVerdict::Reconcilable)
}
