//! Daemon update state
//!
//! One state is active per node at any time. It is never deleted, only
//! overwritten by the next transition.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Progress of the most recent update attempt on a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DaemonState {
    /// An update is being applied
    Working,
    /// The last update was applied
    Done,
    /// The last update failed and needs operator attention
    Degraded,
}

impl DaemonState {
    /// Value written to the state annotation
    pub fn as_str(&self) -> &'static str {
        match self {
            DaemonState::Working => "Working",
            DaemonState::Done => "Done",
            DaemonState::Degraded => "Degraded",
        }
    }

    /// The derived degraded marker, true iff the state is `Degraded`
    pub fn is_degraded(&self) -> bool {
        matches!(self, DaemonState::Degraded)
    }
}

impl fmt::Display for DaemonState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown daemon state: {0}")]
pub struct ParseStateError(pub String);

impl FromStr for DaemonState {
    type Err = ParseStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Working" => Ok(DaemonState::Working),
            "Done" => Ok(DaemonState::Done),
            "Degraded" => Ok(DaemonState::Degraded),
            other => Err(ParseStateError(other.to_string())),
        }
    }
}
