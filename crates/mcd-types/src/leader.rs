//! Coordination-service leadership events

use serde::{Deserialize, Serialize};

/// A change of the coordination-service leader, as seen from this node.
///
/// Consecutive events on one stream never carry the same `leader`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderEvent {
    /// Name of the member now leading
    pub leader: String,

    /// When the change was observed
    pub observed_at: chrono::DateTime<chrono::Utc>,
}

impl LeaderEvent {
    pub fn new(leader: impl Into<String>) -> Self {
        Self {
            leader: leader.into(),
            observed_at: chrono::Utc::now(),
        }
    }
}
