//! Node update state machine
//!
//! ```text
//!            ┌──────► Done
//!  Working ──┤
//!            └──────► Degraded
//! ```
//!
//! `Working` is entered at the start of every in-place update attempt; the
//! outcome of the OS update decides between `Done` and `Degraded`. Every
//! transition is written to the node record before it counts. Nothing here
//! retries an attempt that ended in `Degraded`.

use crate::config::StateConfig;
use crate::error::{DaemonError, DaemonResult, StorageError};
use crate::storage::{NodeMetadataPatch, NodeMetadataStore};
use mcd_types::annotations::{
    CURRENT_CONFIG_ANNOTATION, DEGRADED_LABEL, DESIRED_CONFIG_ANNOTATION, STATE_ANNOTATION,
};
use mcd_types::DaemonState;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Terminal state of an attempt given its outcome
pub fn state_after<T, E>(outcome: &Result<T, E>) -> DaemonState {
    match outcome {
        Ok(_) => DaemonState::Done,
        Err(_) => DaemonState::Degraded,
    }
}

/// Writes state transitions of one node to the metadata store
pub struct StateReporter {
    node: String,
    store: Arc<dyn NodeMetadataStore>,
    write_attempts: u32,
    write_backoff: Duration,
}

impl StateReporter {
    pub fn new(
        node: impl Into<String>,
        store: Arc<dyn NodeMetadataStore>,
        config: &StateConfig,
    ) -> Self {
        Self {
            node: node.into(),
            store,
            write_attempts: config.write_attempts.max(1),
            write_backoff: config.write_backoff(),
        }
    }

    /// State currently published for the node, if any
    pub async fn current(&self) -> DaemonResult<Option<DaemonState>> {
        let Some(metadata) = self.store.get_node(&self.node).await? else {
            return Ok(None);
        };

        metadata
            .annotation(STATE_ANNOTATION)
            .map(|value| {
                value
                    .parse::<DaemonState>()
                    .map_err(|e| DaemonError::Storage(StorageError::InvalidData(e.to_string())))
            })
            .transpose()
    }

    /// Publish `Done` for a node that has never reported a state.
    pub async fn ensure_initialized(&self) -> DaemonResult<DaemonState> {
        if let Some(state) = self.current().await? {
            return Ok(state);
        }

        info!(node = %self.node, "No state recorded, starting clean");
        self.transition(DaemonState::Done, NodeMetadataPatch::new()).await?;
        Ok(DaemonState::Done)
    }

    /// Enter `Working` for an update to `desired`
    pub async fn begin(&self, desired: &str) -> DaemonResult<()> {
        let patch = NodeMetadataPatch::new().annotation(DESIRED_CONFIG_ANNOTATION, desired);
        self.transition(DaemonState::Working, patch).await
    }

    /// Leave `Working` according to the attempt's outcome.
    ///
    /// On success `applied` becomes the node's current config.
    pub async fn finish<T, E>(
        &self,
        applied: &str,
        outcome: &Result<T, E>,
    ) -> DaemonResult<DaemonState> {
        let state = state_after(outcome);
        let patch = match state {
            DaemonState::Done => {
                NodeMetadataPatch::new().annotation(CURRENT_CONFIG_ANNOTATION, applied)
            }
            _ => NodeMetadataPatch::new(),
        };

        self.transition(state, patch).await?;
        Ok(state)
    }

    async fn transition(&self, state: DaemonState, patch: NodeMetadataPatch) -> DaemonResult<()> {
        let patch = patch
            .annotation(STATE_ANNOTATION, state.as_str())
            .label(DEGRADED_LABEL, state.is_degraded().to_string());

        let mut attempt = 1;
        loop {
            match self.store.patch_node(&self.node, patch.clone()).await {
                Ok(_) => {
                    info!(node = %self.node, state = %state, "Updated node state");
                    return Ok(());
                }
                Err(e) if attempt < self.write_attempts => {
                    warn!(
                        node = %self.node,
                        state = %state,
                        attempt = attempt,
                        error = %e,
                        "Failed to write node state, retrying"
                    );
                    attempt += 1;
                    tokio::time::sleep(self.write_backoff).await;
                }
                Err(source) => return Err(DaemonError::StateWrite { state, source }),
            }
        }
    }
}
