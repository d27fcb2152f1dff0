//! In-memory storage implementation

use super::traits::*;
use crate::error::StorageError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-memory node store for standalone runs and testing
///
/// Nodes are created on first patch.
#[derive(Debug, Default)]
pub struct InMemoryNodeStore {
    nodes: Arc<RwLock<HashMap<String, NodeMetadata>>>,
    failing_writes: AtomicU32,
    writes: AtomicUsize,
}

impl InMemoryNodeStore {
    /// Create a new in-memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` patches fail with [`StorageError::Unavailable`]
    pub fn fail_next_writes(&self, count: u32) {
        self.failing_writes.store(count, Ordering::SeqCst);
    }

    /// Number of successful patches so far
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NodeMetadataStore for InMemoryNodeStore {
    async fn get_node(&self, name: &str) -> StorageResult<Option<NodeMetadata>> {
        let nodes = self.nodes.read().await;
        Ok(nodes.get(name).cloned())
    }

    async fn patch_node(
        &self,
        name: &str,
        patch: NodeMetadataPatch,
    ) -> StorageResult<NodeMetadata> {
        let injected = self
            .failing_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(StorageError::Unavailable(format!(
                "injected write failure for node {}",
                name
            )));
        }

        let mut nodes = self.nodes.write().await;
        let metadata = nodes.entry(name.to_string()).or_default();
        patch.apply_to(metadata);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(metadata.clone())
    }
}
