//! Storage trait definitions

use crate::error::StorageError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Annotations and labels of a node record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeMetadata {
    pub annotations: BTreeMap<String, String>,
    pub labels: BTreeMap<String, String>,
}

impl NodeMetadata {
    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.annotations.get(key).map(String::as_str)
    }

    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }
}

/// A merge patch: listed keys are overwritten, others are left alone
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeMetadataPatch {
    pub annotations: BTreeMap<String, String>,
    pub labels: BTreeMap<String, String>,
}

impl NodeMetadataPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }

    pub fn label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn apply_to(&self, metadata: &mut NodeMetadata) {
        metadata.annotations.extend(self.annotations.clone());
        metadata.labels.extend(self.labels.clone());
    }
}

/// Cluster-visible metadata of nodes
#[async_trait]
pub trait NodeMetadataStore: Send + Sync {
    /// Get the metadata of a node
    async fn get_node(&self, name: &str) -> StorageResult<Option<NodeMetadata>>;

    /// Merge a patch into a node record, returning the result
    async fn patch_node(&self, name: &str, patch: NodeMetadataPatch) -> StorageResult<NodeMetadata>;
}
