//! Node metadata storage
//!
//! The daemon publishes its state as annotations and labels on the node
//! record. Backends implement [`NodeMetadataStore`].

mod memory;
mod traits;

pub use memory::InMemoryNodeStore;
pub use traits::*;
