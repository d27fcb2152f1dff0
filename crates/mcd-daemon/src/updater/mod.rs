//! Node-updater clients
//!
//! The daemon reaches the host's OS update machinery only through
//! [`NodeUpdaterClient`]. Production nodes use [`RpmOstreeClient`]; tests
//! script results with [`ScriptedUpdaterClient`].

#[cfg(any(test, feature = "test-utils"))]
mod mock;
mod rpm_ostree;

#[cfg(any(test, feature = "test-utils"))]
pub use mock::ScriptedUpdaterClient;
pub use rpm_ostree::RpmOstreeClient;

use crate::error::UpdaterResult;
use async_trait::async_trait;

/// Capability to inspect and switch the machine's base OS image
#[async_trait]
pub trait NodeUpdaterClient: Send + Sync {
    /// Image reference the machine is currently booted into
    async fn booted_os_image_url(&self) -> UpdaterResult<String>;

    /// Switch the base image to `target`. Takes effect on the next boot.
    async fn run_pivot(&self, target: &str) -> UpdaterResult<()>;
}
