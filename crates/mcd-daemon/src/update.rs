//! OS image update orchestration

use crate::error::UpdaterResult;
use crate::updater::NodeUpdaterClient;
use mcd_types::MachineConfig;
use tracing::{debug, info};

/// Bring the machine's OS image in line with `new`.
///
/// No client call is made when the image reference did not change between
/// the two configs, and no pivot is run when the machine already booted the
/// target. Errors from the client are returned as-is; retrying is left to
/// the caller.
pub async fn update_os(
    client: &dyn NodeUpdaterClient,
    old: &MachineConfig,
    new: &MachineConfig,
) -> UpdaterResult<()> {
    let target = new.os_image_url();

    if old.os_image_url() == target {
        debug!("OS image unchanged, skipping update");
        return Ok(());
    }

    let booted = client.booted_os_image_url().await?;
    if booted == target {
        info!(image = %target, "Already booted into target OS image");
        return Ok(());
    }

    info!(from = %booted, to = %target, "Updating OS image");
    client.run_pivot(target).await
}
