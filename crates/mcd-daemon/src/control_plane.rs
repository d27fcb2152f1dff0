//! Tuning applied to control-plane nodes only
//!
//! Control-plane nodes run etcd next to everything else, so the root block
//! device is switched to an I/O scheduler that shares bandwidth fairly
//! between processes (`bfq` by default).

use crate::error::ControlPlaneError;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, instrument};

/// Sets the I/O scheduler of the device backing the root filesystem
#[derive(Debug, Clone)]
pub struct SchedulerTuner {
    sysfs: PathBuf,
    root_mount: PathBuf,
    scheduler: String,
    device: Option<PathBuf>,
}

impl SchedulerTuner {
    pub fn new(
        sysfs: impl Into<PathBuf>,
        root_mount: impl Into<PathBuf>,
        scheduler: impl Into<String>,
    ) -> Self {
        Self {
            sysfs: sysfs.into(),
            root_mount: root_mount.into(),
            scheduler: scheduler.into(),
            device: None,
        }
    }

    /// Tune the disk at `device` instead of resolving it from the root mount
    pub fn with_device(mut self, device: impl Into<PathBuf>) -> Self {
        self.device = Some(device.into());
        self
    }

    pub fn scheduler(&self) -> &str {
        &self.scheduler
    }

    /// Switch the root block device to the configured scheduler.
    ///
    /// Does nothing when the scheduler is already active.
    #[instrument(skip(self), fields(scheduler = %self.scheduler))]
    pub async fn tune_root_device_scheduler(&self) -> Result<(), ControlPlaneError> {
        let device = self.root_block_device_sysfs().await?;
        set_device_scheduler(&device, &self.scheduler).await
    }

    /// sysfs directory of the whole disk holding the root filesystem
    async fn root_block_device_sysfs(&self) -> Result<PathBuf, ControlPlaneError> {
        if let Some(device) = &self.device {
            return Ok(device.clone());
        }

        let metadata = fs::metadata(&self.root_mount)
            .await
            .map_err(|source| ControlPlaneError::Io {
                path: self.root_mount.clone(),
                source,
            })?;
        let (major, minor) = device_numbers(&metadata)?;
        block_device_dir(&self.sysfs, major, minor).await
    }
}

#[cfg(target_os = "linux")]
fn device_numbers(metadata: &std::fs::Metadata) -> Result<(u32, u32), ControlPlaneError> {
    use std::os::unix::fs::MetadataExt;

    let dev = metadata.dev() as libc::dev_t;
    Ok((libc::major(dev) as u32, libc::minor(dev) as u32))
}

#[cfg(not(target_os = "linux"))]
fn device_numbers(_metadata: &std::fs::Metadata) -> Result<(u32, u32), ControlPlaneError> {
    Err(ControlPlaneError::DeviceResolution(
        "block device lookup requires sysfs".to_string(),
    ))
}

/// Resolve `<sysfs>/dev/block/<major>:<minor>` to its disk directory.
///
/// Partitions are mapped to their parent disk, since only whole disks carry
/// a `queue/scheduler` file.
pub async fn block_device_dir(
    sysfs: &Path,
    major: u32,
    minor: u32,
) -> Result<PathBuf, ControlPlaneError> {
    let link = sysfs.join("dev/block").join(format!("{}:{}", major, minor));
    let device = fs::canonicalize(&link).await.map_err(|e| {
        ControlPlaneError::DeviceResolution(format!("{}: {}", link.display(), e))
    })?;

    if fs::try_exists(device.join("partition")).await.unwrap_or(false) {
        return device.parent().map(Path::to_path_buf).ok_or_else(|| {
            ControlPlaneError::DeviceResolution(format!(
                "partition {} has no parent device",
                device.display()
            ))
        });
    }

    Ok(device)
}

/// Name of the active scheduler in a `queue/scheduler` listing such as
/// `noop deadline [bfq] cfq`.
pub fn active_scheduler(contents: &str) -> Option<&str> {
    contents
        .split_whitespace()
        .find_map(|name| name.strip_prefix('[')?.strip_suffix(']'))
}

/// Make `scheduler` the active scheduler of the disk at `device`.
pub async fn set_device_scheduler(device: &Path, scheduler: &str) -> Result<(), ControlPlaneError> {
    let path = device.join("queue/scheduler");
    let contents = fs::read_to_string(&path)
        .await
        .map_err(|source| ControlPlaneError::Io {
            path: path.clone(),
            source,
        })?;

    if active_scheduler(&contents) == Some(scheduler) {
        debug!(device = %device.display(), "Scheduler already active");
        return Ok(());
    }

    write_scheduler(&path, scheduler).await?;

    info!(device = %device.display(), scheduler = %scheduler, "Set root block device scheduler");
    Ok(())
}

// sysfs attributes reject O_CREAT, so the existing file is opened for writing.
async fn write_scheduler(path: &Path, scheduler: &str) -> Result<(), ControlPlaneError> {
    use tokio::io::AsyncWriteExt;

    let mut file = fs::OpenOptions::new()
        .write(true)
        .truncate(true)
        .open(path)
        .await
        .map_err(|source| ControlPlaneError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    file.write_all(scheduler.as_bytes())
        .await
        .map_err(|source| ControlPlaneError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    file.flush().await.map_err(|source| ControlPlaneError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn disk_with_scheduler(contents: &str) -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("queue")).unwrap();
        std::fs::write(dir.path().join("queue/scheduler"), contents).unwrap();
        dir
    }

    fn read_scheduler(dir: &TempDir) -> String {
        std::fs::read_to_string(dir.path().join("queue/scheduler")).unwrap()
    }

    #[test]
    fn test_active_scheduler() {
        assert_eq!(active_scheduler("noop deadline [bfq] cfq\n"), Some("bfq"));
        assert_eq!(active_scheduler("[mq-deadline] kyber bfq none"), Some("mq-deadline"));
        assert_eq!(active_scheduler("none"), None);
    }

    #[tokio::test]
    async fn test_already_active_is_not_rewritten() {
        let disk = disk_with_scheduler("noop deadline [bfq] cfq\n");

        set_device_scheduler(disk.path(), "bfq").await.unwrap();
        set_device_scheduler(disk.path(), "bfq").await.unwrap();

        // A write would have replaced the listing with the bare name.
        assert_eq!(read_scheduler(&disk), "noop deadline [bfq] cfq\n");
    }

    #[tokio::test]
    async fn test_inactive_scheduler_written_verbatim() {
        let disk = disk_with_scheduler("[mq-deadline] kyber bfq none\n");

        set_device_scheduler(disk.path(), "bfq").await.unwrap();

        assert_eq!(read_scheduler(&disk), "bfq");
    }

    #[tokio::test]
    async fn test_listed_but_inactive_is_written() {
        let disk = disk_with_scheduler("[none] bfq-extra bfq\n");

        set_device_scheduler(disk.path(), "bfq").await.unwrap();

        assert_eq!(read_scheduler(&disk), "bfq");
    }

    #[tokio::test]
    async fn test_missing_scheduler_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = set_device_scheduler(dir.path(), "bfq").await.unwrap_err();
        assert!(matches!(err, ControlPlaneError::Io { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_partition_resolves_to_disk() {
        let sysfs = tempfile::tempdir().unwrap();
        let disk = sysfs.path().join("devices/virtual/block/vda");
        std::fs::create_dir_all(disk.join("vda1")).unwrap();
        std::fs::write(disk.join("vda1/partition"), "1\n").unwrap();
        std::fs::create_dir_all(sysfs.path().join("dev/block")).unwrap();
        std::os::unix::fs::symlink(disk.join("vda1"), sysfs.path().join("dev/block/252:1"))
            .unwrap();
        std::os::unix::fs::symlink(&disk, sysfs.path().join("dev/block/252:0")).unwrap();

        let from_partition = block_device_dir(sysfs.path(), 252, 1).await.unwrap();
        let from_disk = block_device_dir(sysfs.path(), 252, 0).await.unwrap();

        let expected = std::fs::canonicalize(&disk).unwrap();
        assert_eq!(from_partition, expected);
        assert_eq!(from_disk, expected);
    }

    #[tokio::test]
    async fn test_unknown_device_fails_resolution() {
        let sysfs = tempfile::tempdir().unwrap();
        let err = block_device_dir(sysfs.path(), 8, 0).await.unwrap_err();
        assert!(matches!(err, ControlPlaneError::DeviceResolution(_)));
    }
}
