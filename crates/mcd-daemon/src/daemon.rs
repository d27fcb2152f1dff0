//! Per-node control loop
//!
//! The [`Daemon`] owns everything one node agent needs: its identity and
//! role, the detected OS family, the node-updater client and the state
//! reporter. Each configuration change is handled to completion before the
//! next one is looked at:
//!
//! 1. classify the change; unreconcilable changes are handed back untouched
//! 2. enter `Working`
//! 3. bring the OS image in line
//! 4. enter `Done` or `Degraded`
//!
//! On control-plane nodes, leader changes observed by the etcd watcher
//! re-apply the root device scheduler.

use crate::config::{DaemonConfig, EtcdConfig};
use crate::control_plane::SchedulerTuner;
use crate::error::{ControlPlaneError, DaemonResult, UpdaterError, UpdaterResult};
use crate::etcd::{watch_current_leader, LeaderWatch};
use crate::reconcile::{classify, ReconcileVerdict};
use crate::source::{self, ConfigOrigin};
use crate::state::StateReporter;
use crate::storage::NodeMetadataStore;
use crate::update;
use crate::updater::NodeUpdaterClient;
use mcd_types::{DaemonState, LeaderEvent, MachineConfig, NodeRole, OperatingSystem};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, error, info, instrument, warn};

/// An observed old → new configuration pair
#[derive(Debug, Clone)]
pub struct ConfigChange {
    pub old: MachineConfig,
    pub new: MachineConfig,
}

impl ConfigChange {
    pub fn new(old: MachineConfig, new: MachineConfig) -> Self {
        Self { old, new }
    }
}

/// How an attempt ended
#[derive(Debug)]
pub enum ApplyOutcome {
    /// The change cannot be applied in place. No state was written.
    RebootRequired { reason: String },

    /// The node runs the new config
    Done,

    /// The OS update failed and the node is marked degraded
    Degraded(UpdaterError),
}

impl ApplyOutcome {
    pub fn is_done(&self) -> bool {
        matches!(self, ApplyOutcome::Done)
    }
}

/// Node agent
pub struct Daemon {
    name: String,
    operating_system: OperatingSystem,
    role: NodeRole,
    booted_os_image_url: String,
    root_mount: PathBuf,
    current_config_path: PathBuf,
    updater: Arc<dyn NodeUpdaterClient>,
    state: StateReporter,
    tuner: SchedulerTuner,
    etcd: EtcdConfig,
}

impl Daemon {
    pub fn new(
        config: &DaemonConfig,
        operating_system: OperatingSystem,
        updater: Arc<dyn NodeUpdaterClient>,
        store: Arc<dyn NodeMetadataStore>,
    ) -> Self {
        let mut tuner = SchedulerTuner::new(
            &config.paths.sysfs,
            &config.node.root_mount,
            &config.control_plane.scheduler,
        );
        if let Some(device) = &config.control_plane.device {
            tuner = tuner.with_device(device);
        }

        Self {
            name: config.node.name.clone(),
            operating_system,
            role: config.node.role,
            booted_os_image_url: String::new(),
            root_mount: config.node.root_mount.clone(),
            current_config_path: config.paths.current_config.clone(),
            updater,
            state: StateReporter::new(&config.node.name, store, &config.state),
            tuner,
            etcd: config.etcd.clone(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn role(&self) -> NodeRole {
        self.role
    }

    pub fn operating_system(&self) -> &OperatingSystem {
        &self.operating_system
    }

    /// Image reference queried at initialization; empty off RHCOS
    pub fn booted_os_image_url(&self) -> &str {
        &self.booted_os_image_url
    }

    pub fn root_mount(&self) -> &Path {
        &self.root_mount
    }

    /// Publish the clean state for a new node and learn the booted image.
    pub async fn initialize(&mut self) -> DaemonResult<DaemonState> {
        let state = self.state.ensure_initialized().await?;

        if self.operating_system.supports_pivot() {
            self.booted_os_image_url = self.updater.booted_os_image_url().await?;
        }

        info!(
            node = %self.name,
            os = %self.operating_system,
            role = ?self.role,
            booted = %self.booted_os_image_url,
            state = %state,
            "Daemon initialized"
        );
        Ok(state)
    }

    pub fn reconcilable(&self, old: &MachineConfig, new: &MachineConfig) -> ReconcileVerdict {
        classify(old, new)
    }

    pub async fn update_os(&self, old: &MachineConfig, new: &MachineConfig) -> UpdaterResult<()> {
        update::update_os(self.updater.as_ref(), old, new).await
    }

    /// Run one update attempt for `change`.
    ///
    /// An orchestrator failure is a normal outcome (`Degraded`); only a
    /// failure to record state or to persist the applied config is an error.
    #[instrument(skip(self, change), fields(node = %self.name, desired = %change.new.name()))]
    pub async fn apply(&self, change: &ConfigChange) -> DaemonResult<ApplyOutcome> {
        if let ReconcileVerdict::NotReconcilable(reason) =
            self.reconcilable(&change.old, &change.new)
        {
            info!(reason = %reason, "Change is not reconcilable, reboot required");
            return Ok(ApplyOutcome::RebootRequired { reason });
        }

        self.state.begin(change.new.name()).await?;

        let result = self.update_os(&change.old, &change.new).await;
        if let Err(e) = &result {
            error!(error = %e, "OS update failed");
        }

        self.state.finish(change.new.name(), &result).await?;

        match result {
            Ok(()) => {
                source::store_current(&self.current_config_path, &change.new).await?;
                debug!(path = %self.current_config_path.display(), "Persisted current config");
                Ok(ApplyOutcome::Done)
            }
            Err(e) => Ok(ApplyOutcome::Degraded(e)),
        }
    }

    /// Apply the config found at `origin` on top of the persisted current
    /// config.
    pub async fn apply_from(&self, origin: &ConfigOrigin) -> DaemonResult<ApplyOutcome> {
        let desired = source::load(origin).await?;
        let current = source::load_current(&self.current_config_path).await?;

        self.apply(&ConfigChange::new(current, desired.config)).await
    }

    /// Re-apply control-plane tuning. Worker nodes have none.
    pub async fn synchronize_control_plane_state(&self) -> Result<(), ControlPlaneError> {
        if !self.role.is_control_plane() {
            return Ok(());
        }
        self.tuner.tune_root_device_scheduler().await
    }

    /// Start the etcd leader watcher on control-plane nodes.
    ///
    /// A watcher that cannot connect is logged and skipped; tuning is then
    /// only applied once at startup.
    pub async fn start_leader_watch(
        &self,
        shutdown: watch::Receiver<bool>,
    ) -> Option<LeaderWatch> {
        if !self.role.is_control_plane() {
            return None;
        }

        match watch_current_leader(&self.etcd, shutdown).await {
            Ok(watch) => Some(watch),
            Err(e) => {
                error!(
                    endpoint = %self.etcd.endpoint,
                    error = %e,
                    "Failed to start etcd leader watcher"
                );
                if let Err(e) = self.synchronize_control_plane_state().await {
                    error!(error = %e, "Failed to synchronize control plane state");
                }
                None
            }
        }
    }

    /// Process changes one at a time until the change channel closes or
    /// shutdown is signalled.
    pub async fn run(
        self,
        mut changes: mpsc::Receiver<ConfigChange>,
        mut leader_events: Option<broadcast::Receiver<LeaderEvent>>,
        mut shutdown: watch::Receiver<bool>,
    ) -> DaemonResult<()> {
        info!(node = %self.name, "Starting control loop");

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                change = changes.recv() => {
                    let Some(change) = change else {
                        info!("Change channel closed");
                        break;
                    };
                    match self.apply(&change).await {
                        Ok(outcome) => debug!(outcome = ?outcome, "Attempt finished"),
                        Err(e) => error!(error = %e, "Update attempt failed"),
                    }
                }
                event = next_leader_event(&mut leader_events) => {
                    match event {
                        Ok(event) => {
                            info!(
                                leader = %event.leader,
                                observed_at = %event.observed_at,
                                "Leader changed, synchronizing control plane state"
                            );
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(
                                skipped = skipped,
                                "Missed leader events, synchronizing control plane state"
                            );
                        }
                        Err(RecvError::Closed) => {
                            debug!("Leader watcher stopped");
                            leader_events = None;
                            continue;
                        }
                    }
                    if let Err(e) = self.synchronize_control_plane_state().await {
                        error!(error = %e, "Failed to synchronize control plane state");
                    }
                }
                _ = shutdown.changed() => {}
            }

            if shutdown.has_changed().is_err() {
                break;
            }
        }

        info!(node = %self.name, "Control loop stopped");
        Ok(())
    }
}

// Pends forever once there is no watcher.
async fn next_leader_event(
    events: &mut Option<broadcast::Receiver<LeaderEvent>>,
) -> Result<LeaderEvent, RecvError> {
    match events {
        Some(events) => events.recv().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DaemonError, SourceError};
    use crate::storage::InMemoryNodeStore;
    use crate::updater::ScriptedUpdaterClient;
    use mcd_types::annotations::{CURRENT_CONFIG_ANNOTATION, DEGRADED_LABEL, STATE_ANNOTATION};
    use std::time::Duration;
    use tempfile::TempDir;

    struct Fixture {
        dir: TempDir,
        store: Arc<InMemoryNodeStore>,
        updater: Arc<ScriptedUpdaterClient>,
        daemon: Daemon,
    }

    fn fixture(role: NodeRole, updater: ScriptedUpdaterClient) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("disk/queue")).unwrap();
        std::fs::write(
            dir.path().join("disk/queue/scheduler"),
            "[mq-deadline] kyber bfq none\n",
        )
        .unwrap();

        let mut config = DaemonConfig::default();
        config.node.name = "node-a".to_string();
        config.node.role = role;
        config.paths.current_config = dir.path().join("etc/currentconfig");
        config.control_plane.device = Some(dir.path().join("disk"));
        config.state.write_backoff_ms = 0;

        let store = Arc::new(InMemoryNodeStore::new());
        let updater = Arc::new(updater);
        let daemon = Daemon::new(&config, OperatingSystem::Rhcos, updater.clone(), store.clone());

        Fixture {
            dir,
            store,
            updater,
            daemon,
        }
    }

    fn change(old_image: &str, new_image: &str) -> ConfigChange {
        ConfigChange::new(
            MachineConfig::new("rendered-1").with_os_image_url(old_image),
            MachineConfig::new("rendered-2").with_os_image_url(new_image),
        )
    }

    async fn published(store: &InMemoryNodeStore) -> (Option<String>, Option<String>) {
        let metadata = store.get_node("node-a").await.unwrap().unwrap_or_default();
        (
            metadata.annotation(STATE_ANNOTATION).map(str::to_string),
            metadata.label(DEGRADED_LABEL).map(str::to_string),
        )
    }

    fn scheduler(dir: &TempDir) -> String {
        std::fs::read_to_string(dir.path().join("disk/queue/scheduler")).unwrap()
    }

    #[tokio::test]
    async fn test_initialize_records_clean_state_and_booted_image() {
        let updater = ScriptedUpdaterClient::new().with_booted_returns([Ok("image-a".to_string())]);
        let mut f = fixture(NodeRole::Worker, updater);

        assert_eq!(f.daemon.initialize().await.unwrap(), DaemonState::Done);

        assert_eq!(f.daemon.booted_os_image_url(), "image-a");
        assert_eq!(
            published(&f.store).await,
            (Some("Done".to_string()), Some("false".to_string()))
        );
    }

    #[tokio::test]
    async fn test_successful_pivot_ends_done() {
        let updater = ScriptedUpdaterClient::new()
            .with_booted_returns([Ok("image-a".to_string())])
            .with_pivot_returns([Ok(())]);
        let f = fixture(NodeRole::Worker, updater);

        let outcome = f.daemon.apply(&change("image-a", "image-b")).await.unwrap();

        assert!(outcome.is_done());
        assert_eq!(f.updater.pivot_targets(), vec!["image-b"]);
        assert_eq!(
            published(&f.store).await,
            (Some("Done".to_string()), Some("false".to_string()))
        );
        let metadata = f.store.get_node("node-a").await.unwrap().unwrap();
        assert_eq!(metadata.annotation(CURRENT_CONFIG_ANNOTATION), Some("rendered-2"));

        let stored = source::load_current(&f.dir.path().join("etc/currentconfig")).await.unwrap();
        assert_eq!(stored.name(), "rendered-2");
    }

    #[tokio::test]
    async fn test_failed_pivot_ends_degraded() {
        let updater = ScriptedUpdaterClient::new()
            .with_booted_returns([Ok("image-a".to_string())])
            .with_pivot_returns([Err(UpdaterError::Pivot("exit status 1".to_string()))]);
        let f = fixture(NodeRole::Worker, updater);

        let outcome = f.daemon.apply(&change("image-a", "image-b")).await.unwrap();

        match outcome {
            ApplyOutcome::Degraded(e) => {
                assert_eq!(e, UpdaterError::Pivot("exit status 1".to_string()))
            }
            other => panic!("expected Degraded, got {:?}", other),
        }
        assert_eq!(
            published(&f.store).await,
            (Some("Degraded".to_string()), Some("true".to_string()))
        );
        assert!(!f.dir.path().join("etc/currentconfig").exists());
    }

    #[tokio::test]
    async fn test_unreconcilable_change_leaves_state_alone() {
        let f = fixture(NodeRole::Worker, ScriptedUpdaterClient::new());
        let mut change = change("image-a", "image-b");
        change.new = change.new.with_ignition_version("3.0.0");

        let outcome = f.daemon.apply(&change).await.unwrap();

        match outcome {
            ApplyOutcome::RebootRequired { reason } => assert_eq!(reason, "ignition version"),
            other => panic!("expected RebootRequired, got {:?}", other),
        }
        assert_eq!(f.updater.booted_calls(), 0);
        assert_eq!(f.updater.pivot_calls(), 0);
        assert_eq!(f.store.write_count(), 0);
    }

    #[tokio::test]
    async fn test_state_write_failure_aborts_before_update() {
        let f = fixture(NodeRole::Worker, ScriptedUpdaterClient::new());
        f.store.fail_next_writes(3);

        let err = f.daemon.apply(&change("image-a", "image-b")).await.unwrap_err();

        assert!(matches!(
            err,
            DaemonError::StateWrite {
                state: DaemonState::Working,
                ..
            }
        ));
        assert_eq!(f.updater.booted_calls(), 0);
    }

    #[tokio::test]
    async fn test_worker_skips_control_plane_tuning() {
        let f = fixture(NodeRole::Worker, ScriptedUpdaterClient::new());

        f.daemon.synchronize_control_plane_state().await.unwrap();

        assert_eq!(scheduler(&f.dir), "[mq-deadline] kyber bfq none\n");
        assert!(f.daemon.start_leader_watch(watch::channel(false).1).await.is_none());
    }

    #[tokio::test]
    async fn test_control_plane_tunes_scheduler() {
        let f = fixture(NodeRole::ControlPlane, ScriptedUpdaterClient::new());

        f.daemon.synchronize_control_plane_state().await.unwrap();

        assert_eq!(scheduler(&f.dir), "bfq");
    }

    #[tokio::test]
    async fn test_run_applies_changes_and_reacts_to_leader_events() {
        let updater = ScriptedUpdaterClient::new()
            .with_booted_returns([Ok("image-b".to_string())]);
        let f = fixture(NodeRole::ControlPlane, updater);
        let Fixture {
            dir,
            store,
            updater,
            daemon,
        } = f;

        let (change_tx, change_rx) = mpsc::channel(4);
        let (leader_tx, leader_rx) = broadcast::channel(4);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(daemon.run(change_rx, Some(leader_rx), shutdown_rx));

        change_tx.send(change("image-a", "image-b")).await.unwrap();
        leader_tx.send(LeaderEvent::new("etcd-0")).unwrap();

        let mut synced = false;
        for _ in 0..200 {
            let done = published(&store).await.0.as_deref() == Some("Done");
            if done && scheduler(&dir) == "bfq" {
                synced = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(synced, "change and leader event were not both handled");
        assert_eq!(updater.pivot_calls(), 0);

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_run_retunes_after_missing_leader_events() {
        let f = fixture(NodeRole::ControlPlane, ScriptedUpdaterClient::new());
        let Fixture { dir, daemon, .. } = f;

        // Overrun the channel before the loop reads anything.
        let (leader_tx, leader_rx) = broadcast::channel(1);
        for leader in ["etcd-0", "etcd-1", "etcd-2"] {
            leader_tx.send(LeaderEvent::new(leader)).unwrap();
        }

        let (_change_tx, change_rx) = mpsc::channel(1);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(daemon.run(change_rx, Some(leader_rx), shutdown_rx));

        let mut tuned = false;
        for _ in 0..200 {
            if scheduler(&dir) == "bfq" {
                tuned = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(tuned, "scheduler was not rewritten after lagging");

        shutdown_tx.send(true).unwrap();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_apply_from_local_file() {
        let updater = ScriptedUpdaterClient::new()
            .with_booted_returns([Ok("image-a".to_string())])
            .with_pivot_returns([Ok(())]);
        let f = fixture(NodeRole::Worker, updater);
        let path = f.dir.path().join("desired.json");
        let desired = MachineConfig::new("rendered-3").with_os_image_url("image-b");
        std::fs::write(&path, serde_json::to_vec(&desired).unwrap()).unwrap();

        let outcome = f.daemon.apply_from(&ConfigOrigin::Local(path)).await.unwrap();

        assert!(outcome.is_done());
        assert_eq!(f.updater.pivot_targets(), vec!["image-b"]);
        let stored = source::load_current(&f.dir.path().join("etc/currentconfig"))
            .await
            .unwrap();
        assert_eq!(stored.name(), "rendered-3");
    }

    #[tokio::test]
    async fn test_apply_from_missing_file_is_source_error() {
        let f = fixture(NodeRole::Worker, ScriptedUpdaterClient::new());
        let origin = ConfigOrigin::Local(f.dir.path().join("missing.json"));

        let err = f.daemon.apply_from(&origin).await.unwrap_err();

        assert!(matches!(err, DaemonError::Source(SourceError::Read { .. })));
        assert_eq!(f.store.write_count(), 0);
    }

    #[tokio::test]
    async fn test_run_stops_when_changes_close() {
        let f = fixture(NodeRole::Worker, ScriptedUpdaterClient::new());
        let (change_tx, change_rx) = mpsc::channel(1);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        drop(change_tx);

        f.daemon.run(change_rx, None, shutdown_rx).await.unwrap();
    }
}
