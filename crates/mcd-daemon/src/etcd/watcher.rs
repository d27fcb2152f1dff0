//! Leader change watcher

use super::client::{EtcdMembershipClient, MembershipClient};
use crate::config::EtcdConfig;
use crate::error::EtcdError;
use mcd_types::LeaderEvent;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Handle to a running watcher
pub struct LeaderWatch {
    /// Leader changes. Capacity is bounded: a consumer that falls behind
    /// loses the oldest events and sees `RecvError::Lagged`.
    pub events: broadcast::Receiver<LeaderEvent>,

    /// Completes once the watcher observed shutdown
    pub handle: JoinHandle<()>,
}

/// Polls membership and publishes leader changes
pub struct LeaderWatcher<C> {
    client: C,
    poll_interval: Duration,
    backoff_interval: Duration,
    last_leader: Option<String>,
    events: broadcast::Sender<LeaderEvent>,
    shutdown: watch::Receiver<bool>,
}

/// Connect to etcd and start watching its leader.
///
/// Connection failures are returned; failures after startup are logged and
/// retried by the watcher.
pub async fn watch_current_leader(
    config: &EtcdConfig,
    shutdown: watch::Receiver<bool>,
) -> Result<LeaderWatch, EtcdError> {
    let client = EtcdMembershipClient::connect(config).await?;
    LeaderWatcher::spawn(client, config, shutdown).await
}

impl<C: MembershipClient> LeaderWatcher<C> {
    /// Check that membership can be listed, then poll in a background task.
    pub async fn spawn(
        mut client: C,
        config: &EtcdConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Result<LeaderWatch, EtcdError> {
        client.membership().await.map_err(|e| {
            EtcdError::Connection(format!("membership unavailable on {}: {}", config.endpoint, e))
        })?;

        let (events, receiver) = broadcast::channel(config.event_buffer.max(1));
        let watcher = Self {
            client,
            poll_interval: config.poll_interval(),
            backoff_interval: config.backoff_interval(),
            last_leader: None,
            events,
            shutdown,
        };

        Ok(LeaderWatch {
            events: receiver,
            handle: tokio::spawn(watcher.run()),
        })
    }

    async fn run(mut self) {
        info!("Watching etcd leader");

        loop {
            if *self.shutdown.borrow() {
                break;
            }

            let delay = self.poll().await;

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                // A dropped sender also ends the watcher.
                _ = self.shutdown.changed() => {}
            }
            if self.shutdown.has_changed().is_err() {
                break;
            }
        }

        info!("Stopped watching etcd leader");
    }

    /// One membership cycle; returns the delay before the next one.
    async fn poll(&mut self) -> Duration {
        let snapshot = match self.client.membership().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                error!(error = %e, "Failed to get etcd membership");
                return self.backoff_interval;
            }
        };

        match snapshot.leader_name() {
            None => {
                warn!(leader_id = snapshot.leader_id, "Failed to find leader id in member list");
            }
            Some(name) if self.last_leader.as_deref() != Some(name) => {
                info!(leader = %name, previous = ?self.last_leader, "etcd leader changed");
                self.last_leader = Some(name.to_string());
                // No receivers is not an error; the change is still recorded.
                let _ = self.events.send(LeaderEvent::new(name));
            }
            Some(_) => {}
        }

        self.poll_interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::etcd::{Member, MembershipSnapshot, ScriptedMembershipClient};
    use tokio::sync::broadcast::error::RecvError;

    fn config() -> EtcdConfig {
        EtcdConfig {
            poll_interval_secs: 30,
            backoff_interval_secs: 10,
            event_buffer: 16,
            ..Default::default()
        }
    }

    async fn collect(watch: &mut LeaderWatch, count: usize) -> Vec<String> {
        let mut names = Vec::new();
        for _ in 0..count {
            let event = watch.events.recv().await.unwrap();
            names.push(event.leader);
        }
        names
    }

    async fn assert_no_more_events(watch: &mut LeaderWatch) {
        let next = tokio::time::timeout(Duration::from_secs(600), watch.events.recv()).await;
        assert!(next.is_err(), "unexpected event: {:?}", next);
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_leaders_suppressed() {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        // The first snapshot validates the connection.
        let client = ScriptedMembershipClient::with_leaders(["a", "a", "a", "b", "b", "a"]);

        let mut watch = LeaderWatcher::spawn(client, &config(), shutdown_rx).await.unwrap();

        assert_eq!(collect(&mut watch, 3).await, vec!["a", "b", "a"]);
        assert_no_more_events(&mut watch).await;

        shutdown_tx.send(true).unwrap();
        watch.handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_query_failures_and_unknown_leader_skipped() {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let unknown = MembershipSnapshot {
            leader_id: 42,
            members: vec![Member {
                id: 1,
                name: "a".to_string(),
            }],
        };
        let client = ScriptedMembershipClient::new([
            Ok(ScriptedMembershipClient::led_by("a")),
            Ok(ScriptedMembershipClient::led_by("a")),
            Err(EtcdError::Query("unavailable".to_string())),
            Ok(unknown),
            Ok(ScriptedMembershipClient::led_by("a")),
            Ok(ScriptedMembershipClient::led_by("c")),
        ]);

        let mut watch = LeaderWatcher::spawn(client, &config(), shutdown_rx).await.unwrap();

        assert_eq!(collect(&mut watch, 2).await, vec!["a", "c"]);
        assert_no_more_events(&mut watch).await;

        shutdown_tx.send(true).unwrap();
        watch.handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_polls_on_interval_and_backs_off() {
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let client = ScriptedMembershipClient::new([
            Ok(ScriptedMembershipClient::led_by("a")),
            Err(EtcdError::Query("unavailable".to_string())),
            Ok(ScriptedMembershipClient::led_by("a")),
            Ok(ScriptedMembershipClient::led_by("b")),
        ]);
        let start = tokio::time::Instant::now();

        let mut watch = LeaderWatcher::spawn(client, &config(), shutdown_rx).await.unwrap();

        watch.events.recv().await.unwrap();
        // failure (10s backoff), then "a" (30s poll), then "b"
        assert_eq!(watch.events.recv().await.unwrap().leader, "b");
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(40) && elapsed < Duration::from_secs(70));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_consumer_lags_then_sees_latest_leader() {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let config = EtcdConfig {
            event_buffer: 1,
            ..config()
        };
        let client = ScriptedMembershipClient::with_leaders(["a", "a", "b", "c", "d"]);

        let mut watch = LeaderWatcher::spawn(client, &config, shutdown_rx).await.unwrap();
        tokio::time::sleep(Duration::from_secs(200)).await;

        assert!(matches!(watch.events.recv().await, Err(RecvError::Lagged(_))));
        assert_eq!(watch.events.recv().await.unwrap().leader, "d");

        shutdown_tx.send(true).unwrap();
        watch.handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_initial_failure_returned() {
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let client = ScriptedMembershipClient::new([Err(EtcdError::Query("refused".to_string()))]);

        let result = LeaderWatcher::spawn(client, &config(), shutdown_rx).await;

        assert!(matches!(result, Err(EtcdError::Connection(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_interrupts_sleep() {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let client = ScriptedMembershipClient::with_leaders(["a", "a"]);
        let start = tokio::time::Instant::now();

        let mut watch = LeaderWatcher::spawn(client, &config(), shutdown_rx).await.unwrap();
        watch.events.recv().await.unwrap();

        shutdown_tx.send(true).unwrap();
        watch.handle.await.unwrap();
        assert!(start.elapsed() < Duration::from_secs(30));
    }
}
