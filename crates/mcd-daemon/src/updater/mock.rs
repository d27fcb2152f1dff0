//! Scripted node-updater client for tests

use super::NodeUpdaterClient;
use crate::error::{UpdaterError, UpdaterResult};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Returns pre-programmed results, one per call, in call order.
///
/// Calling a method whose script is exhausted yields an error naming the
/// method, so an unexpected call fails the test instead of hanging it.
#[derive(Debug, Default)]
pub struct ScriptedUpdaterClient {
    booted_returns: Mutex<VecDeque<UpdaterResult<String>>>,
    pivot_returns: Mutex<VecDeque<UpdaterResult<()>>>,
    booted_calls: AtomicUsize,
    pivot_calls: AtomicUsize,
    pivot_targets: Mutex<Vec<String>>,
}

impl ScriptedUpdaterClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_booted_returns(
        self,
        returns: impl IntoIterator<Item = UpdaterResult<String>>,
    ) -> Self {
        self.booted_returns
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend(returns);
        self
    }

    pub fn with_pivot_returns(self, returns: impl IntoIterator<Item = UpdaterResult<()>>) -> Self {
        self.pivot_returns
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend(returns);
        self
    }

    pub fn booted_calls(&self) -> usize {
        self.booted_calls.load(Ordering::SeqCst)
    }

    pub fn pivot_calls(&self) -> usize {
        self.pivot_calls.load(Ordering::SeqCst)
    }

    /// Targets passed to `run_pivot`, in call order
    pub fn pivot_targets(&self) -> Vec<String> {
        self.pivot_targets
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl NodeUpdaterClient for ScriptedUpdaterClient {
    async fn booted_os_image_url(&self) -> UpdaterResult<String> {
        self.booted_calls.fetch_add(1, Ordering::SeqCst);
        self.booted_returns
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or_else(|| {
                Err(UpdaterError::Query(
                    "unscripted call to booted_os_image_url".to_string(),
                ))
            })
    }

    async fn run_pivot(&self, target: &str) -> UpdaterResult<()> {
        self.pivot_calls.fetch_add(1, Ordering::SeqCst);
        self.pivot_targets
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(target.to_string());
        self.pivot_returns
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or_else(|| Err(UpdaterError::Pivot("unscripted call to run_pivot".to_string())))
    }
}
