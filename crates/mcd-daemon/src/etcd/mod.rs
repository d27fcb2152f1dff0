//! etcd leadership tracking
//!
//! Control-plane nodes follow which etcd member is leading. The watcher polls
//! the local member over TLS and publishes a [`LeaderEvent`] whenever the
//! leader's name changes.
//!
//! [`LeaderEvent`]: mcd_types::LeaderEvent

mod client;
#[cfg(any(test, feature = "test-utils"))]
mod mock;
mod watcher;

pub use client::{EtcdMembershipClient, Member, MembershipClient, MembershipSnapshot};
#[cfg(any(test, feature = "test-utils"))]
pub use mock::ScriptedMembershipClient;
pub use watcher::{watch_current_leader, LeaderWatch, LeaderWatcher};
