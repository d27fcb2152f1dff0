//! Scripted membership client for tests

use super::{Member, MembershipClient, MembershipSnapshot};
use crate::error::EtcdError;
use async_trait::async_trait;
use std::collections::VecDeque;

/// Replays a fixed sequence of membership results, then fails every call.
#[derive(Debug, Default)]
pub struct ScriptedMembershipClient {
    script: VecDeque<Result<MembershipSnapshot, EtcdError>>,
}

impl ScriptedMembershipClient {
    pub fn new(script: impl IntoIterator<Item = Result<MembershipSnapshot, EtcdError>>) -> Self {
        Self {
            script: script.into_iter().collect(),
        }
    }

    /// Snapshots in which the named members lead, in order
    pub fn with_leaders<'a>(leaders: impl IntoIterator<Item = &'a str>) -> Self {
        Self::new(leaders.into_iter().map(|name| Ok(Self::led_by(name))))
    }

    /// A three-member snapshot led by `name`
    pub fn led_by(name: &str) -> MembershipSnapshot {
        let mut members: Vec<Member> = ["a", "b", "c"]
            .iter()
            .enumerate()
            .map(|(i, n)| Member {
                id: i as u64 + 1,
                name: n.to_string(),
            })
            .collect();
        let leader_id = match members.iter().find(|m| m.name == name) {
            Some(member) => member.id,
            None => {
                members.push(Member {
                    id: 100,
                    name: name.to_string(),
                });
                100
            }
        };
        MembershipSnapshot { leader_id, members }
    }
}

#[async_trait]
impl MembershipClient for ScriptedMembershipClient {
    async fn membership(&mut self) -> Result<MembershipSnapshot, EtcdError> {
        self.script
            .pop_front()
            .unwrap_or_else(|| Err(EtcdError::Query("script exhausted".to_string())))
    }
}
