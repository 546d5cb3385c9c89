//! 远端成员集合
//!
//! 本地身份从不进入集合，它是隐含的成员。

use std::collections::BTreeSet;

use serde::Serialize;

use crate::value_objects::Identity;

/// 当前会话的远端成员
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Membership {
    members: BTreeSet<Identity>,
}

/// 房间人数概览
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RosterSummary {
    /// 人类参与者数量，包含本地用户
    pub participant_count: usize,
    pub assistant_active: bool,
}

impl Membership {
    pub fn new() -> Self {
        Self::default()
    }

    /// 用传输层快照重建集合
    pub fn reset<I>(&mut self, snapshot: I, local: &Identity)
    where
        I: IntoIterator<Item = Identity>,
    {
        self.members = snapshot.into_iter().filter(|id| id != local).collect();
    }

    /// 返回是否为新成员
    pub fn insert(&mut self, identity: Identity) -> bool {
        self.members.insert(identity)
    }

    pub fn remove(&mut self, identity: &Identity) -> bool {
        self.members.remove(identity)
    }

    pub fn contains(&self, identity: &Identity) -> bool {
        self.members.contains(identity)
    }

    pub fn clear(&mut self) {
        self.members.clear();
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Identity> {
        self.members.iter()
    }

    pub fn to_vec(&self) -> Vec<Identity> {
        self.members.iter().cloned().collect()
    }

    pub fn summary(&self, assistant: &Identity) -> RosterSummary {
        let assistant_active = self.members.contains(assistant);
        let humans = self.members.len() - usize::from(assistant_active);
        RosterSummary {
            participant_count: humans + 1,
            assistant_active,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(name: &str) -> Identity {
        Identity::parse(name).unwrap()
    }

    #[test]
    fn reset_drops_local_identity() {
        let mut membership = Membership::new();
        membership.reset(vec![id("alice"), id("bob")], &id("alice"));
        assert_eq!(membership.to_vec(), vec![id("bob")]);
    }

    #[test]
    fn summary_counts_local_user_and_excludes_assistant() {
        let mut membership = Membership::new();
        membership.insert(id("bob"));
        membership.insert(id("AI-Assistant"));

        let summary = membership.summary(&id("AI-Assistant"));
        assert_eq!(summary.participant_count, 2);
        assert!(summary.assistant_active);
    }

    #[test]
    fn duplicate_join_is_idempotent() {
        let mut membership = Membership::new();
        assert!(membership.insert(id("bob")));
        assert!(!membership.insert(id("bob")));
        assert!(membership.remove(&id("bob")));
        assert!(membership.is_empty());
    }
}
