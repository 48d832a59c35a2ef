//! The set of replica ids a node believes constitute the cluster.
//!
//! After the initial configuration this set changes only when `AddServer` /
//! `RemoveServer` entries enter the log. The set has no lock of its own; it
//! lives inside the node state and is guarded by the node mutex.

use std::collections::HashSet;

#[derive(Debug, Clone, Default)]
pub struct PeerSet {
    ids: HashSet<u64>,
}

impl PeerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: u64) {
        self.ids.insert(id);
    }

    pub fn remove(&mut self, id: u64) {
        self.ids.remove(&id);
    }

    pub fn contains(&self, id: u64) -> bool {
        self.ids.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = u64> + '_ {
        self.ids.iter().copied()
    }

    pub fn to_set(&self) -> HashSet<u64> {
        self.ids.clone()
    }
}

impl FromIterator<u64> for PeerSet {
    fn from_iter<I: IntoIterator<Item = u64>>(iter: I) -> Self {
        Self {
            ids: iter.into_iter().collect(),
        }
    }
}
