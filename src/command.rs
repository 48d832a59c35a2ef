//! Commands that flow through the replicated log.
//!
//! A command is either an ordinary application write or one of the two
//! membership changes. Membership rides the log so that the log-matching and
//! leader-completeness invariants cover cluster reconfiguration too.
//! Reads never enter the log; they are served locally from the store.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    /// Application write replicated to every state machine.
    Put { key: String, value: i64 },
    /// Admit a new replica; followers connect to `addr` when they append this.
    AddServer { id: u64, addr: String },
    /// Retire a replica from the peer set.
    RemoveServer { id: u64 },
}

/// One slot of the replicated log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub term: u64,
    pub command: Command,
}

/// Record delivered on the commit channel once an entry is committed.
///
/// `index` is the entry's 1-based log position and is strictly increasing per
/// replica; `term` is the replica's current term at delivery time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitEntry {
    pub command: Command,
    pub term: u64,
    pub index: u64,
}
