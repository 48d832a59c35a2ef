//! RPC argument and reply types, plus the wire envelopes that carry them.
//!
//! Every request and reply carries `term`; receivers apply the step-down rule
//! before any other processing. The `Request`/`Response` enums are what
//! actually travels in a frame, so one listener can dispatch all five methods.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::command::LogEntry;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestVoteArgs {
    pub term: u64,
    pub candidate_id: u64,
    pub last_log_index: u64,
    pub last_log_term: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestVoteReply {
    pub term: u64,
    pub vote_granted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppendEntriesArgs {
    pub term: u64,
    pub leader_id: u64,
    /// Index of the entry immediately preceding `entries` (0 when sending
    /// from the very start of the log).
    pub last_log_index: u64,
    pub last_log_term: u64,
    pub entries: Vec<LogEntry>,
    pub leader_commit: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppendEntriesReply {
    pub term: u64,
    pub success: bool,
    /// On failure: the index the leader should retry from.
    pub recovery_index: u64,
    /// On failure: the conflicting term at `last_log_index`, or 0 when the
    /// follower's log is simply too short.
    pub recovery_term: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinClusterArgs {
    pub server_id: u64,
    pub server_addr: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JoinClusterReply {
    pub success: bool,
    pub leader_id: u64,
    pub term: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchPeerListArgs {
    /// The term the joiner learned from `JoinCluster`; the leader answers
    /// only while it still leads that term.
    pub term: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FetchPeerListReply {
    pub success: bool,
    pub term: u64,
    pub peer_set: HashSet<u64>,
    pub peer_address: HashMap<u64, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaveClusterArgs {
    pub server_id: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LeaveClusterReply {
    pub success: bool,
}

/// One inbound frame: which method, with which arguments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Request {
    RequestVote(RequestVoteArgs),
    AppendEntries(AppendEntriesArgs),
    JoinCluster(JoinClusterArgs),
    FetchPeerList(FetchPeerListArgs),
    LeaveCluster(LeaveClusterArgs),
}

/// One outbound frame: the matching reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Response {
    RequestVote(RequestVoteReply),
    AppendEntries(AppendEntriesReply),
    JoinCluster(JoinClusterReply),
    FetchPeerList(FetchPeerListReply),
    LeaveCluster(LeaveClusterReply),
}
