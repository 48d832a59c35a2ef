//! Error types for cluster operations.
//!
//! Transport failures are transient (the next heartbeat retries), protocol
//! rejections are normal operation, and codec failures on persisted state are
//! fatal for the replica. Callers that need context wrap these in `anyhow`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The contacted node is not the leader; carries its id and term so the
    /// caller can report or redirect.
    #[error("node {id} is not the leader (current term {term})")]
    NotLeader { id: u64, term: u64 },

    /// Local read of a key the state machine has never applied.
    #[error("key not found: {0}")]
    KeyNotFound(String),

    /// Outbound call to a peer with no recorded connection.
    #[error("peer {0} is not connected")]
    PeerDisconnected(u64),

    /// A replica may not remove itself from the cluster.
    #[error("server {0} cannot remove itself from the cluster")]
    CannotRemoveSelf(u64),

    /// Removal target is not a known cluster member.
    #[error("server {0} is not a cluster member")]
    NotMember(u64),

    /// A node cannot join a cluster through itself.
    #[error("cannot join own cluster")]
    JoinOwnCluster,

    /// The join target did not identify as a usable leader.
    #[error("invalid leader id {0}")]
    InvalidLeader(u64),

    /// The peer answered with a reply of the wrong method.
    #[error("unexpected rpc response")]
    UnexpectedResponse,

    #[error("transport: {0}")]
    Io(#[from] std::io::Error),

    /// Encode/decode failure. Fatal when it concerns persisted Raft state.
    #[error("codec: {0}")]
    Codec(#[from] bincode::Error),
}
