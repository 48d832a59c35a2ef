//! Replicated log cluster built on the Raft consensus algorithm.
//!
//! A small cluster of cooperating replicas maintains a totally-ordered,
//! durably-committed sequence of commands with a single elected leader,
//! automatic recovery from leader crashes and partitions, and membership
//! changes that flow through the log itself.
//!
//! # Architecture
//!
//! Each replica runs a handful of native threads around one coarse mutex:
//!
//! - **Accept loop**: receives RPC frames from peers, one short-lived handler
//!   thread per connection
//! - **Election watchdog**: starts an election when the randomized timeout
//!   expires without hearing from a leader
//! - **Heartbeat loop** (leader only): replicates to every peer every 50ms,
//!   or immediately when new entries or commits arrive
//! - **Commit dispatcher**: delivers committed entries to the application in
//!   strict log order over a channel
//!
//! Crossbeam channels carry all the signalling; the node mutex is the only
//! synchronization primitive the protocol's correctness relies on.
//!
//! # Modules
//!
//! - [`node`]: the Raft state machine (elections, replication, commits)
//! - [`server`]: listener, RPC dispatch, and the join/leave client flows
//! - [`transport`]: framed request/reply calls between replicas
//! - [`store`]: byte-keyed store for Raft metadata and application state
//! - [`command`]: commands, log entries, and commit records
//! - [`message`]: RPC argument/reply types and wire envelopes
//! - [`peers`]: the cluster membership set
//! - [`protocol`]: shell command parsing for the CLI

pub mod command;
pub mod error;
pub mod message;
pub mod node;
pub mod peers;
pub mod protocol;
pub mod server;
pub mod store;
pub mod transport;

pub use command::{Command, CommitEntry, LogEntry};
pub use error::Error;
pub use node::{Config, Node, Role};
pub use server::{Server, ServerConfig};
pub use store::Store;
pub use transport::Transport;
