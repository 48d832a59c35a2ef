//! Server wrapper around a consensus node.
//!
//! Owns the TCP listener and the accept loop, dispatches inbound frames to
//! the node's RPC handlers, and exposes the operations a client or test
//! harness drives: submit, read, report, membership, shutdown.
//!
//! Threading mirrors the rest of the crate: the accept loop runs on its own
//! thread and spawns a short-lived handler thread per connection; each
//! handler reads one request frame, dispatches, and writes one reply frame.

use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, info, warn};

use crate::command::{Command, CommitEntry};
use crate::error::Error;
use crate::message::{FetchPeerListArgs, JoinClusterArgs, Request, Response};
use crate::node::{Config, Node, Role};
use crate::store::Store;
use crate::transport::{read_frame, write_frame, Transport, IO_TIMEOUT};

pub struct ServerConfig {
    pub id: u64,
    /// Listen address, e.g. `127.0.0.1:0` to let the OS pick a port.
    pub listen: String,
    /// Ids of the initial cluster peers (not including this node). Later
    /// membership changes flow through the log instead.
    pub peers: Vec<u64>,
    pub raft: Config,
}

pub struct Server {
    node: Arc<Node>,
    transport: Arc<Transport>,
    store: Arc<Store>,
    listener_addr: SocketAddr,
    quit: Arc<AtomicBool>,
}

impl Server {
    /// Binds the listener, creates the node (restoring persisted state when
    /// the store has any), and starts accepting connections. The node's
    /// election timer stays parked until `ready` fires, giving the caller
    /// time to connect peers first.
    pub fn start(
        config: ServerConfig,
        store: Arc<Store>,
        ready: Receiver<()>,
        commit_tx: Sender<CommitEntry>,
    ) -> Result<Self, Error> {
        let listener = TcpListener::bind(&config.listen)?;
        let listener_addr = listener.local_addr()?;

        let transport = Arc::new(Transport::new());
        let node = Node::new(
            config.id,
            config.peers.into_iter().collect(),
            Arc::clone(&transport),
            Arc::clone(&store),
            config.raft,
            ready,
            commit_tx,
        )?;

        let quit = Arc::new(AtomicBool::new(false));
        spawn_accept_loop(config.id, listener, Arc::clone(&node), Arc::clone(&quit));
        info!(id = config.id, addr = %listener_addr, "server listening");

        Ok(Self {
            node,
            transport,
            store,
            listener_addr,
            quit,
        })
    }

    pub fn id(&self) -> u64 {
        self.node.id()
    }

    pub fn listener_addr(&self) -> SocketAddr {
        self.listener_addr
    }

    pub fn role(&self) -> Role {
        self.node.role()
    }

    pub fn report(&self) -> (u64, u64, bool) {
        self.node.report()
    }

    pub fn current_term(&self) -> u64 {
        self.node.current_term()
    }

    pub fn connect_to_peer(&self, id: u64, addr: &str) {
        self.transport.connect_to_peer(id, addr);
    }

    pub fn disconnect_peer(&self, id: u64) {
        self.transport.disconnect_peer(id);
    }

    pub fn disconnect_all(&self) {
        self.transport.disconnect_all();
    }

    /// Submits a command at this replica; fails with `NotLeader` when it has
    /// no authority to append.
    pub fn submit(&self, command: Command) -> Result<(), Error> {
        if self.node.submit(command)? {
            Ok(())
        } else {
            Err(Error::NotLeader {
                id: self.id(),
                term: self.node.current_term(),
            })
        }
    }

    /// Local, possibly stale read of an applied value.
    pub fn read(&self, key: &str) -> Result<i64, Error> {
        self.node.read_value(key)
    }

    /// Appends a `RemoveServer` entry for `server_id`. Must be called at the
    /// leader; self-removal is rejected.
    pub fn leave_cluster(&self, server_id: u64) -> Result<(), Error> {
        if server_id == self.id() {
            return Err(Error::CannotRemoveSelf(server_id));
        }
        self.submit(Command::RemoveServer { id: server_id })
    }

    /// Joins an existing cluster through its leader: announce ourselves,
    /// fetch the peer list at the leader's term, connect to everyone, and
    /// fall in as a follower.
    pub fn join_cluster(&self, leader_id: u64, leader_addr: &str) -> Result<(), Error> {
        if leader_id == self.id() {
            return Err(Error::JoinOwnCluster);
        }
        self.transport.connect_to_peer(leader_id, leader_addr);

        let args = JoinClusterArgs {
            server_id: self.id(),
            server_addr: self.listener_addr.to_string(),
        };
        let reply = match self.transport.call(leader_id, &Request::JoinCluster(args))? {
            Response::JoinCluster(reply) => reply,
            _ => return Err(Error::UnexpectedResponse),
        };
        if !reply.success {
            return Err(Error::NotLeader {
                id: leader_id,
                term: reply.term,
            });
        }
        if reply.leader_id != leader_id {
            return Err(Error::InvalidLeader(reply.leader_id));
        }

        let peers = match self
            .transport
            .call(leader_id, &Request::FetchPeerList(FetchPeerListArgs { term: reply.term }))?
        {
            Response::FetchPeerList(peers) => peers,
            _ => return Err(Error::UnexpectedResponse),
        };
        if !peers.success {
            return Err(Error::NotLeader {
                id: leader_id,
                term: peers.term,
            });
        }

        for (&peer, addr) in &peers.peer_address {
            if peer != self.id() {
                self.transport.connect_to_peer(peer, addr);
            }
        }
        self.node.join_as_peer(reply.leader_id, peers.term, &peers.peer_set);
        Ok(())
    }

    /// Stores an application value under its own key namespace.
    pub fn set_data(&self, key: &str, value: i64) {
        self.store.set_app_value(key, value);
    }

    pub fn get_data(&self, key: &str) -> Result<i64, Error> {
        self.store.app_value(key)
    }

    /// Stops the node and the accept loop. In-flight handler threads finish
    /// or time out on their own.
    pub fn stop(&self) {
        self.node.stop();
        self.quit.store(true, Ordering::SeqCst);
        // Wake the accept loop so it observes the quit flag.
        let _ = TcpStream::connect(self.listener_addr);
        debug!(id = self.id(), "server stopped");
    }
}

fn spawn_accept_loop(id: u64, listener: TcpListener, node: Arc<Node>, quit: Arc<AtomicBool>) {
    thread::Builder::new()
        .name(format!("raft-accept-{id}"))
        .spawn(move || {
            for stream in listener.incoming() {
                if quit.load(Ordering::SeqCst) {
                    return;
                }
                match stream {
                    Ok(stream) => {
                        let node = Arc::clone(&node);
                        thread::spawn(move || {
                            if let Err(err) = handle_connection(&node, stream) {
                                debug!(id, error = %err, "connection handler failed");
                            }
                        });
                    }
                    Err(err) => {
                        warn!(id, error = %err, "accept failed");
                    }
                }
            }
        })
        .expect("failed to spawn accept loop");
}

/// Reads one request frame, dispatches it, and writes the reply frame.
fn handle_connection(node: &Arc<Node>, mut stream: TcpStream) -> Result<(), Error> {
    stream.set_read_timeout(Some(IO_TIMEOUT))?;
    stream.set_write_timeout(Some(IO_TIMEOUT))?;

    let request: Request = read_frame(&mut stream)?;
    let response = match request {
        Request::RequestVote(args) => Response::RequestVote(node.handle_request_vote(args)?),
        Request::AppendEntries(args) => {
            Response::AppendEntries(node.handle_append_entries(args)?)
        }
        Request::JoinCluster(args) => Response::JoinCluster(node.handle_join_cluster(args)),
        Request::FetchPeerList(args) => Response::FetchPeerList(node.handle_fetch_peer_list(args)),
        Request::LeaveCluster(args) => Response::LeaveCluster(node.handle_leave_cluster(args)),
    };
    write_frame(&mut stream, &response)
}
