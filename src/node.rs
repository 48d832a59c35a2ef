//! The Raft consensus state machine.
//!
//! One `Node` per replica. All mutable state sits behind a single mutex;
//! everything else is threads and channels:
//!
//! - **Election timer thread**: samples elapsed time every 10ms and starts an
//!   election when the randomized timeout expires
//! - **Heartbeat loop thread** (leaders only): replicates every 50ms, or
//!   immediately when the `trigger` signal is raised
//! - **Commit dispatcher thread**: delivers committed entries to the
//!   application in strict log order
//! - **Ephemeral RPC threads**: one per outbound call, so a slow peer never
//!   stalls the rest of a replication burst
//!
//! RPC I/O and commit-channel sends always happen with the mutex released.
//! The signal channels (`newCommitReady`, `trigger`) are bounded and sent
//! with `try_send`, which makes them coalescing and non-blocking.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, Sender};
use rand::Rng;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::command::{Command, CommitEntry, LogEntry};
use crate::error::Error;
use crate::message::{
    AppendEntriesArgs, AppendEntriesReply, FetchPeerListArgs, FetchPeerListReply, JoinClusterArgs,
    JoinClusterReply, LeaveClusterArgs, LeaveClusterReply, Request, RequestVoteArgs,
    RequestVoteReply, Response,
};
use crate::peers::PeerSet;
use crate::store::Store;
use crate::transport::Transport;

/// Role of a replica. `Dead` is terminal and entered only through `stop`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Follower,
    Candidate,
    Leader,
    Dead,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::Follower => "Follower",
            Role::Candidate => "Candidate",
            Role::Leader => "Leader",
            Role::Dead => "Dead",
        };
        f.write_str(name)
    }
}

/// Timing knobs. The defaults are the protocol constants; tests shorten or
/// stretch them to make scenarios deterministic.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base election timeout; the effective timeout is drawn from
    /// `[base, 2*base)`.
    pub election_timeout_base: Duration,
    pub heartbeat_interval: Duration,
    /// How often the election watchdog samples the clock.
    pub tick_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            election_timeout_base: Duration::from_millis(1500),
            heartbeat_interval: Duration::from_millis(50),
            tick_interval: Duration::from_millis(10),
        }
    }
}

impl Config {
    /// Draws a randomized election timeout. With
    /// `RAFT_FORCE_MORE_REELECTION=true` the timeout collapses to the fixed
    /// base two-thirds of the time, which makes ties and re-elections far
    /// more likely.
    fn election_timeout(&self) -> Duration {
        let base = self.election_timeout_base.as_millis() as u64;
        let mut rng = rand::thread_rng();
        let force = std::env::var("RAFT_FORCE_MORE_REELECTION")
            .map(|v| v == "true")
            .unwrap_or(false);
        if force && rng.gen_range(0..3) > 0 {
            Duration::from_millis(base)
        } else {
            Duration::from_millis(base + rng.gen_range(0..base))
        }
    }
}

/// Everything mutable, guarded by the one node mutex.
struct RaftState {
    current_term: u64,
    voted_for: Option<u64>,
    log: Vec<LogEntry>,
    commit_length: u64,
    last_applied: u64,
    role: Role,
    election_reset_at: Instant,
    peers: PeerSet,
    next_index: HashMap<u64, u64>,
    matched_index: HashMap<u64, u64>,
}

impl RaftState {
    /// 1-based index and term of the last log entry, `(0, 0)` when empty.
    fn last_log_index_and_term(&self) -> (u64, u64) {
        match self.log.last() {
            Some(entry) => (self.log.len() as u64, entry.term),
            None => (0, 0),
        }
    }
}

/// Per-peer snapshot taken under the mutex at burst time. The reply is
/// validated against these saved values, so reordered or duplicated
/// deliveries cannot corrupt `next_index`.
struct ReplicationBatch {
    peer: u64,
    next_index: u64,
    last_log_index: u64,
    last_log_term: u64,
    entries: Vec<LogEntry>,
    leader_commit: u64,
}

pub struct Node {
    id: u64,
    config: Config,
    transport: Arc<Transport>,
    store: Arc<Store>,
    commit_tx: Sender<CommitEntry>,
    /// `Some` while alive; `stop` takes it, which closes the channel and
    /// lets the dispatcher drain out.
    commit_ready_tx: Mutex<Option<Sender<()>>>,
    trigger_tx: Sender<()>,
    trigger_rx: Receiver<()>,
    state: Mutex<RaftState>,
}

impl Node {
    /// Creates a replica and spawns its dispatcher. The election timer stays
    /// parked until the `ready` gate fires (send or drop), so a harness can
    /// wire up the whole cluster before any replica starts campaigning.
    ///
    /// A store that already holds data is restored; missing or malformed
    /// blobs are fatal here, before the replica touches the network.
    pub fn new(
        id: u64,
        peers: PeerSet,
        transport: Arc<Transport>,
        store: Arc<Store>,
        config: Config,
        ready: Receiver<()>,
        commit_tx: Sender<CommitEntry>,
    ) -> Result<Arc<Self>, Error> {
        let mut state = RaftState {
            current_term: 0,
            voted_for: None,
            log: Vec::new(),
            commit_length: 0,
            last_applied: 0,
            role: Role::Follower,
            election_reset_at: Instant::now(),
            peers,
            next_index: HashMap::new(),
            matched_index: HashMap::new(),
        };
        if store.has_data() {
            restore_from_storage(&store, &mut state)?;
            info!(
                id,
                term = state.current_term,
                entries = state.log.len(),
                "restored raft state from storage"
            );
        }

        let (commit_ready_tx, commit_ready_rx) = bounded(16);
        let (trigger_tx, trigger_rx) = bounded(1);
        let node = Arc::new(Self {
            id,
            config,
            transport,
            store,
            commit_tx,
            commit_ready_tx: Mutex::new(Some(commit_ready_tx)),
            trigger_tx,
            trigger_rx,
            state: Mutex::new(state),
        });

        let dispatcher = Arc::clone(&node);
        thread::spawn(move || dispatcher.dispatch_commits(commit_ready_rx));

        let watchdog = Arc::clone(&node);
        thread::spawn(move || {
            let _ = ready.recv();
            watchdog.state.lock().unwrap().election_reset_at = Instant::now();
            watchdog.run_election_timer();
        });

        Ok(node)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// This replica's current role.
    pub fn role(&self) -> Role {
        self.state.lock().unwrap().role
    }

    pub fn report(&self) -> (u64, u64, bool) {
        let state = self.state.lock().unwrap();
        (self.id, state.current_term, state.role == Role::Leader)
    }

    pub fn current_term(&self) -> u64 {
        self.state.lock().unwrap().current_term
    }

    /// Transitions to Dead and closes the commit-ready channel. The
    /// dispatcher drains and exits; the heartbeat and timer loops notice the
    /// role at their next wake.
    pub fn stop(&self) {
        let mut state = self.state.lock().unwrap();
        if state.role == Role::Dead {
            return;
        }
        state.role = Role::Dead;
        info!(id = self.id, "node stopped");
        self.commit_ready_tx.lock().unwrap().take();
    }

    /// Submits a command at this replica. Returns `Ok(false)` when the
    /// replica is not the leader; the entry was not appended and the caller
    /// should redirect.
    pub fn submit(self: &Arc<Self>, command: Command) -> Result<bool, Error> {
        {
            let mut guard = self.state.lock().unwrap();
            let state = &mut *guard;
            if state.role != Role::Leader {
                return Ok(false);
            }

            match &command {
                Command::RemoveServer { id } => {
                    if *id == self.id {
                        return Err(Error::CannotRemoveSelf(*id));
                    }
                    if !state.peers.contains(*id) {
                        return Err(Error::NotMember(*id));
                    }
                }
                Command::Put { .. } | Command::AddServer { .. } => {}
            }

            let term = state.current_term;
            state.log.push(LogEntry {
                term,
                command: command.clone(),
            });

            // Membership entries take effect at the leader as soon as they
            // enter its log; followers apply them on replication.
            match &command {
                Command::AddServer { id, addr } if *id != self.id => {
                    self.transport.connect_to_peer(*id, addr);
                    let next = state.log.len() as u64 + 1;
                    state.peers.insert(*id);
                    state.next_index.insert(*id, next);
                    state.matched_index.insert(*id, 0);
                    info!(id = self.id, peer = *id, "added peer to cluster");
                }
                Command::RemoveServer { id } => {
                    state.peers.remove(*id);
                    info!(id = self.id, peer = *id, "removed peer from cluster");
                }
                _ => {}
            }

            self.persist(state)?;
        }
        self.raise_trigger();
        Ok(true)
    }

    /// Serves a read from local storage. Works at any role and offers no
    /// linearizability; a partitioned replica returns whatever it last
    /// applied.
    pub fn read_value(&self, key: &str) -> Result<i64, Error> {
        self.store.app_value(key)
    }

    // -- RPC handlers --

    pub fn handle_request_vote(
        self: &Arc<Self>,
        args: RequestVoteArgs,
    ) -> Result<RequestVoteReply, Error> {
        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;
        let mut reply = RequestVoteReply::default();

        // Unknown candidates have not been admitted through the log yet;
        // a zero reply reads as stale and is ignored by every caller.
        if state.role == Role::Dead || !state.peers.contains(args.candidate_id) {
            return Ok(reply);
        }

        let (last_log_index, last_log_term) = state.last_log_index_and_term();
        if args.term > state.current_term {
            self.become_follower(state, args.term);
        }

        if args.term == state.current_term
            && (state.voted_for.is_none() || state.voted_for == Some(args.candidate_id))
            && (args.last_log_term > last_log_term
                || (args.last_log_term == last_log_term && args.last_log_index >= last_log_index))
        {
            reply.vote_granted = true;
            state.voted_for = Some(args.candidate_id);
            state.election_reset_at = Instant::now();
            debug!(
                id = self.id,
                candidate = args.candidate_id,
                term = state.current_term,
                "vote granted"
            );
        }
        reply.term = state.current_term;
        self.persist(state)?;
        Ok(reply)
    }

    pub fn handle_append_entries(
        self: &Arc<Self>,
        args: AppendEntriesArgs,
    ) -> Result<AppendEntriesReply, Error> {
        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;
        let mut reply = AppendEntriesReply::default();

        if state.role == Role::Dead || !state.peers.contains(args.leader_id) {
            return Ok(reply);
        }
        if args.term > state.current_term {
            self.become_follower(state, args.term);
        }

        if args.term == state.current_term {
            if state.role != Role::Follower {
                self.become_follower(state, args.term);
            }
            state.election_reset_at = Instant::now();

            let log_len = state.log.len() as u64;
            let consistent = args.last_log_index == 0
                || (args.last_log_index <= log_len
                    && args.last_log_term == state.log[(args.last_log_index - 1) as usize].term);

            if consistent {
                reply.success = true;
                state.log.truncate(args.last_log_index as usize);
                for entry in &args.entries {
                    match &entry.command {
                        Command::AddServer { id, addr } if *id != self.id => {
                            self.transport.connect_to_peer(*id, addr);
                            state.peers.insert(*id);
                            info!(id = self.id, peer = *id, "added peer via replication");
                        }
                        Command::RemoveServer { id } if *id != self.id => {
                            if state.peers.contains(*id) {
                                state.peers.remove(*id);
                                info!(id = self.id, peer = *id, "removed peer via replication");
                            }
                        }
                        _ => {}
                    }
                }
                state.log.extend(args.entries.iter().cloned());

                if args.leader_commit > state.commit_length {
                    state.commit_length = args.leader_commit.min(state.log.len() as u64);
                    self.signal_commit_ready();
                }
            } else if args.last_log_index > log_len {
                // Too short to even check: tell the leader where our log ends.
                reply.recovery_index = log_len + 1;
                reply.recovery_term = 0;
            } else {
                // Report the conflicting term and its first index so the
                // leader can step over the whole term at once.
                reply.recovery_term = state.log[(args.last_log_index - 1) as usize].term;
                reply.recovery_index = 1;
                for i in (1..args.last_log_index).rev() {
                    if state.log[(i - 1) as usize].term != reply.recovery_term {
                        reply.recovery_index = i + 1;
                        break;
                    }
                }
            }
        }

        reply.term = state.current_term;
        self.persist(state)?;
        Ok(reply)
    }

    /// Leader side of admission. Replies before the `AddServer` entry is
    /// appended; admission becomes durable only once that entry replicates.
    pub fn handle_join_cluster(self: &Arc<Self>, args: JoinClusterArgs) -> JoinClusterReply {
        let mut reply = JoinClusterReply::default();
        {
            let state = self.state.lock().unwrap();
            reply.term = state.current_term;
            if state.role != Role::Leader {
                debug!(
                    id = self.id,
                    joiner = args.server_id,
                    "join rejected: not leader"
                );
                return reply;
            }
            reply.success = true;
            reply.leader_id = self.id;
            self.transport.connect_to_peer(args.server_id, &args.server_addr);
            info!(
                id = self.id,
                joiner = args.server_id,
                addr = %args.server_addr,
                "admitting server"
            );
        }

        let node = Arc::clone(self);
        let command = Command::AddServer {
            id: args.server_id,
            addr: args.server_addr,
        };
        thread::spawn(move || match node.submit(command) {
            Ok(true) => {}
            Ok(false) => warn!(id = node.id, "lost leadership before appending AddServer"),
            Err(err) => warn!(id = node.id, error = %err, "failed to append AddServer"),
        });
        reply
    }

    pub fn handle_fetch_peer_list(&self, args: FetchPeerListArgs) -> FetchPeerListReply {
        let state = self.state.lock().unwrap();
        let mut reply = FetchPeerListReply {
            term: state.current_term,
            ..Default::default()
        };
        if state.current_term == args.term && state.role == Role::Leader {
            reply.success = true;
            reply.peer_set = state.peers.to_set();
            reply.peer_address = self.transport.peer_addresses();
        }
        reply
    }

    pub fn handle_leave_cluster(self: &Arc<Self>, args: LeaveClusterArgs) -> LeaveClusterReply {
        let mut reply = LeaveClusterReply::default();
        {
            let state = self.state.lock().unwrap();
            if state.role != Role::Leader || args.server_id == self.id {
                return reply;
            }
            reply.success = true;
            if !state.peers.contains(args.server_id) {
                return reply;
            }
        }

        let node = Arc::clone(self);
        thread::spawn(move || {
            if let Err(err) = node.submit(Command::RemoveServer {
                id: args.server_id,
            }) {
                warn!(id = node.id, error = %err, "failed to append RemoveServer");
            }
        });
        reply
    }

    /// Joiner side of admission: adopt the leader's term and peer list and
    /// fall in as a follower.
    pub fn join_as_peer(
        self: &Arc<Self>,
        leader_id: u64,
        term: u64,
        peer_set: &std::collections::HashSet<u64>,
    ) {
        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;
        state.peers.insert(leader_id);
        self.become_follower(state, term);
        for &peer in peer_set {
            if peer != self.id {
                state.peers.insert(peer);
            }
        }
        info!(
            id = self.id,
            leader = leader_id,
            term,
            peers = state.peers.len(),
            "joined cluster"
        );
    }

    // -- elections --

    /// Watches the election clock until it expires or the watched term ends.
    /// Each role change to Follower and each election start spawns a fresh
    /// watchdog; stale ones exit at their next tick.
    fn run_election_timer(self: Arc<Self>) {
        let timeout = self.config.election_timeout();
        let term_started = self.state.lock().unwrap().current_term;
        debug!(
            id = self.id,
            term = term_started,
            ?timeout,
            "election timer started"
        );

        loop {
            thread::sleep(self.config.tick_interval);
            let mut guard = self.state.lock().unwrap();
            let state = &mut *guard;
            if state.role != Role::Candidate && state.role != Role::Follower {
                return;
            }
            if state.current_term != term_started {
                return;
            }
            if state.election_reset_at.elapsed() >= timeout {
                self.start_election(state);
                return;
            }
        }
    }

    fn start_election(self: &Arc<Self>, state: &mut RaftState) {
        state.role = Role::Candidate;
        state.current_term += 1;
        let candidacy_term = state.current_term;
        state.election_reset_at = Instant::now();
        state.voted_for = Some(self.id);
        info!(
            id = self.id,
            term = candidacy_term,
            peers = state.peers.len(),
            "starting election"
        );

        // A lone replica is its own majority.
        if state.peers.is_empty() {
            self.become_leader(state);
        }

        let votes = Arc::new(AtomicUsize::new(1));
        let (last_log_index, last_log_term) = state.last_log_index_and_term();

        for peer in state.peers.iter().collect::<Vec<_>>() {
            let node = Arc::clone(self);
            let votes = Arc::clone(&votes);
            thread::spawn(move || {
                let args = RequestVoteArgs {
                    term: candidacy_term,
                    candidate_id: node.id,
                    last_log_index,
                    last_log_term,
                };
                let reply = match node.transport.call(peer, &Request::RequestVote(args)) {
                    Ok(Response::RequestVote(reply)) => reply,
                    _ => return,
                };

                let mut guard = node.state.lock().unwrap();
                let state = &mut *guard;
                if state.role != Role::Candidate {
                    return;
                }
                if reply.term > candidacy_term {
                    node.become_follower(state, reply.term);
                    return;
                }
                if reply.term == candidacy_term && reply.vote_granted {
                    let granted = votes.fetch_add(1, Ordering::SeqCst) + 1;
                    if 2 * granted > state.peers.len() + 1 {
                        node.become_leader(state);
                    }
                }
            });
        }

        let node = Arc::clone(self);
        thread::spawn(move || node.run_election_timer());
    }

    fn become_follower(self: &Arc<Self>, state: &mut RaftState, term: u64) {
        debug!(id = self.id, term, "becoming follower");
        state.role = Role::Follower;
        state.current_term = term;
        state.voted_for = None;
        state.election_reset_at = Instant::now();

        let node = Arc::clone(self);
        thread::spawn(move || node.run_election_timer());
    }

    fn become_leader(self: &Arc<Self>, state: &mut RaftState) {
        info!(id = self.id, term = state.current_term, "became leader");
        state.role = Role::Leader;
        let next = state.log.len() as u64 + 1;
        for peer in state.peers.iter().collect::<Vec<_>>() {
            state.next_index.insert(peer, next);
            state.matched_index.insert(peer, 0);
        }

        let node = Arc::clone(self);
        thread::spawn(move || node.heartbeat_loop());
    }

    // -- replication --

    /// Sends a burst immediately, then every heartbeat interval or whenever
    /// the trigger is raised. Exits once the replica is no longer leader.
    fn heartbeat_loop(self: Arc<Self>) {
        let interval = self.config.heartbeat_interval;
        self.send_append_entries();
        loop {
            let do_send = crossbeam_channel::select! {
                recv(self.trigger_rx) -> msg => msg.is_ok(),
                default(interval) => true,
            };
            if !do_send {
                return;
            }
            if self.state.lock().unwrap().role != Role::Leader {
                return;
            }
            self.send_append_entries();
        }
    }

    /// One replication burst: snapshot per-peer send state under the mutex,
    /// then fan out one thread per peer for the actual calls.
    fn send_append_entries(self: &Arc<Self>) {
        let leadership_term;
        let batches: Vec<ReplicationBatch>;
        {
            let mut guard = self.state.lock().unwrap();
            let state = &mut *guard;
            if state.role != Role::Leader {
                return;
            }
            leadership_term = state.current_term;

            if state.peers.is_empty() {
                if self.advance_commit_index(state) {
                    self.signal_commit_ready();
                    self.raise_trigger();
                }
                return;
            }

            batches = state
                .peers
                .iter()
                .map(|peer| {
                    let next_index = state
                        .next_index
                        .get(&peer)
                        .copied()
                        .unwrap_or(state.log.len() as u64 + 1);
                    let last_log_index = next_index - 1;
                    let last_log_term = if last_log_index > 0 {
                        state.log[(last_log_index - 1) as usize].term
                    } else {
                        0
                    };
                    ReplicationBatch {
                        peer,
                        next_index,
                        last_log_index,
                        last_log_term,
                        entries: state.log[(next_index - 1) as usize..].to_vec(),
                        leader_commit: state.commit_length,
                    }
                })
                .collect();
        }

        for batch in batches {
            let node = Arc::clone(self);
            thread::spawn(move || node.replicate_to_peer(leadership_term, batch));
        }
    }

    fn replicate_to_peer(self: &Arc<Self>, leadership_term: u64, batch: ReplicationBatch) {
        let sent = batch.entries.len() as u64;
        let args = AppendEntriesArgs {
            term: leadership_term,
            leader_id: self.id,
            last_log_index: batch.last_log_index,
            last_log_term: batch.last_log_term,
            entries: batch.entries,
            leader_commit: batch.leader_commit,
        };
        let reply = match self.transport.call(batch.peer, &Request::AppendEntries(args)) {
            Ok(Response::AppendEntries(reply)) => reply,
            // Unreachable peers catch up on a later heartbeat.
            _ => return,
        };

        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;
        if reply.term > leadership_term {
            self.become_follower(state, reply.term);
            return;
        }
        if state.role != Role::Leader || reply.term != leadership_term {
            return;
        }

        if reply.success {
            let next = batch.next_index + sent;
            state.next_index.insert(batch.peer, next);
            state.matched_index.insert(batch.peer, next - 1);
            if self.advance_commit_index(state) {
                self.signal_commit_ready();
                self.raise_trigger();
            }
        } else if reply.recovery_term == 0 {
            state.next_index.insert(batch.peer, reply.recovery_index);
        } else {
            // Jump past the follower's conflicting term: resume after our own
            // last entry of that term if we have one, else at its first index.
            let mut last_of_term = 0;
            for i in (1..=state.log.len() as u64).rev() {
                if state.log[(i - 1) as usize].term == reply.recovery_term {
                    last_of_term = i;
                    break;
                }
            }
            let next = if last_of_term > 0 {
                last_of_term + 1
            } else {
                reply.recovery_index
            };
            state.next_index.insert(batch.peer, next);
        }
    }

    /// Advances `commit_length` over every index replicated on a majority.
    /// Only current-term entries count directly; earlier entries commit
    /// transitively when a later current-term index clears the quorum.
    fn advance_commit_index(&self, state: &mut RaftState) -> bool {
        let before = state.commit_length;
        for i in (state.commit_length + 1)..=(state.log.len() as u64) {
            if state.log[(i - 1) as usize].term != state.current_term {
                continue;
            }
            let matches = 1 + state
                .peers
                .iter()
                .filter(|peer| state.matched_index.get(peer).copied().unwrap_or(0) >= i)
                .count();
            if 2 * matches > state.peers.len() + 1 {
                state.commit_length = i;
            }
        }
        if state.commit_length != before {
            debug!(
                id = self.id,
                commit = state.commit_length,
                "commit index advanced"
            );
            true
        } else {
            false
        }
    }

    // -- commit delivery --

    /// Dispatcher loop: on each signal, claim the newly committed suffix
    /// under the mutex, then deliver it with the mutex released so a slow
    /// application cannot block RPC handlers.
    fn dispatch_commits(self: Arc<Self>, ready: Receiver<()>) {
        while ready.recv().is_ok() {
            let (pending, base_index, term) = {
                let mut state = self.state.lock().unwrap();
                let base = state.last_applied;
                let term = state.current_term;
                let pending = if state.commit_length > state.last_applied {
                    let entries = state.log
                        [state.last_applied as usize..state.commit_length as usize]
                        .to_vec();
                    state.last_applied = state.commit_length;
                    entries
                } else {
                    Vec::new()
                };
                (pending, base, term)
            };

            for (offset, entry) in pending.into_iter().enumerate() {
                let record = CommitEntry {
                    command: entry.command,
                    term,
                    index: base_index + offset as u64 + 1,
                };
                if self.commit_tx.send(record).is_err() {
                    return;
                }
            }
        }
    }

    fn signal_commit_ready(&self) {
        if let Some(tx) = self.commit_ready_tx.lock().unwrap().as_ref() {
            let _ = tx.try_send(());
        }
    }

    fn raise_trigger(&self) {
        let _ = self.trigger_tx.try_send(());
    }

    // -- persistence --

    /// Writes the three durable blobs. Runs before any reply that depends on
    /// the new state leaves the node; an encode failure is fatal for the
    /// replica.
    fn persist(&self, state: &RaftState) -> Result<(), Error> {
        self.store.set("currentTerm", bincode::serialize(&state.current_term)?);
        self.store.set("votedFor", bincode::serialize(&state.voted_for)?);
        self.store.set("log", bincode::serialize(&state.log)?);
        Ok(())
    }
}

fn restore_from_storage(store: &Store, state: &mut RaftState) -> Result<(), Error> {
    state.current_term = decode_blob(store, "currentTerm")?;
    state.voted_for = decode_blob(store, "votedFor")?;
    state.log = decode_blob(store, "log")?;
    Ok(())
}

fn decode_blob<T: DeserializeOwned>(store: &Store, name: &str) -> Result<T, Error> {
    let bytes = store
        .get(name)
        .ok_or_else(|| Error::KeyNotFound(name.to_string()))?;
    Ok(bincode::deserialize(&bytes)?)
}
