//! Integration tests for log replication and commit delivery.
//!
//! Covers single-node commits, replication to a full cluster, commit
//! progress across a leader partition, and the rejection of writes at
//! followers.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;
use crossbeam_channel::{bounded, unbounded, Receiver};
use raft_cluster::{Command, CommitEntry, Config, Error, Server, ServerConfig, Store};

/// Harness managing a cluster of replicas on sequential localhost ports.
struct TestCluster {
    servers: Vec<Server>,
    commits: Vec<Receiver<CommitEntry>>,
    addrs: Vec<String>,
}

impl TestCluster {
    fn spawn(n: usize, base_port: u16) -> Result<Self> {
        let addrs: Vec<String> = (0..n)
            .map(|i| format!("127.0.0.1:{}", base_port + i as u16))
            .collect();

        let mut servers = Vec::new();
        let mut commits = Vec::new();
        let mut ready_gates = Vec::new();

        for i in 0..n {
            let id = (i + 1) as u64;
            let peers: Vec<u64> = (1..=n as u64).filter(|&p| p != id).collect();
            let (ready_tx, ready_rx) = bounded(1);
            let (commit_tx, commit_rx) = unbounded();
            let server = Server::start(
                ServerConfig {
                    id,
                    listen: addrs[i].clone(),
                    peers,
                    raft: Config::default(),
                },
                Arc::new(Store::new()),
                ready_rx,
                commit_tx,
            )?;
            servers.push(server);
            commits.push(commit_rx);
            ready_gates.push(ready_tx);
        }

        for i in 0..n {
            for j in 0..n {
                if i != j {
                    servers[i].connect_to_peer((j + 1) as u64, &addrs[j]);
                }
            }
        }
        drop(ready_gates);

        Ok(Self {
            servers,
            commits,
            addrs,
        })
    }

    fn server(&self, id: usize) -> &Server {
        &self.servers[id - 1]
    }

    fn commits(&self, id: usize) -> &Receiver<CommitEntry> {
        &self.commits[id - 1]
    }

    fn wait_for_single_leader(&self, among: &[usize], timeout: Duration) -> Result<usize> {
        let start = Instant::now();
        loop {
            if start.elapsed() > timeout {
                anyhow::bail!("timeout waiting for leader election");
            }
            let leaders: Vec<usize> = among
                .iter()
                .copied()
                .filter(|&i| self.server(i).report().2)
                .collect();
            if leaders.len() == 1 {
                return Ok(leaders[0]);
            }
            thread::sleep(Duration::from_millis(50));
        }
    }

    fn disconnect(&self, id: usize) {
        self.server(id).disconnect_all();
        for other in 1..=self.servers.len() {
            if other != id {
                self.server(other).disconnect_peer(id as u64);
            }
        }
    }

    fn reconnect(&self, id: usize) {
        for other in 1..=self.servers.len() {
            if other != id {
                self.server(id)
                    .connect_to_peer(other as u64, &self.addrs[other - 1]);
                self.server(other)
                    .connect_to_peer(id as u64, &self.addrs[id - 1]);
            }
        }
    }

    fn shutdown(self) {
        for server in &self.servers {
            server.stop();
        }
        thread::sleep(Duration::from_millis(100));
    }
}

fn put(key: &str) -> Command {
    Command::Put {
        key: key.to_string(),
        value: 1,
    }
}

/// Receives the next commit record and checks its index and command key.
fn expect_commit(
    rx: &Receiver<CommitEntry>,
    index: u64,
    key: &str,
    timeout: Duration,
) -> Result<()> {
    let record = rx.recv_timeout(timeout)?;
    anyhow::ensure!(
        record.index == index,
        "expected commit index {index}, got {}",
        record.index
    );
    match &record.command {
        Command::Put { key: k, .. } => {
            anyhow::ensure!(k == key, "expected commit of {key:?}, got {k:?}")
        }
        other => anyhow::bail!("expected Put {key:?}, got {other:?}"),
    }
    Ok(())
}

#[test]
fn test_single_node_commits_in_order() -> Result<()> {
    let cluster = TestCluster::spawn(1, 22101)?;

    cluster.wait_for_single_leader(&[1], Duration::from_secs(5))?;
    let (id, term, is_leader) = cluster.server(1).report();
    assert_eq!(id, 1);
    assert!(term >= 1);
    assert!(is_leader);

    for key in ["a", "b", "c"] {
        cluster.server(1).submit(put(key))?;
    }
    for (i, key) in ["a", "b", "c"].iter().enumerate() {
        expect_commit(cluster.commits(1), i as u64 + 1, key, Duration::from_secs(2))?;
    }

    cluster.shutdown();
    Ok(())
}

#[test]
fn test_command_replicates_to_all_nodes() -> Result<()> {
    let cluster = TestCluster::spawn(3, 22201)?;

    let leader = cluster.wait_for_single_leader(&[1, 2, 3], Duration::from_secs(5))?;
    cluster.server(leader).submit(put("a"))?;

    for i in 1..=3 {
        expect_commit(cluster.commits(i), 1, "a", Duration::from_secs(5))?;
    }

    cluster.shutdown();
    Ok(())
}

#[test]
fn test_commits_survive_leader_partition() -> Result<()> {
    let cluster = TestCluster::spawn(3, 22301)?;

    let leader = cluster.wait_for_single_leader(&[1, 2, 3], Duration::from_secs(5))?;
    let (_, old_term, _) = cluster.server(leader).report();

    cluster.server(leader).submit(put("a"))?;
    for i in 1..=3 {
        expect_commit(cluster.commits(i), 1, "a", Duration::from_secs(5))?;
    }

    cluster.disconnect(leader);

    let remaining: Vec<usize> = (1..=3).filter(|&i| i != leader).collect();
    let new_leader = cluster.wait_for_single_leader(&remaining, Duration::from_secs(10))?;
    let (_, new_term, _) = cluster.server(new_leader).report();
    assert!(new_term > old_term);

    // The connected majority keeps making progress.
    cluster.server(new_leader).submit(put("b"))?;
    for &i in &remaining {
        expect_commit(cluster.commits(i), 2, "b", Duration::from_secs(5))?;
    }

    // The old leader converges after rejoining.
    cluster.reconnect(leader);
    expect_commit(cluster.commits(leader), 2, "b", Duration::from_secs(10))?;

    cluster.shutdown();
    Ok(())
}

#[test]
fn test_follower_rejects_submit() -> Result<()> {
    let cluster = TestCluster::spawn(3, 22401)?;

    let leader = cluster.wait_for_single_leader(&[1, 2, 3], Duration::from_secs(5))?;
    let follower = (1..=3).find(|&i| i != leader).expect("a follower exists");

    match cluster.server(follower).submit(put("a")) {
        Err(Error::NotLeader { id, .. }) => assert_eq!(id, follower as u64),
        other => panic!("follower must reject writes, got {other:?}"),
    }

    cluster.shutdown();
    Ok(())
}
