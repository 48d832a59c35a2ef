//! Integration tests for dynamic membership: joining through the leader and
//! removal via `LeaveCluster`, both flowing through the replicated log.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;
use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError};
use raft_cluster::message::{LeaveClusterArgs, Request, Response};
use raft_cluster::{
    Command, CommitEntry, Config, Server, ServerConfig, Store, Transport,
};

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

fn expect_put(rx: &Receiver<CommitEntry>, index: u64, key: &str, timeout: Duration) -> Result<()> {
    let record = rx.recv_timeout(timeout)?;
    anyhow::ensure!(record.index == index, "wrong index: {}", record.index);
    match &record.command {
        Command::Put { key: k, .. } => anyhow::ensure!(k == key, "wrong key: {k:?}"),
        other => anyhow::bail!("expected Put {key:?}, got {other:?}"),
    }
    Ok(())
}

fn expect_add_server(rx: &Receiver<CommitEntry>, index: u64, id: u64, timeout: Duration) -> Result<()> {
    let record = rx.recv_timeout(timeout)?;
    anyhow::ensure!(record.index == index, "wrong index: {}", record.index);
    match &record.command {
        Command::AddServer { id: added, .. } => {
            anyhow::ensure!(*added == id, "wrong server id: {added}")
        }
        other => anyhow::bail!("expected AddServer {id}, got {other:?}"),
    }
    Ok(())
}

#[test]
fn test_join_replicates_history_and_new_writes() -> Result<()> {
    let cluster = TestCluster::spawn(3, 23101)?;

    let leader = cluster.wait_for_single_leader(&[1, 2, 3], Duration::from_secs(5))?;
    cluster.server(leader).submit(put("a"))?;
    for i in 1..=3 {
        expect_put(cluster.commits(i), 1, "a", Duration::from_secs(5))?;
    }

    // Bring up node 4 with no peers and admit it through the leader. Its
    // election timer stays gated until the join completes.
    let (ready_tx, ready_rx) = bounded(1);
    let (commit_tx, commit_rx) = unbounded();
    let joiner = Server::start(
        ServerConfig {
            id: 4,
            listen: "127.0.0.1:23107".to_string(),
            peers: Vec::new(),
            raft: Config::default(),
        },
        Arc::new(Store::new()),
        ready_rx,
        commit_tx,
    )?;
    joiner.join_cluster(leader as u64, &cluster.addrs[leader - 1])?;
    drop(ready_tx);

    // The joiner catches up on the existing history plus its own admission.
    expect_put(&commit_rx, 1, "a", Duration::from_secs(10))?;
    expect_add_server(&commit_rx, 2, 4, Duration::from_secs(10))?;
    for i in 1..=3 {
        expect_add_server(cluster.commits(i), 2, 4, Duration::from_secs(10))?;
    }

    // Subsequent writes commit on all four replicas.
    cluster.server(leader).submit(put("b"))?;
    for i in 1..=3 {
        expect_put(cluster.commits(i), 3, "b", Duration::from_secs(5))?;
    }
    expect_put(&commit_rx, 3, "b", Duration::from_secs(5))?;

    joiner.stop();
    cluster.shutdown();
    Ok(())
}

#[test]
fn test_leave_cluster_removes_follower() -> Result<()> {
    let cluster = TestCluster::spawn(3, 23201)?;

    let leader = cluster.wait_for_single_leader(&[1, 2, 3], Duration::from_secs(5))?;
    let removed = (1..=3).find(|&i| i != leader).expect("a follower exists");
    let surviving = (1..=3)
        .find(|&i| i != leader && i != removed)
        .expect("another follower exists");

    // Drive the wire protocol directly, as an external client would.
    let client = Transport::new();
    client.connect_to_peer(leader as u64, &cluster.addrs[leader - 1]);
    let reply = match client.call(
        leader as u64,
        &Request::LeaveCluster(LeaveClusterArgs {
            server_id: removed as u64,
        }),
    )? {
        Response::LeaveCluster(reply) => reply,
        other => anyhow::bail!("unexpected response: {other:?}"),
    };
    assert!(reply.success);

    // The removal entry commits on the remaining members.
    for &i in &[leader, surviving] {
        let record = cluster.commits(i).recv_timeout(Duration::from_secs(10))?;
        assert_eq!(record.index, 1);
        assert_eq!(
            record.command,
            Command::RemoveServer {
                id: removed as u64
            }
        );
    }

    // The shrunken cluster keeps committing; the removed node sees nothing.
    cluster.server(leader).submit(put("x"))?;
    for &i in &[leader, surviving] {
        expect_put(cluster.commits(i), 2, "x", Duration::from_secs(5))?;
    }
    match cluster.commits(removed).recv_timeout(Duration::from_secs(1)) {
        Err(RecvTimeoutError::Timeout) => {}
        other => panic!("removed node must not receive commits, got {other:?}"),
    }

    cluster.shutdown();
    Ok(())
}

#[test]
fn test_leader_rejects_own_removal() -> Result<()> {
    let cluster = TestCluster::spawn(3, 23301)?;

    let leader = cluster.wait_for_single_leader(&[1, 2, 3], Duration::from_secs(5))?;

    // Over the wire: the handler refuses to remove the node serving it.
    let client = Transport::new();
    client.connect_to_peer(leader as u64, &cluster.addrs[leader - 1]);
    let reply = match client.call(
        leader as u64,
        &Request::LeaveCluster(LeaveClusterArgs {
            server_id: leader as u64,
        }),
    )? {
        Response::LeaveCluster(reply) => reply,
        other => anyhow::bail!("unexpected response: {other:?}"),
    };
    assert!(!reply.success);

    // Through the server API the same request is a typed error.
    let err = cluster
        .server(leader)
        .leave_cluster(leader as u64)
        .expect_err("self-removal must fail");
    assert!(matches!(
        err,
        raft_cluster::Error::CannotRemoveSelf(id) if id == leader as u64
    ));

    cluster.shutdown();
    Ok(())
}
