//! CLI entry point for running one replica with an interactive shell.
//!
//! # Example usage
//!
//! Start a 3-node cluster:
//! ```bash
//! # Terminal 1 (node 1)
//! cargo run --bin node -- \
//!   --id 1 --listen 127.0.0.1:7101 \
//!   --peer 2=127.0.0.1:7102 --peer 3=127.0.0.1:7103
//!
//! # Terminals 2 and 3: same shape with --id 2 / --id 3.
//! ```
//!
//! Join a running cluster later:
//! ```bash
//! cargo run --bin node -- --id 4 --listen 127.0.0.1:7104 --join 1=127.0.0.1:7101
//! ```

use std::io::{self, BufRead, Write};
use std::sync::Arc;
use std::thread;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use crossbeam_channel::bounded;
use tracing::info;

use raft_cluster::protocol::ConsoleCommand;
use raft_cluster::{Command, CommitEntry, Config, Error, Server, ServerConfig, Store};

/// Command-line arguments for a replica.
#[derive(Parser, Debug)]
#[command(author, version, about = "Run one replica of the replicated log cluster")]
struct Args {
    /// Numeric node id, unique within the cluster
    #[arg(long)]
    id: u64,

    /// Address to listen on for cluster RPCs, e.g. 127.0.0.1:7101
    #[arg(long)]
    listen: String,

    /// Initial peers as id=addr entries (repeat or comma-separate)
    #[arg(long, value_delimiter = ',')]
    peer: Vec<String>,

    /// Join an existing cluster through its leader, as id=addr
    #[arg(long)]
    join: Option<String>,
}

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

fn parse_peer(entry: &str) -> Result<(u64, String)> {
    let (id, addr) = entry
        .split_once('=')
        .ok_or_else(|| anyhow!("peer entry {entry:?} is not id=addr"))?;
    let id = id.parse().with_context(|| format!("bad peer id in {entry:?}"))?;
    Ok((id, addr.to_string()))
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    let peers: Vec<(u64, String)> = args
        .peer
        .iter()
        .map(|entry| parse_peer(entry))
        .collect::<Result<_>>()?;

    let store = Arc::new(Store::new());
    let (ready_tx, ready_rx) = bounded(1);
    let (commit_tx, commit_rx) = bounded(16);

    let server = Server::start(
        ServerConfig {
            id: args.id,
            listen: args.listen.clone(),
            peers: peers.iter().map(|(id, _)| *id).collect(),
            raft: Config::default(),
        },
        Arc::clone(&store),
        ready_rx,
        commit_tx,
    )
    .context("failed to start server")?;

    for (id, addr) in &peers {
        server.connect_to_peer(*id, addr);
    }

    if let Some(join) = &args.join {
        let (leader_id, leader_addr) = parse_peer(join)?;
        server
            .join_cluster(leader_id, &leader_addr)
            .with_context(|| format!("failed to join cluster via node {leader_id}"))?;
        info!(id = args.id, leader = leader_id, "joined existing cluster");
    }

    // Release the election timer now that the cluster wiring is in place.
    drop(ready_tx);

    // Apply loop: drain committed entries into the application store so
    // local reads observe them.
    let apply_store = Arc::clone(&store);
    let apply_id = args.id;
    thread::spawn(move || {
        for record in commit_rx {
            let CommitEntry { command, index, .. } = record;
            if let Command::Put { key, value } = command {
                apply_store.set_app_value(&key, value);
                info!(id = apply_id, %key, value, index, "applied");
            }
        }
    });

    run_shell(&server)
}

fn run_shell(server: &Server) -> Result<()> {
    let stdin = io::stdin();
    print_prompt()?;
    for line in stdin.lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            print_prompt()?;
            continue;
        }
        match ConsoleCommand::parse(&line) {
            Ok(ConsoleCommand::Put { key, value }) => {
                match server.submit(Command::Put {
                    key: key.clone(),
                    value,
                }) {
                    Ok(()) => println!("submitted {key}={value}"),
                    Err(err) => println!("error: {err}"),
                }
            }
            Ok(ConsoleCommand::Get { key }) => match server.read(&key) {
                Ok(value) => println!("{key} = {value}"),
                Err(Error::KeyNotFound(_)) => println!("{key} not found"),
                Err(err) => println!("error: {err}"),
            },
            Ok(ConsoleCommand::Status) => {
                let (id, term, _) = server.report();
                println!(
                    "node {id}: term {term}, {}, listening on {}",
                    server.role(),
                    server.listener_addr()
                );
            }
            Ok(ConsoleCommand::Leave { server_id }) => match server.leave_cluster(server_id) {
                Ok(()) => println!("removal of server {server_id} submitted"),
                Err(err) => println!("error: {err}"),
            },
            Ok(ConsoleCommand::Help) => {
                println!("commands: PUT <key> <int> | GET <key> | STATUS | LEAVE <id> | HELP | EXIT");
            }
            Ok(ConsoleCommand::Exit) => break,
            Err(err) => println!("{err}"),
        }
        print_prompt()?;
    }

    server.stop();
    Ok(())
}

fn print_prompt() -> Result<()> {
    print!("> ");
    io::stdout().flush()?;
    Ok(())
}
