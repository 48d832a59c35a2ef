//! Console command parsing for the interactive shell.
//!
//! `ConsoleCommand` is the operator-facing surface; only `PUT` and `LEAVE`
//! end up in the replicated log (as `Command` values), the rest are local.

use anyhow::{anyhow, Result};

#[derive(Debug, PartialEq, Eq)]
pub enum ConsoleCommand {
    Put { key: String, value: i64 },
    Get { key: String },
    Status,
    Leave { server_id: u64 },
    Help,
    Exit,
}

impl ConsoleCommand {
    /// Parses a line of shell input.
    ///
    /// # Syntax
    /// - `PUT <key> <int>` - replicate a write through the log
    /// - `GET <key>` - read the locally applied value (may be stale)
    /// - `STATUS` - show id, term, and role
    /// - `LEAVE <id>` - remove a server from the cluster (leader only)
    /// - `HELP` / `EXIT`
    pub fn parse(line: &str) -> Result<Self> {
        let trimmed = line.trim();
        if trimmed.eq_ignore_ascii_case("exit") {
            return Ok(ConsoleCommand::Exit);
        }
        if trimmed.eq_ignore_ascii_case("help") {
            return Ok(ConsoleCommand::Help);
        }
        if trimmed.eq_ignore_ascii_case("status") {
            return Ok(ConsoleCommand::Status);
        }

        let parts: Vec<&str> = trimmed.split_whitespace().collect();
        match parts.as_slice() {
            ["GET", key] => Ok(ConsoleCommand::Get {
                key: key.to_string(),
            }),
            ["PUT", key, value] => Ok(ConsoleCommand::Put {
                key: key.to_string(),
                value: value
                    .parse()
                    .map_err(|_| anyhow!("PUT value must be an integer, got {value:?}"))?,
            }),
            ["LEAVE", id] => Ok(ConsoleCommand::Leave {
                server_id: id
                    .parse()
                    .map_err(|_| anyhow!("LEAVE takes a numeric server id, got {id:?}"))?,
            }),
            _ => Err(anyhow!(
                "invalid command. Try PUT <key> <int>, GET <key>, STATUS, LEAVE <id>, HELP, or EXIT"
            )),
        }
    }
}
