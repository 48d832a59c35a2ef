//! Request/reply transport between replicas.
//!
//! Each call opens a fresh TCP connection, writes one length-prefixed bincode
//! frame, and reads one frame back. Messages are small and infrequent
//! (heartbeats every 50ms), so per-call connections keep the adapter trivial
//! and make disconnection symmetric: a peer is "connected" exactly while its
//! address is recorded here.
//!
//! Delivery is at-most-once and this layer never retries; the consensus
//! protocol tolerates the loss because the next heartbeat carries the same
//! state again.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::Mutex;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Error;
use crate::message::{Request, Response};

const CONNECT_TIMEOUT: Duration = Duration::from_millis(300);
pub(crate) const IO_TIMEOUT: Duration = Duration::from_secs(2);

/// Peer address book plus the outbound call path.
///
/// `connect_to_peer` only records the address; the dial happens on the next
/// `call`. Handlers may therefore register connections while holding the node
/// mutex without doing I/O under it.
#[derive(Debug, Default)]
pub struct Transport {
    peers: Mutex<HashMap<u64, String>>,
}

impl Transport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect_to_peer(&self, id: u64, addr: &str) {
        self.peers.lock().unwrap().insert(id, addr.to_string());
    }

    pub fn disconnect_peer(&self, id: u64) {
        self.peers.lock().unwrap().remove(&id);
    }

    pub fn disconnect_all(&self) {
        self.peers.lock().unwrap().clear();
    }

    pub fn is_connected(&self, id: u64) -> bool {
        self.peers.lock().unwrap().contains_key(&id)
    }

    pub fn peer_addresses(&self) -> HashMap<u64, String> {
        self.peers.lock().unwrap().clone()
    }

    /// Sends `request` to `peer` and waits for its reply.
    ///
    /// Fails promptly when the peer is not connected or unreachable; never
    /// blocks indefinitely thanks to the connect and I/O deadlines.
    pub fn call(&self, peer: u64, request: &Request) -> Result<Response, Error> {
        let addr = self
            .peers
            .lock()
            .unwrap()
            .get(&peer)
            .cloned()
            .ok_or(Error::PeerDisconnected(peer))?;
        let addr: SocketAddr = addr
            .parse()
            .map_err(|_| Error::PeerDisconnected(peer))?;

        let mut stream = TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT)?;
        stream.set_read_timeout(Some(IO_TIMEOUT))?;
        stream.set_write_timeout(Some(IO_TIMEOUT))?;

        write_frame(&mut stream, request)?;
        read_frame(&mut stream)
    }
}

/// Writes one length-prefixed frame: 4 bytes big-endian length, then the
/// bincode payload.
pub(crate) fn write_frame<T: Serialize>(stream: &mut TcpStream, value: &T) -> Result<(), Error> {
    let bytes = bincode::serialize(value)?;
    let len = bytes.len() as u32;
    stream.write_all(&len.to_be_bytes())?;
    stream.write_all(&bytes)?;
    Ok(())
}

/// Reads one length-prefixed frame and decodes it.
pub(crate) fn read_frame<T: DeserializeOwned>(stream: &mut TcpStream) -> Result<T, Error> {
    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf)?;
    let len = u32::from_be_bytes(len_buf) as usize;
    let mut buf = vec![0u8; len];
    stream.read_exact(&mut buf)?;
    Ok(bincode::deserialize(&buf)?)
}
