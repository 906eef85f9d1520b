//! The relay server: accepts connections, assigns client ids, and
//! rebroadcasts packets between clients.
//!
//! Accepts TCP connections, performs the handshake, assigns `ClientId`s,
//! rebroadcasts every packet it receives to every connected client
//! (including the sender — lockstep clients dispatch their own orders
//! through the same receive path as everyone else's), and acknowledges
//! order-frame packets so senders can drain their `AwaitingAck` FIFO.

use std::collections::HashMap;
use std::io::Write;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use anyhow::Context;
use tracing::{debug, info, warn};

use lockstep_core::codec::{self, encode_ack, encode_disconnect};
use lockstep_core::error::ConnectionError;
use lockstep_core::net::{ClientId, HANDSHAKE_VERSION};

type ClientMap = Arc<Mutex<HashMap<ClientId, TcpStream>>>;

/// Relay server state.
pub struct RelayServer {
    listener: TcpListener,
    password: String,
    clients: ClientMap,
    next_client_id: Arc<AtomicU32>,
}

impl RelayServer {
    /// Binds the relay's listen socket. `password` is the handshake
    /// password every connecting client must send (empty string means no
    /// password required).
    pub fn bind(addr: SocketAddr, password: impl Into<String>) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(addr).context("bind relay listen socket")?;
        Ok(Self {
            listener,
            password: password.into(),
            clients: Arc::new(Mutex::new(HashMap::new())),
            next_client_id: Arc::new(AtomicU32::new(1)),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts connections forever, spawning one handler thread per client.
    /// Each handler thread owns that client's read half; relaying to other
    /// clients happens by locking `clients` and writing directly.
    pub fn run(&self) -> anyhow::Result<()> {
        loop {
            self.accept_one()?;
        }
    }

    /// Accepts exactly one connection, performs its handshake, and spawns
    /// its handler thread. Exposed separately so tests and a bounded
    /// "serve N clients" loop don't need `run`'s infinite loop.
    pub fn accept_one(&self) -> anyhow::Result<ClientId> {
        let (stream, peer) = self.listener.accept().context("accept relay connection")?;
        let id = self.handshake(stream, peer)?;
        Ok(id)
    }

    fn handshake(&self, mut stream: TcpStream, peer: SocketAddr) -> anyhow::Result<ClientId> {
        let password = codec::read_client_packet(&mut stream).context("read handshake password frame")?;
        if !self.password.is_empty() && password != self.password.as_bytes() {
            let _ = stream.shutdown(std::net::Shutdown::Both);
            return Err(ConnectionError::AuthenticationFailed {
                reason: "password mismatch".to_string(),
            }
            .into());
        }

        let id = ClientId(self.next_client_id.fetch_add(1, Ordering::SeqCst));
        stream
            .write_all(&HANDSHAKE_VERSION.to_le_bytes())
            .context("write handshake version")?;
        stream.write_all(&id.0.to_le_bytes()).context("write assigned client id")?;

        let read_half = stream.try_clone().context("clone client stream for reader thread")?;
        self.clients.lock().unwrap().insert(id, stream);

        info!(client_id = ?id, %peer, "client connected");

        let clients = Arc::clone(&self.clients);
        thread::spawn(move || client_loop(read_half, id, clients));

        Ok(id)
    }
}

/// Body of a per-client reader thread: reads client→server packets (the
/// `len | payload` shape, no `fromClient` prefix) and rebroadcasts each one
/// to every connected client with `id` prefixed. Order-frame packets
/// (frame >= 1, no tag byte) additionally get an `Ack` sent back to `id`.
fn client_loop(mut stream: TcpStream, id: ClientId, clients: ClientMap) {
    loop {
        match codec::read_client_packet(&mut stream) {
            Ok(payload) => {
                broadcast(&clients, id, &payload);
                if let Some(frame) = order_frame_number(&payload) {
                    send_ack(&clients, id, frame, 1);
                }
            }
            Err(e) => {
                debug!(client_id = ?id, error = %e, "client disconnected");
                break;
            }
        }
    }

    clients.lock().unwrap().remove(&id);
    broadcast(&clients, id, &encode_disconnect(0));
}

/// Returns the frame number if `payload` is an ordinary order-frame packet
/// (frame >= 1, no order-header tag byte) — the only packet shape the
/// relay acknowledges.
fn order_frame_number(payload: &[u8]) -> Option<u32> {
    if payload.len() < 4 {
        return None;
    }
    if codec::parse_disconnect(payload).is_some() || codec::parse_sync(payload).is_some() {
        return None;
    }
    let frame = u32::from_le_bytes(payload[0..4].try_into().unwrap());
    if frame == 0 {
        return None;
    }
    Some(frame)
}

fn send_ack(clients: &ClientMap, id: ClientId, frame_received: u32, frames_to_ack: u16) {
    let ack = encode_ack(frame_received, frames_to_ack);
    let mut clients = clients.lock().unwrap();
    if let Some(stream) = clients.get_mut(&id) {
        if let Err(e) = write_relayed(stream, id, &ack) {
            warn!(client_id = ?id, error = %e, "failed to send ack");
        }
    }
}

/// Rebroadcasts `payload` to every connected client (including `from`
/// itself), each prefixed with `len:u32 | fromClient:u32`.
fn broadcast(clients: &ClientMap, from: ClientId, payload: &[u8]) {
    let mut clients = clients.lock().unwrap();
    for (client_id, stream) in clients.iter_mut() {
        if let Err(e) = write_relayed(stream, from, payload) {
            warn!(client_id = ?client_id, error = %e, "failed to relay packet, dropping");
        }
    }
}

fn write_relayed(stream: &mut TcpStream, from: ClientId, payload: &[u8]) -> std::io::Result<()> {
    let mut frame = Vec::with_capacity(8 + payload.len());
    frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    frame.extend_from_slice(&from.0.to_le_bytes());
    frame.extend_from_slice(payload);
    stream.write_all(&frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::net::{IpAddr, Ipv4Addr};

    fn bind_ephemeral() -> RelayServer {
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0);
        RelayServer::bind(addr, "").unwrap()
    }

    #[test]
    fn handshake_assigns_sequential_client_ids() {
        let server = bind_ephemeral();
        let addr = server.local_addr().unwrap();

        let client_thread = thread::spawn(move || {
            let mut sock = TcpStream::connect(addr).unwrap();
            sock.write_all(&0u32.to_le_bytes()).unwrap(); // empty password frame
            let mut header = [0u8; 8];
            sock.read_exact(&mut header).unwrap();
            u32::from_le_bytes(header[4..8].try_into().unwrap())
        });

        let id = server.accept_one().unwrap();
        let client_saw = client_thread.join().unwrap();
        assert_eq!(id, ClientId(1));
        assert_eq!(client_saw, 1);
    }

    #[test]
    fn rejects_wrong_password() {
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0);
        let server = RelayServer::bind(addr, "secret").unwrap();
        let addr = server.local_addr().unwrap();

        let client_thread = thread::spawn(move || {
            let mut sock = TcpStream::connect(addr).unwrap();
            let bad = b"wrong";
            sock.write_all(&(bad.len() as u32).to_le_bytes()).unwrap();
            sock.write_all(bad).unwrap();
            let mut header = [0u8; 8];
            sock.read_exact(&mut header).is_err()
        });

        let err = server.accept_one().unwrap_err();
        assert!(err.to_string().contains("authentication failed"));
        assert!(client_thread.join().unwrap());
    }
}
