//! `TcpConnection`: the networked implementation of [`super::Connection`].
//!
//! Owns two to three OS threads: one per pending connect attempt (until one
//! wins the race), and one long-lived receiver thread once the handshake
//! succeeds.

use std::io::Write;
use std::net::{SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::codec::{self, encode_disconnect, encode_immediate, encode_order_frame, encode_sync, OutBuffer};
use crate::error::ConnectionError;
use crate::net::{tag, ClientId, NetFrame, Order, HANDSHAKE_VERSION};
use crate::replay_sink::ReplaySink;

use super::shared::Shared;
use super::{Connection, ConnectionState};

/// Default deadline for the multi-endpoint connect race.
pub const CONNECT_DEADLINE: Duration = Duration::from_secs(5);

pub struct TcpConnection {
    shared: Arc<Shared>,
    write_half: Mutex<TcpStream>,
    receiver: Mutex<Option<thread::JoinHandle<()>>>,
}

impl TcpConnection {
    /// Races a connect attempt against every candidate `(addr, port)` tuple,
    /// accepts the first to succeed, performs the handshake (optionally
    /// sending `password` first), and starts the receiver thread.
    pub fn connect(
        candidates: &[SocketAddr],
        password: Option<&str>,
        deadline: Duration,
    ) -> Result<Self, ConnectionError> {
        let stream = Self::race_connect(candidates, deadline)?;
        Self::from_stream(stream, password, deadline)
    }

    fn race_connect(candidates: &[SocketAddr], deadline: Duration) -> Result<TcpStream, ConnectionError> {
        let (tx, rx) = mpsc::channel::<TcpStream>();
        let won = Arc::new(AtomicBool::new(false));

        let handles: Vec<_> = candidates
            .iter()
            .copied()
            .map(|addr| {
                let tx = tx.clone();
                let won = Arc::clone(&won);
                thread::spawn(move || {
                    if let Ok(stream) = TcpStream::connect_timeout(&addr, deadline) {
                        if won
                            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                            .is_ok()
                        {
                            let _ = tx.send(stream);
                        }
                        // Otherwise another attempt already won; dropping
                        // `stream` here closes this now-redundant socket.
                    }
                })
            })
            .collect();
        drop(tx);

        let result = rx.recv_timeout(deadline);
        for handle in handles {
            let _ = handle.join();
        }

        result.map_err(|_| ConnectionError::ConnectFailure {
            attempted: candidates.len(),
            deadline_secs: deadline.as_secs(),
        })
    }

    fn from_stream(
        mut stream: TcpStream,
        password: Option<&str>,
        read_timeout: Duration,
    ) -> Result<Self, ConnectionError> {
        // Always send a (possibly empty) password frame: the relay reads
        // exactly one of these per connection before writing its handshake
        // reply, so there is no "maybe send, maybe don't" ambiguity on the
        // wire.
        let bytes = password.unwrap_or("").as_bytes();
        let mut frame = Vec::with_capacity(4 + bytes.len());
        frame.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
        frame.extend_from_slice(bytes);
        stream
            .write_all(&frame)
            .map_err(|e| ConnectionError::Io(e.to_string()))?;

        stream
            .set_read_timeout(Some(read_timeout))
            .map_err(|e| ConnectionError::Io(e.to_string()))?;

        let mut header = [0u8; 8];
        std::io::Read::read_exact(&mut stream, &mut header)
            .map_err(|e| ConnectionError::Io(e.to_string()))?;
        let protocol = u32::from_le_bytes(header[0..4].try_into().unwrap());
        if protocol != HANDSHAKE_VERSION {
            return Err(ConnectionError::HandshakeVersionMismatch {
                ours: HANDSHAKE_VERSION,
                theirs: protocol,
            });
        }
        let client_id = ClientId(u32::from_le_bytes(header[4..8].try_into().unwrap()));

        stream
            .set_read_timeout(None)
            .map_err(|e| ConnectionError::Io(e.to_string()))?;

        let shared = Arc::new(Shared::new());
        shared.set_client_id(client_id);
        shared.set_state(ConnectionState::Connected);
        info!(client_id = ?client_id, "handshake complete");

        let write_half = stream
            .try_clone()
            .map_err(|e| ConnectionError::Io(e.to_string()))?;

        let receiver_shared = Arc::clone(&shared);
        let handle = thread::spawn(move || receiver_loop(stream, receiver_shared, client_id));

        Ok(Self {
            shared,
            write_half: Mutex::new(write_half),
            receiver: Mutex::new(Some(handle)),
        })
    }

    fn write_buffer(&self, buf: &OutBuffer) {
        if buf.is_empty() {
            return;
        }
        let mut stream = self.write_half.lock().unwrap();
        // Swallowed: the receiver thread independently detects I/O
        // failure and publishes NotConnected.
        if let Err(e) = stream.write_all(buf.as_slice()) {
            warn!(error = %e, "send failed, deferring to receiver thread for disconnect detection");
        }
    }

    fn flush_queued_syncs(&self, buf: &mut OutBuffer) {
        let queued: Vec<Vec<u8>> = std::mem::take(&mut *self.shared.queued_sync_packets.lock().unwrap());
        if queued.is_empty() {
            return;
        }
        let local = self.shared.client_id();
        for sync_packet in queued {
            buf.write_len_prefixed(&sync_packet);
            if let Some(local) = local {
                self.shared.dispatch_inbound(local, sync_packet);
            }
        }
    }
}

impl Connection for TcpConnection {
    fn send_frame(&self, frame: NetFrame, orders: &[Order]) {
        let mut buf = OutBuffer::with_capacity(32);
        if !orders.is_empty() {
            let ack_payload: Vec<u8> = orders.iter().flatten().copied().collect();
            self.shared.awaiting_ack.lock().unwrap().push_back(ack_payload);
            let packet = encode_order_frame(frame, orders);
            buf.write_len_prefixed(&packet);
        }
        self.flush_queued_syncs(&mut buf);
        self.write_buffer(&buf);
    }

    fn send_immediate(&self, orders: &[Order]) {
        let mut buf = OutBuffer::with_capacity(32);
        for order in orders {
            let packet = encode_immediate(order);
            buf.write_len_prefixed(&packet);
        }
        self.write_buffer(&buf);
    }

    fn send_sync(&self, frame: NetFrame, hash: u32) {
        let packet = encode_sync(frame, hash);
        self.shared.queued_sync_packets.lock().unwrap().push(packet.to_vec());
    }

    fn receive(&self, visitor: &mut dyn FnMut(ClientId, &[u8])) {
        self.shared.drain_received(visitor);
    }

    fn start_recording(&self, sink: Box<dyn ReplaySink>) {
        *self.shared.replay_sink.lock().unwrap() = Some(sink);
    }

    fn dispose(&self) {
        if self.shared.state() == ConnectionState::NotConnected {
            return;
        }
        self.shared.set_state(ConnectionState::NotConnected);
        if let Ok(stream) = self.write_half.lock().unwrap().try_clone() {
            let _ = stream.shutdown(std::net::Shutdown::Both);
        }
        if let Some(handle) = self.receiver.lock().unwrap().take() {
            let _ = handle.join();
        }
    }

    fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    fn client_id(&self) -> Option<ClientId> {
        self.shared.client_id()
    }

    fn error_message(&self) -> Option<String> {
        self.shared.error_message()
    }
}

/// Body of the receiver thread, started once the handshake succeeds.
///
/// On any read error: sets `error_message`, publishes `NotConnected`, and
/// returns (thread terminates).
fn receiver_loop(mut stream: TcpStream, shared: Arc<Shared>, local_client_id: ClientId) {
    loop {
        match codec::read_packet(&mut stream) {
            Ok((from_client, payload)) => {
                if from_client == local_client_id && payload.len() == 7 && payload[4] == tag::ACK {
                    if let Err(e) = handle_ack(&shared, &payload) {
                        shared.set_error_message(e.to_string());
                        shared.set_state(ConnectionState::NotConnected);
                        return;
                    }
                } else {
                    shared.dispatch_inbound(from_client, payload);
                }
            }
            Err(e) => {
                debug!(error = %e, "receiver thread exiting");
                shared.set_error_message(e.to_string());
                shared.set_state(ConnectionState::NotConnected);
                return;
            }
        }
    }
}

/// Parses `(frameReceived, framesToAck)`, dequeues exactly `framesToAck`
/// entries from the awaiting-ack FIFO, and synthesizes an inbound packet
/// `frameReceived:u32 | concat(dequeued)` as if it arrived from the local
/// client — this is what feeds the replay sink and local order visibility.
fn handle_ack(shared: &Shared, payload: &[u8]) -> Result<(), ConnectionError> {
    let (frame_received, frames_to_ack) =
        codec::parse_ack(payload).ok_or_else(|| ConnectionError::Protocol("malformed ack packet".into()))?;

    let mut dequeued = Vec::with_capacity(frames_to_ack as usize);
    {
        let mut awaiting = shared.awaiting_ack.lock().unwrap();
        for _ in 0..frames_to_ack {
            match awaiting.pop_front() {
                Some(entry) => dequeued.push(entry),
                None => {
                    return Err(ConnectionError::AckUnderflow {
                        requested: frames_to_ack,
                        available: dequeued.len(),
                    })
                }
            }
        }
    }

    let mut synthesized = Vec::with_capacity(4 + dequeued.iter().map(Vec::len).sum::<usize>());
    synthesized.extend_from_slice(&frame_received.to_le_bytes());
    for entry in dequeued {
        synthesized.extend_from_slice(&entry);
    }

    shared.dispatch_inbound(local_client_from(shared), synthesized);
    Ok(())
}

fn local_client_from(shared: &Shared) -> ClientId {
    shared.client_id().expect("client id assigned before receiver thread starts")
}

/// Builds the 5-byte disconnect packet body used by [`crate::order_manager`]
/// when relaying its own disconnect notice — exposed here since only the
/// codec module otherwise needs to know the tag layout.
pub fn disconnect_packet(frame: NetFrame) -> [u8; 5] {
    encode_disconnect(frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::net::TcpListener;

    fn spawn_fake_server() -> (TcpListener, SocketAddr) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        (listener, addr)
    }

    fn read_password_frame(sock: &mut std::net::TcpStream) {
        let mut len_buf = [0u8; 4];
        sock.read_exact(&mut len_buf).unwrap();
        let len = u32::from_le_bytes(len_buf) as usize;
        let mut discard = vec![0u8; len];
        sock.read_exact(&mut discard).unwrap();
    }

    #[test]
    fn connect_handshake_assigns_client_id() {
        let (listener, addr) = spawn_fake_server();
        let server = thread::spawn(move || {
            let (mut sock, _) = listener.accept().unwrap();
            read_password_frame(&mut sock);
            sock.write_all(&HANDSHAKE_VERSION.to_le_bytes()).unwrap();
            sock.write_all(&7u32.to_le_bytes()).unwrap();
            // Keep the socket open briefly so the client's receiver thread
            // has something to block on.
            let mut discard = [0u8; 8];
            let _ = sock.read(&mut discard);
        });

        let conn = TcpConnection::connect(&[addr], None, Duration::from_secs(2)).unwrap();
        assert_eq!(conn.client_id(), Some(ClientId(7)));
        assert_eq!(conn.state(), ConnectionState::Connected);

        conn.dispose();
        server.join().unwrap();
    }

    #[test]
    fn connect_rejects_version_mismatch() {
        let (listener, addr) = spawn_fake_server();
        let server = thread::spawn(move || {
            let (mut sock, _) = listener.accept().unwrap();
            read_password_frame(&mut sock);
            sock.write_all(&999u32.to_le_bytes()).unwrap();
            sock.write_all(&1u32.to_le_bytes()).unwrap();
        });

        let err = TcpConnection::connect(&[addr], None, Duration::from_secs(2)).unwrap_err();
        assert!(matches!(err, ConnectionError::HandshakeVersionMismatch { .. }));
        server.join().unwrap();
    }

    #[test]
    fn connect_failure_when_nothing_listens() {
        // Port 1 is reserved and will refuse immediately, so this resolves
        // well inside the deadline.
        let addr: SocketAddr = "127.0.0.1:1".parse().unwrap();
        let err = TcpConnection::race_connect(&[addr], Duration::from_millis(500)).unwrap_err();
        assert!(matches!(err, ConnectionError::ConnectFailure { .. }));
    }
}
