//! Cross-thread state shared between the game thread and a `TcpConnection`'s
//! receiver thread: one writer per field, guarded the way the field's
//! access pattern demands.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::Mutex;

use crate::net::ClientId;
use crate::replay_sink::ReplaySink;

use super::ConnectionState;

const STATE_PRE_CONNECTING: u8 = 0;
const STATE_CONNECTING: u8 = 1;
const STATE_CONNECTED: u8 = 2;
const STATE_NOT_CONNECTED: u8 = 3;

/// Sentinel meaning "no client id assigned yet".
const NO_CLIENT_ID: u32 = u32::MAX;

/// State shared by reference between the game thread and the receiver
/// thread. Single-writer per field: the receiver thread is the only writer
/// of `state`/`client_id`/`error_message`/`received_packets`; the game
/// thread is the only writer of `awaiting_ack` (enqueue) and
/// `queued_sync_packets` (both append and drain — the receiver thread never
/// touches it).
pub struct Shared {
    state: AtomicU8,
    client_id: AtomicU32,
    error_message: Mutex<Option<String>>,
    pub(super) received_packets: Mutex<VecDeque<(ClientId, Vec<u8>)>>,
    pub(super) awaiting_ack: Mutex<VecDeque<Vec<u8>>>,
    pub(super) queued_sync_packets: Mutex<Vec<Vec<u8>>>,
    pub(super) replay_sink: Mutex<Option<Box<dyn ReplaySink>>>,
}

impl Shared {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(STATE_PRE_CONNECTING),
            client_id: AtomicU32::new(NO_CLIENT_ID),
            error_message: Mutex::new(None),
            received_packets: Mutex::new(VecDeque::new()),
            awaiting_ack: Mutex::new(VecDeque::new()),
            queued_sync_packets: Mutex::new(Vec::new()),
            replay_sink: Mutex::new(None),
        }
    }

    pub fn state(&self) -> ConnectionState {
        match self.state.load(Ordering::Acquire) {
            STATE_PRE_CONNECTING => ConnectionState::PreConnecting,
            STATE_CONNECTING => ConnectionState::Connecting,
            STATE_CONNECTED => ConnectionState::Connected,
            _ => ConnectionState::NotConnected,
        }
    }

    pub fn set_state(&self, state: ConnectionState) {
        let raw = match state {
            ConnectionState::PreConnecting => STATE_PRE_CONNECTING,
            ConnectionState::Connecting => STATE_CONNECTING,
            ConnectionState::Connected => STATE_CONNECTED,
            ConnectionState::NotConnected => STATE_NOT_CONNECTED,
        };
        self.state.store(raw, Ordering::Release);
    }

    pub fn client_id(&self) -> Option<ClientId> {
        match self.client_id.load(Ordering::Acquire) {
            NO_CLIENT_ID => None,
            raw => Some(ClientId(raw)),
        }
    }

    pub fn set_client_id(&self, id: ClientId) {
        self.client_id.store(id.0, Ordering::Release);
    }

    pub fn error_message(&self) -> Option<String> {
        self.error_message.lock().unwrap().clone()
    }

    pub fn set_error_message(&self, message: impl Into<String>) {
        *self.error_message.lock().unwrap() = Some(message.into());
    }

    /// Dispatches one inbound packet: feeds the replay sink (if any) and
    /// enqueues it for `receive()` to drain.
    pub fn dispatch_inbound(&self, client: ClientId, payload: Vec<u8>) {
        if let Some(sink) = self.replay_sink.lock().unwrap().as_mut() {
            sink.record(client, &payload);
        }
        self.received_packets.lock().unwrap().push_back((client, payload));
    }

    pub fn drain_received(&self, visitor: &mut dyn FnMut(ClientId, &[u8])) {
        let drained: VecDeque<(ClientId, Vec<u8>)> =
            std::mem::take(&mut *self.received_packets.lock().unwrap());
        for (client, payload) in drained {
            visitor(client, &payload);
        }
    }
}

impl Default for Shared {
    fn default() -> Self {
        Self::new()
    }
}
