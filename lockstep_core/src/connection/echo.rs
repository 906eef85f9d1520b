//! `EchoConnection`: in-process loopback used for shellmap/solo play, so a
//! solo game shares one code path with multiplayer instead of forking the
//! `OrderManager` loop around a "no network" special case.

use std::sync::Mutex;

use crate::net::{ClientId, NetFrame, Order};
use crate::replay_sink::ReplaySink;

use super::{Connection, ConnectionState};

/// The local client id every `EchoConnection` reports — solo play has no
/// server to assign one.
pub const LOCAL_CLIENT_ID: ClientId = ClientId(1);

/// `send_*` bypass the socket entirely and enqueue straight onto the
/// inbound list as if `LOCAL_CLIENT_ID` had sent them. State never leaves
/// `PreConnecting`: there is no handshake to complete.
pub struct EchoConnection {
    received: Mutex<Vec<(ClientId, Vec<u8>)>>,
    sink: Mutex<Option<Box<dyn ReplaySink>>>,
}

impl EchoConnection {
    pub fn new() -> Self {
        Self {
            received: Mutex::new(Vec::new()),
            sink: Mutex::new(None),
        }
    }

    fn enqueue(&self, payload: Vec<u8>) {
        if let Some(sink) = self.sink.lock().unwrap().as_mut() {
            sink.record(LOCAL_CLIENT_ID, &payload);
        }
        self.received.lock().unwrap().push((LOCAL_CLIENT_ID, payload));
    }
}

impl Default for EchoConnection {
    fn default() -> Self {
        Self::new()
    }
}

impl Connection for EchoConnection {
    fn send_frame(&self, frame: NetFrame, orders: &[Order]) {
        if orders.is_empty() {
            return;
        }
        let packet = crate::codec::encode_order_frame(frame, orders);
        self.enqueue(packet);
    }

    fn send_immediate(&self, orders: &[Order]) {
        for order in orders {
            self.enqueue(crate::codec::encode_immediate(order));
        }
    }

    fn send_sync(&self, frame: NetFrame, hash: u32) {
        self.enqueue(crate::codec::encode_sync(frame, hash).to_vec());
    }

    fn receive(&self, visitor: &mut dyn FnMut(ClientId, &[u8])) {
        let drained: Vec<(ClientId, Vec<u8>)> = std::mem::take(&mut *self.received.lock().unwrap());
        for (client, payload) in drained {
            visitor(client, &payload);
        }
    }

    fn start_recording(&self, sink: Box<dyn ReplaySink>) {
        *self.sink.lock().unwrap() = Some(sink);
    }

    fn dispose(&self) {}

    fn state(&self) -> ConnectionState {
        ConnectionState::PreConnecting
    }

    fn client_id(&self) -> Option<ClientId> {
        Some(LOCAL_CLIENT_ID)
    }

    fn error_message(&self) -> Option<String> {
        None
    }
}
