//! `ReplayConnection`: plays back a previously recorded `(client, packet)`
//! stream. Outbound sends are no-ops; `receive` yields the recorded packets
//! in order, one drain-call at a time, on a synthetic clock driven entirely
//! by how often the caller calls `receive`.

use std::sync::Mutex;

use crate::net::{ClientId, NetFrame, Order};
use crate::replay_sink::ReplaySink;

use super::{Connection, ConnectionState};

/// Replayed sessions never transition past `PreConnecting` — there is no
/// socket, so there is nothing to connect or disconnect.
pub struct ReplayConnection {
    remaining: Mutex<std::collections::VecDeque<(ClientId, Vec<u8>)>>,
    local_client_id: ClientId,
}

impl ReplayConnection {
    /// `recording` is consumed in order; `local_client_id` is reported by
    /// `client_id()` so an `OrderManager` built around a replay can still
    /// reason about "which client is ours" for catch-up math.
    pub fn new(recording: Vec<(ClientId, Vec<u8>)>, local_client_id: ClientId) -> Self {
        Self {
            remaining: Mutex::new(recording.into()),
            local_client_id,
        }
    }

    pub fn from_file(
        path: impl AsRef<std::path::Path>,
        local_client_id: ClientId,
    ) -> std::io::Result<Self> {
        let recording = crate::replay_sink::read_replay_file(path)?;
        Ok(Self::new(recording, local_client_id))
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining.lock().unwrap().is_empty()
    }
}

impl Connection for ReplayConnection {
    fn send_frame(&self, _frame: NetFrame, _orders: &[Order]) {}

    fn send_immediate(&self, _orders: &[Order]) {}

    fn send_sync(&self, _frame: NetFrame, _hash: u32) {}

    fn receive(&self, visitor: &mut dyn FnMut(ClientId, &[u8])) {
        let mut remaining = self.remaining.lock().unwrap();
        while let Some((client, payload)) = remaining.pop_front() {
            visitor(client, &payload);
        }
    }

    fn start_recording(&self, _sink: Box<dyn ReplaySink>) {}

    fn dispose(&self) {}

    fn state(&self) -> ConnectionState {
        ConnectionState::PreConnecting
    }

    fn client_id(&self) -> Option<ClientId> {
        Some(self.local_client_id)
    }

    fn error_message(&self) -> Option<String> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn receive_feeds_packets_in_recorded_order() {
        let recording = vec![
            (ClientId(2), vec![1]),
            (ClientId(3), vec![2]),
        ];
        let conn = ReplayConnection::new(recording, ClientId(1));

        let mut seen = Vec::new();
        conn.receive(&mut |client, payload| seen.push((client, payload.to_vec())));

        assert_eq!(seen, vec![(ClientId(2), vec![1]), (ClientId(3), vec![2])]);
        assert!(conn.is_exhausted());
    }

    #[test]
    fn sends_are_noops() {
        let conn = ReplayConnection::new(Vec::new(), ClientId(1));
        conn.send_frame(1, &[vec![1, 2, 3]]);
        conn.send_immediate(&[vec![1]]);
        conn.send_sync(1, 0xAB);
        assert!(conn.is_exhausted());
    }
}
