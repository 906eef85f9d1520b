//! Per-client FIFO of pending order packets, plus the readiness predicate
//! that gates simulation advancement.

use std::collections::{BTreeSet, HashMap, VecDeque};

use crate::error::LockstepError;
use crate::net::ClientId;

/// `{ live_clients, queues, quit_clients }`.
///
/// Invariant: a client is *playing in frame f* iff it is in `live_clients`
/// and not in `quit_clients`; readiness requires every playing client to
/// have at least one queued packet.
#[derive(Debug, Default)]
pub struct FrameData {
    live_clients: BTreeSet<ClientId>,
    quit_clients: BTreeSet<ClientId>,
    queues: HashMap<ClientId, VecDeque<Vec<u8>>>,
}

impl FrameData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_client(&mut self, client: ClientId) {
        self.live_clients.insert(client);
        self.queues.entry(client).or_default();
    }

    /// Idempotent: a client that has already quit stays quit.
    pub fn client_quit(&mut self, client: ClientId) {
        self.quit_clients.insert(client);
    }

    /// Playing clients in ascending `ClientId` order — the tie-break rule
    /// that makes order dispatch deterministic across peers.
    pub fn clients_playing_in_frame(&self) -> Vec<ClientId> {
        self.live_clients
            .iter()
            .filter(|c| !self.quit_clients.contains(c))
            .copied()
            .collect()
    }

    pub fn add_frame_orders(&mut self, client: ClientId, packet: Vec<u8>) -> Result<(), LockstepError> {
        self.queues
            .get_mut(&client)
            .ok_or(LockstepError::UnknownClient(client))?
            .push_back(packet);
        Ok(())
    }

    pub fn is_ready_for_frame(&self) -> bool {
        self.clients_playing_in_frame()
            .iter()
            .all(|c| self.has_pending(*c))
    }

    pub fn clients_not_ready_for_frame(&self) -> Vec<ClientId> {
        self.clients_playing_in_frame()
            .into_iter()
            .filter(|c| !self.has_pending(*c))
            .collect()
    }

    fn has_pending(&self, client: ClientId) -> bool {
        self.queues
            .get(&client)
            .map(|q| !q.is_empty())
            .unwrap_or(false)
    }

    pub fn buffer_size_for_client(&self, client: ClientId) -> usize {
        self.queues.get(&client).map(VecDeque::len).unwrap_or(0)
    }

    /// Pops exactly one packet per playing client, in ascending `ClientId`
    /// order, splits each packet into individual orders via `split` (the
    /// only collaborator that understands the concatenated-order encoding),
    /// and yields `(client, order)` pairs flattened in that order: ascending
    /// `ClientId`, then serialization order within one client's packet.
    ///
    /// This is the total order that must be bit-identical across every
    /// peer for sync hashes to agree.
    pub fn orders_for_frame(&mut self, split: impl Fn(&[u8]) -> Vec<Vec<u8>>) -> Vec<(ClientId, Vec<u8>)> {
        let mut out = Vec::new();
        for client in self.clients_playing_in_frame() {
            if let Some(packet) = self.queues.get_mut(&client).and_then(VecDeque::pop_front) {
                for order in split(&packet) {
                    out.push((client, order));
                }
            }
        }
        out
    }
}
