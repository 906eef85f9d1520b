//! The lockstep tick state machine: drives the packet codec, connection,
//! frame-data queue, and sync checker to advance the simulation one
//! net-frame at a time, only once every playing client has supplied orders
//! for that frame.
//!
//! `OrderManager` never owns a [`crate::world::World`] or
//! [`crate::world::OrderProcessor`] — both are passed in by the caller on
//! every tick (see the module doc on `world`), so neither side holds a
//! back-pointer to the other.

use std::sync::Arc;

use crate::codec;
use crate::connection::Connection;
use crate::error::LockstepError;
use crate::frame_data::FrameData;
use crate::net::{ClientId, NetFrame, Order};
use crate::sync::{NullSyncReport, SyncChecker, SyncReport};
use crate::world::{OrderProcessor, World};

/// How often `send_orders` transmits a keepalive packet even when
/// `local_orders` is empty, so the relay's order-latency tracking never
/// starves waiting on a silent client.
const KEEPALIVE_INTERVAL: NetFrame = 30;

/// Tunables fixed for the lifetime of an `OrderManager`.
#[derive(Debug, Clone, Copy)]
pub struct OrderManagerConfig {
    /// A net-tick occurs when `local_frame % net_tick_scale == 0`.
    pub net_tick_scale: u32,
    /// A sync hash is sent every `net_frame % sync_frame_scale == 0`.
    pub sync_frame_scale: u32,
    /// Whether buffer-depth catch-up is active.
    pub should_use_catchup: bool,
}

impl Default for OrderManagerConfig {
    fn default() -> Self {
        Self {
            net_tick_scale: 1,
            sync_frame_scale: 10,
            should_use_catchup: true,
        }
    }
}

/// Frame bookkeeping, pending local orders, and the collaborators it
/// exclusively owns (`FrameData`, `SyncChecker`).
pub struct OrderManager {
    connection: Arc<dyn Connection>,
    local_client_id: ClientId,
    config: OrderManagerConfig,

    frame_data: FrameData,
    sync_checker: SyncChecker,

    local_frame: u64,
    net_frame: NetFrame,
    next_order_frame: NetFrame,
    order_latency: u32,

    local_orders: Vec<Order>,
    local_immediate: Vec<Order>,
    received_immediate: Vec<(ClientId, Vec<u8>)>,

    is_catching_up: bool,
    game_started: bool,
    sync_reporting_enabled: bool,
    disposed: bool,

    /// Set when resuming from a game save; `send_orders`/`process_orders`
    /// skip re-transmitting frames/syncs already recorded in the save.
    game_save_last_frame: Option<NetFrame>,
    game_save_last_sync_frame: Option<NetFrame>,
}

impl OrderManager {
    pub fn new(connection: Arc<dyn Connection>, local_client_id: ClientId, config: OrderManagerConfig) -> Self {
        Self {
            connection,
            local_client_id,
            config,
            frame_data: FrameData::new(),
            sync_checker: SyncChecker::new(),
            local_frame: 0,
            net_frame: 0,
            next_order_frame: 0,
            order_latency: 0,
            local_orders: Vec::new(),
            local_immediate: Vec::new(),
            received_immediate: Vec::new(),
            is_catching_up: false,
            game_started: false,
            sync_reporting_enabled: false,
            disposed: false,
            game_save_last_frame: None,
            game_save_last_sync_frame: None,
        }
    }

    /// Resumes from a game save: frames/syncs up to these numbers were
    /// already exchanged before the save and must not be re-sent.
    pub fn resume_from_save(&mut self, last_frame: NetFrame, last_sync_frame: NetFrame) {
        self.game_save_last_frame = Some(last_frame);
        self.game_save_last_sync_frame = Some(last_sync_frame);
    }

    pub fn local_frame(&self) -> u64 {
        self.local_frame
    }

    pub fn net_frame(&self) -> NetFrame {
        self.net_frame
    }

    pub fn is_catching_up(&self) -> bool {
        self.is_catching_up
    }

    pub fn frame_data(&self) -> &FrameData {
        &self.frame_data
    }

    fn is_net_tick(&self) -> bool {
        self.local_frame % self.config.net_tick_scale as u64 == 0
    }

    /// Appends `order` to `local_immediate` if flagged immediate, else to
    /// `local_orders`.
    pub fn issue(&mut self, order: Order, is_immediate: bool) {
        if is_immediate {
            self.local_immediate.push(order);
        } else {
            self.local_orders.push(order);
        }
    }

    /// Idempotent. Registers every lobby client (and the local client) into
    /// `FrameData`, enables or disables sync reporting, resets frame
    /// counters, and primes the relay's order-latency tracking with one
    /// empty `send_orders` call.
    pub fn start_game(&mut self, lobby_clients: &[ClientId], sync_reporting_enabled: bool) {
        if self.game_started {
            return;
        }
        self.game_started = true;

        for &client in lobby_clients {
            self.frame_data.add_client(client);
        }
        self.frame_data.add_client(self.local_client_id);

        self.sync_reporting_enabled = sync_reporting_enabled;
        self.net_frame = 1;
        self.next_order_frame = 1;

        // Unconditional priming send, bypassing the usual "non-empty or
        // keepalive" gate in `send_orders`: the relay needs one order
        // packet up front to start tracking this client's order latency.
        // `Connection::send_frame` itself still no-ops on an empty order
        // list, so this is a bookkeeping-only frame advance unless
        // `local_orders` was already populated.
        self.send_orders_unconditional();
    }

    /// Drives the pregame phase (lobby chat, mod switches): immediates flow
    /// both ways, but no frame orders are exchanged yet.
    pub fn tick_pregame<W: World>(&mut self, world: &mut W, processor: &mut dyn OrderProcessor<W>) {
        self.send_immediate_orders();
        let mut report = NullSyncReport;
        let _ = self.receive_all_and_check_sync(&mut report);
        self.process_immediate_orders(world, processor);
    }

    fn send_immediate_orders(&mut self) {
        if self.local_immediate.is_empty() {
            return;
        }
        let orders = std::mem::take(&mut self.local_immediate);
        self.connection.send_immediate(&orders);
    }

    /// Drains `connection.receive`, classifying each packet:
    /// disconnect notices go to `FrameData::client_quit`, sync-hash packets
    /// go to the `SyncChecker`, frame-0 packets are buffered as immediates,
    /// and everything else is a frame-order packet for `FrameData`.
    fn receive_all_and_check_sync(&mut self, report: &mut dyn SyncReport) -> Result<(), LockstepError> {
        let mut classified: Vec<(ClientId, Vec<u8>)> = Vec::new();
        self.connection
            .receive(&mut |client, payload| classified.push((client, payload.to_vec())));

        for (client, payload) in classified {
            if let Some(_frame) = codec::parse_disconnect(&payload) {
                self.frame_data.client_quit(client);
                continue;
            }
            if codec::parse_sync(&payload).is_some() {
                let frame = u32::from_le_bytes(payload[0..4].try_into().unwrap());
                self.sync_checker.check(frame, &payload, report)?;
                continue;
            }
            if payload.len() >= 4 && payload[0..4] == [0u8, 0, 0, 0] {
                self.received_immediate.push((client, payload));
                continue;
            }
            self.frame_data.add_frame_orders(client, payload)?;
        }
        Ok(())
    }

    /// For each buffered immediate, deserializes and dispatches it through
    /// `processor`. Re-checks `disposed` after each dispatch, since an
    /// immediate may trigger mod-switch/teardown mid-loop.
    fn process_immediate_orders<W: World>(&mut self, world: &mut W, processor: &mut dyn OrderProcessor<W>) {
        let buffered = std::mem::take(&mut self.received_immediate);
        for (client, payload) in buffered {
            if self.disposed {
                break;
            }
            let order = &payload[4..];
            world.run_unsynced(self.sync_reporting_enabled, |world| {
                processor.process_order(self, world, client, order);
            });
        }
    }

    /// Transmits `(next_order_frame, local_orders)` if `net_frame >= 1` and
    /// either `local_orders` is non-empty or a keepalive is due. Skipped
    /// entirely when resuming a save whose recorded frames already cover
    /// `next_order_frame`.
    fn send_orders(&mut self) {
        if self.net_frame < 1 {
            return;
        }
        if let Some(last) = self.game_save_last_frame {
            if last >= self.next_order_frame {
                return;
            }
        }

        let due_for_keepalive = self.next_order_frame % KEEPALIVE_INTERVAL == 0;
        if self.local_orders.is_empty() && !due_for_keepalive {
            return;
        }

        self.send_orders_unconditional();
    }

    fn send_orders_unconditional(&mut self) {
        let orders = std::mem::take(&mut self.local_orders);
        self.connection.send_frame(self.next_order_frame, &orders);
        self.next_order_frame += 1;
    }

    /// At a net-tick: drains one packet per live client from `FrameData`,
    /// dispatches every order it contains (in the deterministic
    /// ascending-ClientId, then intra-packet order), optionally emits a
    /// sync hash, and advances `net_frame`.
    fn process_orders<W: World>(
        &mut self,
        world: &mut W,
        processor: &mut dyn OrderProcessor<W>,
        report: &mut dyn SyncReport,
        split_orders: impl Fn(&[u8]) -> Vec<Vec<u8>>,
    ) {
        let dispatched = self.frame_data.orders_for_frame(split_orders);
        for (client, order) in dispatched {
            processor.process_order(self, world, client, &order);
        }

        if self.net_frame % self.config.sync_frame_scale == 0 {
            let past_save = self
                .game_save_last_sync_frame
                .is_some_and(|last| self.net_frame > last);
            let hash = if past_save { 0 } else { world.sync_hash() };
            self.connection.send_sync(self.net_frame, hash);
        }

        if self.sync_reporting_enabled {
            report.capture_snapshot(self.net_frame);
        }

        self.net_frame += 1;
    }

    /// The master tick state machine. Returns whether a net-frame was
    /// actually processed this call.
    pub fn try_tick<W: World>(
        &mut self,
        world: &mut W,
        processor: &mut dyn OrderProcessor<W>,
        report: &mut dyn SyncReport,
        split_orders: impl Fn(&[u8]) -> Vec<Vec<u8>>,
    ) -> Result<bool, LockstepError> {
        let is_net_tick = self.is_net_tick();

        let should_tick = is_net_tick && self.non_local_clients_ready();
        if should_tick {
            self.send_orders();
        }

        self.send_immediate_orders();
        self.receive_all_and_check_sync(report)?;
        self.process_immediate_orders(world, processor);
        self.compensate_for_latency();

        let mut will_tick = false;
        if should_tick && is_net_tick && self.frame_data.is_ready_for_frame() {
            self.process_orders(world, processor, report, split_orders);
            will_tick = true;
        }

        if will_tick {
            self.local_frame += 1;
        }
        Ok(will_tick)
    }

    /// `should_tick` excludes the local client: it can always self-produce
    /// orders for the current frame, so only peers gate readiness.
    fn non_local_clients_ready(&self) -> bool {
        self.frame_data
            .clients_playing_in_frame()
            .into_iter()
            .filter(|client| *client != self.local_client_id)
            .all(|client| self.frame_data.buffer_size_for_client(client) > 0)
    }

    /// Buffer-depth catch-up (a latency-based alternative was considered
    /// and dropped). `catchup = max(0, backlog - 1)`; the outer game loop
    /// is expected to call `try_tick` more than once per render frame
    /// while `is_catching_up()` is true.
    fn compensate_for_latency(&mut self) {
        let backlog = self.frame_data.buffer_size_for_client(self.local_client_id);
        let catchup = backlog.saturating_sub(1);
        self.is_catching_up = self.config.should_use_catchup && catchup > 0;
    }

    /// Closes the underlying connection. Idempotent; subsequent calls to
    /// `try_tick` will simply observe `connection.state() == NotConnected`.
    pub fn dispose(&mut self) {
        self.disposed = true;
        self.connection.dispose();
    }

    pub fn order_latency(&self) -> u32 {
        self.order_latency
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::echo::EchoConnection;

    struct FakeWorld {
        hash: u32,
        timestep_ms: u32,
    }

    impl World for FakeWorld {
        fn sync_hash(&self) -> u32 {
            self.hash
        }

        fn timestep_ms(&self) -> u32 {
            self.timestep_ms
        }
    }

    struct RecordingProcessor {
        dispatched: Vec<(ClientId, Vec<u8>)>,
    }

    impl OrderProcessor<FakeWorld> for RecordingProcessor {
        fn process_order(&mut self, _manager: &mut OrderManager, world: &mut FakeWorld, from_client: ClientId, order: &[u8]) {
            self.dispatched.push((from_client, order.to_vec()));
            world.hash = world.hash.wrapping_add(1);
        }
    }

    fn split_single(packet: &[u8]) -> Vec<Vec<u8>> {
        vec![packet.to_vec()]
    }

    #[test]
    fn start_game_is_idempotent_and_primes_next_order_frame() {
        let connection: Arc<dyn Connection> = Arc::new(EchoConnection::new());
        let mut manager = OrderManager::new(connection, ClientId(1), OrderManagerConfig::default());

        manager.start_game(&[ClientId(2)], false);
        assert_eq!(manager.net_frame(), 1);

        manager.net_frame = 99;
        manager.start_game(&[ClientId(2)], false);
        assert_eq!(manager.net_frame(), 99, "second start_game call must be a no-op");
    }

    #[test]
    fn try_tick_advances_net_frame_only_when_ready() {
        let connection: Arc<dyn Connection> = Arc::new(EchoConnection::new());
        let mut manager = OrderManager::new(Arc::clone(&connection), ClientId(1), OrderManagerConfig::default());
        manager.start_game(&[ClientId(2)], false);

        let mut world = FakeWorld { hash: 0, timestep_ms: 8 };
        let mut processor = RecordingProcessor { dispatched: Vec::new() };
        let mut report = NullSyncReport;

        // Client 2 has not submitted anything for frame 1 yet: not ready.
        let ticked = manager
            .try_tick(&mut world, &mut processor, &mut report, split_single)
            .unwrap();
        assert!(!ticked);
        assert_eq!(manager.net_frame(), 1);

        // Feed both clients' orders for frame 1 directly into FrameData, as
        // the receive-classification step would after real packets arrived.
        manager.frame_data.add_frame_orders(ClientId(1), vec![3]).unwrap();
        manager.frame_data.add_frame_orders(ClientId(2), vec![7]).unwrap();

        let ticked = manager
            .try_tick(&mut world, &mut processor, &mut report, split_single)
            .unwrap();
        assert!(ticked);
        assert_eq!(manager.net_frame(), 2);
        assert_eq!(manager.local_frame(), 1);
        assert_eq!(processor.dispatched, vec![(ClientId(1), vec![3]), (ClientId(2), vec![7])]);
    }

    #[test]
    fn issue_routes_immediate_vs_frame_orders() {
        let connection: Arc<dyn Connection> = Arc::new(EchoConnection::new());
        let mut manager = OrderManager::new(connection, ClientId(1), OrderManagerConfig::default());

        manager.issue(vec![1], true);
        manager.issue(vec![2], false);

        assert_eq!(manager.local_immediate, vec![vec![1]]);
        assert_eq!(manager.local_orders, vec![vec![2]]);
    }

    #[test]
    fn compensate_for_latency_is_backlog_minus_one() {
        let connection: Arc<dyn Connection> = Arc::new(EchoConnection::new());
        let mut manager = OrderManager::new(connection, ClientId(1), OrderManagerConfig::default());
        manager.frame_data.add_client(ClientId(1));

        manager.compensate_for_latency();
        assert!(!manager.is_catching_up());

        manager.frame_data.add_frame_orders(ClientId(1), vec![1]).unwrap();
        manager.frame_data.add_frame_orders(ClientId(1), vec![2]).unwrap();
        manager.frame_data.add_frame_orders(ClientId(1), vec![3]).unwrap();
        manager.compensate_for_latency();
        assert!(manager.is_catching_up());
    }
}
