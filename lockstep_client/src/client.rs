//! A toy deterministic world + order processor bound to a `Connection` and
//! an `OrderManager`, so the lockstep tick loop has somewhere real to run
//! end to end.
//!
//! The world itself is intentionally minimal — one tracked position per
//! client, moved only by that client's own orders — since a real
//! simulation is out of scope here.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use lockstep_core::config::LockstepConfig;
use lockstep_core::connection::echo::EchoConnection;
use lockstep_core::connection::tcp::{TcpConnection, CONNECT_DEADLINE};
use lockstep_core::connection::Connection;
use lockstep_core::net::ClientId;
use lockstep_core::order_manager::{OrderManager, OrderManagerConfig};
use lockstep_core::sync::NullSyncReport;
use lockstep_core::world::{OrderProcessor, World};

use crate::input::InputState;

/// A unit's tracked position.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Position {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// One position per playing client. Good enough to exercise `World` and
/// `OrderProcessor` without pulling in a real simulation.
#[derive(Debug, Default)]
pub struct DemoWorld {
    positions: BTreeMap<ClientId, Position>,
}

impl DemoWorld {
    pub fn position_of(&self, client: ClientId) -> Position {
        self.positions.get(&client).copied().unwrap_or_default()
    }
}

impl World for DemoWorld {
    fn sync_hash(&self) -> u32 {
        // FNV-1a fold over every tracked position, in ascending ClientId
        // order (the map's natural iteration order) so it's bit-identical
        // across peers regardless of insertion order.
        let mut hash: u32 = 0x811c_9dc5;
        for (client, pos) in &self.positions {
            for word in [client.0, pos.x.to_bits(), pos.y.to_bits(), pos.z.to_bits()] {
                hash ^= word;
                hash = hash.wrapping_mul(0x0100_0193);
            }
        }
        hash
    }

    fn timestep_ms(&self) -> u32 {
        40
    }
}

/// Decodes a move order (`dx:f32 | dy:f32 | dz:f32`, little-endian) and
/// applies it to the sending client's tracked position.
pub struct MoveOrderProcessor;

impl OrderProcessor<DemoWorld> for MoveOrderProcessor {
    fn process_order(&mut self, _manager: &mut OrderManager, world: &mut DemoWorld, from_client: ClientId, order: &[u8]) {
        if order.len() != 12 {
            return;
        }
        let dx = f32::from_le_bytes(order[0..4].try_into().unwrap());
        let dy = f32::from_le_bytes(order[4..8].try_into().unwrap());
        let dz = f32::from_le_bytes(order[8..12].try_into().unwrap());

        let pos = world.positions.entry(from_client).or_default();
        pos.x += dx;
        pos.y += dy;
        pos.z += dz;
    }
}

/// Encodes one `InputState` sample into the wire form `MoveOrderProcessor`
/// understands.
pub fn encode_move_order(input: InputState) -> Vec<u8> {
    let mut out = Vec::with_capacity(12);
    out.extend_from_slice(&input.forward.to_le_bytes());
    out.extend_from_slice(&input.right.to_le_bytes());
    out.extend_from_slice(&input.up.to_le_bytes());
    out
}

/// Splits one `FrameData` packet into its individual 12-byte move orders
/// (frame orders within a packet are concatenated back to back, in the
/// sender's intra-packet serialization order).
pub fn split_move_orders(packet: &[u8]) -> Vec<Vec<u8>> {
    packet.chunks_exact(12).map(|chunk| chunk.to_vec()).collect()
}

/// Binds a `Connection`, an `OrderManager`, and a `DemoWorld` together.
pub struct GameClient {
    connection: Arc<dyn Connection>,
    pub manager: OrderManager,
    pub world: DemoWorld,
    processor: MoveOrderProcessor,
    report: NullSyncReport,
}

impl GameClient {
    /// Connects over TCP to the relay at `cfg.server_addr`.
    pub fn connect(cfg: &LockstepConfig) -> anyhow::Result<Self> {
        let addr = cfg.server_addr.parse().context("parse server_addr")?;
        let password = if cfg.password.is_empty() {
            None
        } else {
            Some(cfg.password.as_str())
        };
        let connection =
            TcpConnection::connect(&[addr], password, CONNECT_DEADLINE).context("connect to relay")?;
        let client_id = connection
            .client_id()
            .context("handshake did not assign a client id")?;
        info!(client_id = ?client_id, %addr, "connected to relay");
        Ok(Self::new(Arc::new(connection), client_id, cfg))
    }

    /// Solo/shellmap play: loops back through an in-process `EchoConnection`
    /// so solo games share this same code path with multiplayer.
    pub fn solo(cfg: &LockstepConfig) -> Self {
        let connection = EchoConnection::new();
        let client_id = connection
            .client_id()
            .expect("EchoConnection always reports a client id");
        Self::new(Arc::new(connection), client_id, cfg)
    }

    fn new(connection: Arc<dyn Connection>, client_id: ClientId, cfg: &LockstepConfig) -> Self {
        let config = OrderManagerConfig {
            net_tick_scale: cfg.net_tick_scale,
            sync_frame_scale: cfg.sync_frame_scale,
            should_use_catchup: true,
        };
        let manager = OrderManager::new(Arc::clone(&connection), client_id, config);
        Self {
            connection,
            manager,
            world: DemoWorld::default(),
            processor: MoveOrderProcessor,
            report: NullSyncReport,
        }
    }

    pub fn client_id(&self) -> Option<ClientId> {
        self.connection.client_id()
    }

    pub fn start_game(&mut self, peers: &[ClientId]) {
        self.manager.start_game(peers, false);
    }

    /// Buffers one move order for the next frame this client sends; does
    /// not transmit until `tick()` decides it's time to `send_orders`.
    pub fn issue_move(&mut self, input: InputState) {
        self.manager.issue(encode_move_order(input), false);
    }

    /// Drives one `try_tick` call. Returns whether a net-frame advanced.
    pub fn tick(&mut self) -> anyhow::Result<bool> {
        self.manager
            .try_tick(&mut self.world, &mut self.processor, &mut self.report, split_move_orders)
            .context("lockstep tick")
    }

    pub fn dispose(&mut self) {
        self.manager.dispose();
    }
}
