//! The connection layer: a framed transport that multiplexes frame orders,
//! immediate orders, and sync hashes over a single stream.
//!
//! [`Connection`] is the shared contract; [`tcp::TcpConnection`] is the real
//! networked implementation, [`echo::EchoConnection`] is the in-process
//! loopback used for solo/shellmap play, and [`replay::ReplayConnection`]
//! plays back a previously recorded session.

pub mod echo;
pub mod replay;
pub mod shared;
pub mod tcp;

use crate::error::ConnectionError;
use crate::net::{ClientId, NetFrame, Order};
use crate::replay_sink::ReplaySink;

/// Lifecycle states: one-way except `Connecting -> NotConnected` (failed
/// connect) and `Connected -> NotConnected` (closed/error).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    PreConnecting,
    Connecting,
    Connected,
    NotConnected,
}

/// The contract every connection variant implements. Implementors are
/// `Send + Sync`: the game thread calls `send_*`/`receive`/`dispose` while a
/// receiver thread (for [`tcp::TcpConnection`]) concurrently mutates shared
/// state behind the scenes.
pub trait Connection: Send + Sync {
    /// Atomically enqueues `orders` onto the awaiting-ack FIFO (unless
    /// empty) and transmits `frame:u32 | concat(orders)`, plus any queued
    /// sync packets.
    fn send_frame(&self, frame: NetFrame, orders: &[Order]);

    /// Transmits one packet per order with `frame = 0`. Never touches the
    /// awaiting-ack FIFO.
    fn send_immediate(&self, orders: &[Order]);

    /// Queues a sync packet; it is piggybacked on the next `send_frame`
    /// call (or flushed standalone if the caller never sends another
    /// frame, depending on the variant).
    fn send_sync(&self, frame: NetFrame, hash: u32);

    /// Drains every packet received so far and invokes `visitor(client, payload)`
    /// for each, in receive order, on the caller's thread.
    fn receive(&self, visitor: &mut dyn FnMut(ClientId, &[u8]));

    /// Installs a sink called for every dispatched inbound packet.
    fn start_recording(&self, sink: Box<dyn ReplaySink>);

    /// Closes the connection and marks it `NotConnected`. Idempotent.
    fn dispose(&self);

    fn state(&self) -> ConnectionState;

    fn client_id(&self) -> Option<ClientId>;

    fn error_message(&self) -> Option<String>;
}

/// Re-exported so callers matching on connect failures don't need to reach
/// into `connection::tcp`.
pub type ConnectResult<T> = Result<T, ConnectionError>;
