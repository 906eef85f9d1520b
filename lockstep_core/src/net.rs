//! Wire-level identifiers shared by every other module in this crate.
//!
//! Kept deliberately tiny: everything that reasons about *bytes* lives in
//! [`crate::codec`], everything that reasons about *sockets* lives in
//! [`crate::connection`].

use serde::{Deserialize, Serialize};

/// Handshake protocol version. Bumped whenever the wire shapes in
/// [`crate::codec`] change incompatibly.
pub const HANDSHAKE_VERSION: u32 = 1;

/// Identifies a connected client. Assigned by the relay during handshake;
/// the local client learns its own id from the handshake reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ClientId(pub u32);

/// A simulation frame number. `0` is reserved for immediate (unordered,
/// out-of-band) orders; `1..` are lockstep simulation frames.
pub type NetFrame = u32;

/// An opaque, caller-serialized action. The core only ever looks at its
/// length; the order-processor collaborator understands its encoding.
pub type Order = Vec<u8>;

/// Order-header tag bytes, present as the 5th payload byte on packets that
/// carry one (disconnect notices, sync hashes, acks).
pub mod tag {
    pub const DISCONNECT: u8 = 0xD1;
    pub const SYNC_HASH: u8 = 0x5A;
    pub const ACK: u8 = 0xAC;
}
