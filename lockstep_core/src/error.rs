//! Fatal error taxonomy for the lockstep core.
//!
//! Transport-layer failures ([`ConnectionError`]) are surfaced through
//! `Connection::state()`/`error_message()` so the outer game loop can poll
//! and react. Determinism-layer failures ([`LockstepError`]) are fatal to
//! the simulation and should propagate out of `OrderManager::try_tick`.

use thiserror::Error;

use crate::net::{ClientId, NetFrame};

/// Errors that terminate a [`crate::connection::Connection`].
#[derive(Debug, Error, Clone)]
pub enum ConnectionError {
    #[error("failed to resolve any of {attempted} candidate endpoint(s) within {deadline_secs}s")]
    ConnectFailure {
        attempted: usize,
        deadline_secs: u64,
    },

    #[error("handshake version mismatch: ours={ours}, server's={theirs}")]
    HandshakeVersionMismatch { ours: u32, theirs: u32 },

    #[error("authentication failed: {reason}")]
    AuthenticationFailed { reason: String },

    #[error("ack underflow: tried to dequeue {requested} awaiting-ack entries but only {available} were pending")]
    AckUnderflow { requested: u16, available: usize },

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("i/o error: {0}")]
    Io(String),
}

/// Errors that terminate the simulation (determinism has been violated, or
/// an invariant the game loop must never reach has been hit).
#[derive(Debug, Error, Clone)]
pub enum LockstepError {
    #[error("out of sync at frame {frame}: {detail}")]
    OutOfSync { frame: NetFrame, detail: String },

    #[error("unknown client {0:?}: add_client was never called for it")]
    UnknownClient(ClientId),
}
