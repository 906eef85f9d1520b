//! `lockstep_relay`
//!
//! The relay binary's library half: the `RelayServer` that accepts client
//! connections, assigns `ClientId`s, and rebroadcasts packets between them.

pub mod server;

pub use server::RelayServer;
