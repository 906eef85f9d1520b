//! `lockstep_client`
//!
//! A toy lockstep client binding `lockstep_core`'s `Connection` and
//! `OrderManager` to a minimal `DemoWorld`, so the networking core has a
//! real (if trivial) game loop driving it end to end.

pub mod client;
pub mod input;

pub use client::GameClient;
