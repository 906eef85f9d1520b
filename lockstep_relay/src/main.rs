//! Standalone relay binary.
//!
//! Usage:
//!   cargo run -p lockstep_relay -- [--addr 127.0.0.1:40000] [--password secret]
//!
//! Accepts lockstep client connections and relays their packets.

use std::env;

use anyhow::Context;
use lockstep_core::config::LockstepConfig;
use lockstep_relay::RelayServer;
use tracing::info;

fn parse_args() -> LockstepConfig {
    let mut cfg = LockstepConfig::default();
    let args: Vec<String> = env::args().collect();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--addr" if i + 1 < args.len() => {
                cfg.server_addr = args[i + 1].clone();
                i += 2;
            }
            "--password" if i + 1 < args.len() => {
                cfg.password = args[i + 1].clone();
                i += 2;
            }
            _ => i += 1,
        }
    }
    cfg
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cfg = parse_args();
    let addr = cfg.server_addr.parse().context("parse --addr")?;
    let server = RelayServer::bind(addr, cfg.password.clone()).context("bind relay")?;
    let local = server.local_addr().context("read local addr")?;
    info!(%local, "relay listening");

    server.run()
}
