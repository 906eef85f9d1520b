//! Standalone client binary.
//!
//! Usage:
//!   cargo run -p lockstep_client -- [--addr 127.0.0.1:40000] [--password secret] [--solo]
//!
//! Connects to a relay (or runs solo against an in-process loopback),
//! issues a move order each tick from stdin, and logs the world's
//! `sync_hash` whenever a net-frame advances.
//!
//! Console commands (one per line on stdin):
//!   move <dx> <dy> <dz>  - issue a move order for the next frame
//!   status               - show local/net frame and sync hash
//!   quit                 - disconnect and exit

use std::env;
use std::io::{BufRead, Write};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use anyhow::Context;
use lockstep_client::client::GameClient;
use lockstep_client::input::InputState;
use lockstep_core::config::LockstepConfig;
use lockstep_core::world::World;
use tracing::info;

fn parse_args() -> (LockstepConfig, bool) {
    let mut cfg = LockstepConfig::default();
    let mut solo = false;
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
            "--name" if i + 1 < args.len() => {
                cfg.player_name = args[i + 1].clone();
                i += 2;
            }
            "--solo" => {
                solo = true;
                i += 1;
            }
            _ => i += 1,
        }
    }
    (cfg, solo)
}

fn parse_move(line: &str) -> Option<InputState> {
    let mut parts = line.split_whitespace().skip(1);
    let forward: f32 = parts.next()?.parse().ok()?;
    let right: f32 = parts.next()?.parse().ok()?;
    let up: f32 = parts.next()?.parse().ok()?;
    Some(InputState { forward, right, up })
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let (cfg, solo) = parse_args();

    let mut client = if solo {
        info!("starting solo game");
        GameClient::solo(&cfg)
    } else {
        info!(server = %cfg.server_addr, "connecting to relay");
        GameClient::connect(&cfg).context("connect")?
    };
    let client_id = client.client_id().context("client has no id after connect")?;
    info!(client_id = ?client_id, "joined");
    client.start_game(&[client_id]);

    let (console_tx, console_rx) = mpsc::channel::<String>();
    thread::spawn(move || {
        let stdin = std::io::stdin();
        let mut stdout = std::io::stdout();
        loop {
            print!("] ");
            let _ = stdout.flush();
            let mut line = String::new();
            if stdin.lock().read_line(&mut line).is_err() {
                break;
            }
            let line = line.trim().to_string();
            if !line.is_empty() && console_tx.send(line).is_err() {
                break;
            }
        }
    });

    println!("Client ready. Type 'move <dx> <dy> <dz>', 'status', or 'quit'.");

    let tick_interval = Duration::from_millis(client.world.timestep_ms() as u64);
    let mut quit = false;

    loop {
        while let Ok(line) = console_rx.try_recv() {
            match line.split_whitespace().next() {
                Some("move") => {
                    if let Some(input) = parse_move(&line) {
                        client.issue_move(input);
                    } else {
                        println!("usage: move <dx> <dy> <dz>");
                    }
                }
                Some("status") => {
                    println!(
                        "local_frame={} net_frame={} sync_hash={}",
                        client.manager.local_frame(),
                        client.manager.net_frame(),
                        client.world.sync_hash(),
                    );
                }
                Some("quit") => quit = true,
                _ => println!("unknown command: {line}"),
            }
        }

        if quit {
            break;
        }

        match client.tick() {
            Ok(true) => info!(
                net_frame = client.manager.net_frame(),
                sync_hash = client.world.sync_hash(),
                "ticked"
            ),
            Ok(false) => {}
            Err(e) => println!("tick error: {e}"),
        }

        thread::sleep(tick_interval);
    }

    client.dispose();
    Ok(())
}
