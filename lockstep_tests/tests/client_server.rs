//! Full socket-based integration test: two clients through one relay reach
//! the same `sync_hash` after exchanging move orders.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::thread;
use std::time::Duration;

use lockstep_client::input::InputState;
use lockstep_client::GameClient;
use lockstep_core::config::LockstepConfig;
use lockstep_core::net::ClientId;
use lockstep_core::world::World;
use lockstep_relay::RelayServer;

fn bind_and_run_relay() -> SocketAddr {
    let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0);
    let server = RelayServer::bind(addr, "").expect("bind relay");
    let local = server.local_addr().expect("local addr");
    thread::spawn(move || {
        let _ = server.run();
    });
    local
}

#[test]
fn two_clients_converge_on_the_same_sync_hash() -> anyhow::Result<()> {
    let _ = tracing_subscriber::fmt().with_env_filter("info").try_init();

    let addr = bind_and_run_relay();
    let cfg = LockstepConfig {
        server_addr: addr.to_string(),
        ..LockstepConfig::default()
    };

    let mut client_a = GameClient::connect(&cfg)?;
    let mut client_b = GameClient::connect(&cfg)?;

    let id_a = client_a.client_id().expect("client a has an id");
    let id_b = client_b.client_id().expect("client b has an id");
    assert_eq!(id_a, ClientId(1));
    assert_eq!(id_b, ClientId(2));

    let peers = [id_a, id_b];
    client_a.start_game(&peers);
    client_b.start_game(&peers);

    let mut converged = false;
    for i in 0..200 {
        if i % 3 == 0 {
            client_a.issue_move(InputState {
                forward: 1.0,
                right: 0.0,
                up: 0.0,
            });
        }
        if i % 5 == 0 {
            client_b.issue_move(InputState {
                forward: 0.0,
                right: 1.0,
                up: 0.0,
            });
        }

        client_a.tick()?;
        client_b.tick()?;
        thread::sleep(Duration::from_millis(5));

        if i > 20 && client_a.world.sync_hash() == client_b.world.sync_hash() {
            converged = true;
            break;
        }
    }

    assert!(converged, "clients never converged on a shared sync_hash");
    assert_ne!(
        client_a.world.position_of(id_a),
        lockstep_client::client::Position::default(),
        "client a's own moves should have applied"
    );

    client_a.dispose();
    client_b.dispose();
    Ok(())
}
