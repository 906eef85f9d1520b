//! Smoke test: the relay accepts a connection and stays alive across a few
//! ticks without the client ever seeing a protocol error.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::thread;
use std::time::Duration;

use lockstep_core::connection::tcp::{TcpConnection, CONNECT_DEADLINE};
use lockstep_core::connection::Connection;
use lockstep_relay::RelayServer;

#[test]
fn server_accepts_and_stays_alive_across_a_few_ticks() -> anyhow::Result<()> {
    let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0);
    let server = RelayServer::bind(addr, "")?;
    let local = server.local_addr()?;

    thread::spawn(move || {
        let _ = server.run();
    });

    let connection = TcpConnection::connect(&[local], None, CONNECT_DEADLINE)?;
    assert!(connection.client_id().is_some());

    for _ in 0..3 {
        connection.send_sync(0, 0xdead_beef);
        thread::sleep(Duration::from_millis(20));
        connection.receive(&mut |_client, _payload| {});
    }

    assert!(connection.error_message().is_none());
    Ok(())
}
