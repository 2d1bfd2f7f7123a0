mod common;

use std::net::TcpListener;
use std::thread;
use std::time::{Duration, Instant};

use common::*;
use sonarlint_bridge::ports::PORT_RANGE_LEN;
use sonarlint_bridge::BridgeConfig;

#[test]
fn binds_the_lowest_free_port_of_the_window() {
    let base = free_port_window();
    let _first = occupy(base);
    let _second = occupy(base + 1);

    let harness = Harness::new(vec![sonar("sq")]);
    let server = harness.start_bridge(BridgeConfig::default().with_first_port(base));
    assert!(server.is_started());
    assert_eq!(server.port(), Some(base + 2));

    let reply = get(base + 2, "/sonarlint/api/status", None);
    assert_eq!(reply.status, 200);
}

#[test]
fn all_ports_taken_leaves_the_bridge_disabled() {
    let base = free_port_window();
    let _held: Vec<TcpListener> = (base..base + PORT_RANGE_LEN).map(occupy).collect();

    let harness = Harness::new(vec![sonar("sq")]);
    let server = harness.start_bridge(BridgeConfig::default().with_first_port(base));
    assert!(!server.is_started());
    assert_eq!(server.port(), None);
}

#[test]
fn shutdown_releases_the_port() {
    let base = free_port_window();
    let harness = Harness::new(vec![sonar("sq")]);
    let mut server = harness.start_bridge(BridgeConfig::default().with_first_port(base));
    let port = server.port().expect("bridge port");
    assert_eq!(port, base);

    server.shutdown();
    assert!(!server.is_started());
    assert_eq!(server.port(), None);

    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        if TcpListener::bind(("127.0.0.1", port)).is_ok() {
            break;
        }
        assert!(Instant::now() < deadline, "port {port} still held after shutdown");
        thread::sleep(Duration::from_millis(50));
    }

    server.shutdown();
}
