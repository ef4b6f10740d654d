mod common;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::{Duration, Instant};

use common::{FakeServer, SharedAssets, later, new_client};
use goldsrc::{ClientEvent, ConnectionState, DisconnectReason, Transport, UdpTransport};

static PORT_COUNTER: AtomicU16 = AtomicU16::new(41000);

fn next_port() -> u16 {
    PORT_COUNTER.fetch_add(10, Ordering::SeqCst)
}

fn disconnect_reason(events: &[ClientEvent]) -> Option<&DisconnectReason> {
    events.iter().find_map(|event| match event {
        ClientEvent::Disconnected { reason } => Some(reason),
        _ => None,
    })
}

#[test]
fn test_handshake_reaches_connected() {
    let now = Instant::now();
    let server = FakeServer::new();
    let mut client = new_client(SharedAssets::default());

    client.connect(server.addr, now).unwrap();
    assert_eq!(client.state(), ConnectionState::Challenging);

    let outgoing = client.drain_outgoing();
    assert_eq!(outgoing.len(), 1);
    assert_eq!(outgoing[0].0, server.addr);
    assert_eq!(&outgoing[0].1[..4], &[0xFF; 4]);
    assert!(outgoing[0].1.ends_with(b"getchallenge steam\0"));

    server.connectionless(&mut client, b"A00000000 12345 2\n\0", now);
    assert_eq!(client.state(), ConnectionState::Connecting);

    let outgoing = client.drain_outgoing();
    assert_eq!(outgoing.len(), 1);
    let request = String::from_utf8_lossy(&outgoing[0].1[4..]).into_owned();
    assert!(request.starts_with("connect 48 12345 \""));
    assert!(request.contains("\\name\\Tester"));

    server.connectionless(&mut client, b"B\0", now);
    assert_eq!(client.state(), ConnectionState::Connected);
    assert_eq!(client.channel().unwrap().pending_reliable(), 1);
}

#[test]
fn test_first_datagram_carries_new() {
    let now = Instant::now();
    let mut server = FakeServer::new();
    let mut client = new_client(SharedAssets::default());
    server.connect(&mut client, now);

    let sent = server.pump(&mut client, now);
    assert_eq!(sent.len(), 1);
    assert!(sent[0].is_reliable());
    assert_eq!(sent[0].commands(), vec!["new".to_string()]);
}

#[test]
fn test_challenge_from_other_address_is_ignored() {
    let now = Instant::now();
    let server = FakeServer::new();
    let mut client = new_client(SharedAssets::default());
    client.connect(server.addr, now).unwrap();
    client.drain_outgoing();

    let stranger: SocketAddr = "10.0.0.2:27015".parse().unwrap();
    let mut data = vec![0xFF; 4];
    data.extend_from_slice(b"A00000000 999 2\n\0");
    client.receive(stranger, &data, now);

    assert_eq!(client.state(), ConnectionState::Challenging);
    assert!(client.drain_outgoing().is_empty());
}

#[test]
fn test_reject_disconnects_with_reason() {
    let now = Instant::now();
    let server = FakeServer::new();
    let mut client = new_client(SharedAssets::default());
    client.connect(server.addr, now).unwrap();
    server.connectionless(&mut client, b"A00000000 12345 2\n\0", now);

    server.connectionless(&mut client, b"9Server is full.\n\0", now);

    assert_eq!(client.state(), ConnectionState::Disconnected);
    let events = client.drain_events();
    assert_eq!(
        disconnect_reason(&events),
        Some(&DisconnectReason::Rejected("Server is full.".to_string()))
    );
}

#[test]
fn test_silent_server_times_out() {
    let now = Instant::now();
    let mut server = FakeServer::new();
    let mut client = new_client(SharedAssets::default());
    server.connect(&mut client, now);

    client.frame(later(now, 29_000));
    assert_eq!(client.state(), ConnectionState::Connected);

    client.frame(later(now, 30_000));
    assert_eq!(client.state(), ConnectionState::Disconnected);
    let events = client.drain_events();
    assert_eq!(disconnect_reason(&events), Some(&DisconnectReason::TimedOut));
}

#[test]
fn test_server_disconnect_message() {
    let now = Instant::now();
    let mut server = FakeServer::new();
    let mut client = new_client(SharedAssets::default());
    server.connect(&mut client, now);

    let mut body = vec![2];
    body.extend_from_slice(b"Kicked by console\n\0");
    server.send(&mut client, &body, now);

    assert_eq!(client.state(), ConnectionState::Disconnected);
    let events = client.drain_events();
    assert_eq!(
        disconnect_reason(&events),
        Some(&DisconnectReason::Server("Kicked by console".to_string()))
    );
}

fn wait_for_packet(transport: &mut UdpTransport, timeout_ms: u64) -> Option<(SocketAddr, Vec<u8>)> {
    let deadline = Instant::now() + Duration::from_millis(timeout_ms);
    while Instant::now() < deadline {
        if let Some(packet) = transport.poll().unwrap().into_iter().next() {
            return Some(packet);
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    None
}

#[test]
fn test_handshake_over_udp() {
    let server_port = next_port();
    let client_port = server_port + 1;

    let mut server = UdpTransport::bind(("127.0.0.1", server_port)).unwrap();
    let mut transport = UdpTransport::bind(("127.0.0.1", client_port)).unwrap();
    let server_addr = server.local_addr();

    let mut client = new_client(SharedAssets::default());
    client.connect(server_addr, Instant::now()).unwrap();
    client.flush(&mut transport).unwrap();

    let (from, data) = wait_for_packet(&mut server, 1000).expect("no challenge request");
    assert!(data.ends_with(b"getchallenge steam\0"));

    let mut reply = vec![0xFF; 4];
    reply.extend_from_slice(b"A00000000 777 2\n\0");
    server.send(from, &reply).unwrap();

    let (addr, data) = wait_for_packet(&mut transport, 1000).expect("no challenge reply");
    client.receive(addr, &data, Instant::now());
    assert_eq!(client.state(), ConnectionState::Connecting);
    client.flush(&mut transport).unwrap();

    let (from, data) = wait_for_packet(&mut server, 1000).expect("no connect request");
    assert!(String::from_utf8_lossy(&data).contains("connect 48 777"));

    let mut accept = vec![0xFF; 4];
    accept.extend_from_slice(b"B\0");
    server.send(from, &accept).unwrap();

    let (addr, data) = wait_for_packet(&mut transport, 1000).expect("no accept");
    client.receive(addr, &data, Instant::now());
    assert_eq!(client.state(), ConnectionState::Connected);
}
