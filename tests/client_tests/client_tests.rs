//! Tests for KvClient
//!
//! These tests verify:
//! - Typed operations round-trip through a real peer
//! - Many threads sharing one client get exactly their own answers
//! - Conditional gets block through pending answers
//! - Negative business answers are distinct from failures
//! - Closing releases blocked callers and tells the server goodbye

#[path = "../common/mod.rs"]
mod common;

use std::collections::{HashMap, HashSet};
use std::net::TcpListener;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use common::MockServer;
use kvmux::protocol::{decode_request, encode_response, Request, RequestType, Response};
use kvmux::{Config, KvClient, MuxError, TaggedConnection};

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_client() -> (MockServer, KvClient) {
    let server = MockServer::start();
    let client = KvClient::connect_with_config(server.config()).unwrap();
    (server, client)
}

fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        thread::sleep(Duration::from_millis(5));
    }
}

/// A client wired to a hand-driven server connection
fn setup_scripted() -> (KvClient, TaggedConnection) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let client = KvClient::connect(listener.local_addr().unwrap().to_string()).unwrap();
    let (stream, _) = listener.accept().unwrap();
    let server = TaggedConnection::from_stream(stream, &Config::default()).unwrap();
    (client, server)
}

// =============================================================================
// Key-Value Operation Tests
// =============================================================================

#[test]
fn test_put_get() {
    let (_server, client) = setup_client();

    client.put("key1", b"value1").unwrap();
    assert_eq!(client.get("key1").unwrap(), Some(b"value1".to_vec()));
}

#[test]
fn test_get_nonexistent_key() {
    let (_server, client) = setup_client();

    assert_eq!(client.get("missing").unwrap(), None);
}

#[test]
fn test_put_overwrites() {
    let (_server, client) = setup_client();

    client.put("key", b"old").unwrap();
    client.put("key", b"new").unwrap();
    assert_eq!(client.get("key").unwrap(), Some(b"new".to_vec()));
}

#[test]
fn test_empty_and_binary_values() {
    let (_server, client) = setup_client();
    let binary: Vec<u8> = vec![0x00, 0xFF, 0x00, 0x7F, 0x80];

    client.put("empty", b"").unwrap();
    client.put("binary", &binary).unwrap();

    assert_eq!(client.get("empty").unwrap(), Some(Vec::new()));
    assert_eq!(client.get("binary").unwrap(), Some(binary));
}

#[test]
fn test_multi_put_multi_get() {
    let (_server, client) = setup_client();

    let mut pairs = HashMap::new();
    pairs.insert("a".to_string(), b"1".to_vec());
    pairs.insert("b".to_string(), b"2".to_vec());
    client.multi_put(&pairs).unwrap();

    let keys: HashSet<String> = ["a", "b"].iter().map(|k| k.to_string()).collect();
    let values = client.multi_get(keys).unwrap();
    assert_eq!(values, pairs);
}

#[test]
fn test_multi_get_skips_unknown_keys() {
    let (_server, client) = setup_client();

    client.put("present", b"yes").unwrap();
    let values = client.multi_get(["present", "absent"]).unwrap();

    assert_eq!(values.len(), 1);
    assert_eq!(values.get("present"), Some(&b"yes".to_vec()));
}

// =============================================================================
// Account Tests
// =============================================================================

#[test]
fn test_register_and_authenticate() {
    let (_server, client) = setup_client();

    assert!(client.register("alice", "pw").unwrap());
    assert!(!client.register("alice", "other").unwrap());

    assert!(client.authenticate("alice", "pw").unwrap());
    assert!(!client.authenticate("alice", "wrong").unwrap());
    assert!(!client.authenticate("bob", "pw").unwrap());
}

#[test]
fn test_malformed_answer_is_not_a_negative_answer() {
    let (client, server) = setup_scripted();

    thread::scope(|s| {
        let caller = s.spawn(|| client.authenticate("alice", "pw"));

        let request = server.receive().unwrap().unwrap();
        // An empty payload is not a well-formed boolean
        server.send(request.tag, b"").unwrap();

        assert!(matches!(
            caller.join().unwrap(),
            Err(MuxError::Protocol(_))
        ));
    });
}

// =============================================================================
// Concurrency Tests
// =============================================================================

#[test]
fn test_shared_client_concurrent_callers() {
    let (_server, client) = setup_client();
    let client = Arc::new(client);

    let handles: Vec<_> = (0..16)
        .map(|t| {
            let client = Arc::clone(&client);
            thread::spawn(move || {
                for i in 0..25 {
                    let key = format!("t{}-k{}", t, i);
                    let value = format!("value-{}-{}", t, i).into_bytes();
                    client.put(&key, &value).unwrap();
                    assert_eq!(client.get(&key).unwrap(), Some(value));
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(client.pending_slots(), 0);
}

#[test]
fn test_slow_request_does_not_block_fast_one() {
    let (_server, client) = setup_client();
    client.put("fast", b"quick").unwrap();

    thread::scope(|s| {
        let slow = s.spawn(|| {
            let started = Instant::now();
            client.put("slow-key", b"eventually").unwrap();
            started.elapsed()
        });

        // Overtakes the slow put on the same connection
        thread::sleep(Duration::from_millis(10));
        assert_eq!(client.get("fast").unwrap(), Some(b"quick".to_vec()));
        assert!(!slow.is_finished());

        assert!(slow.join().unwrap() >= Duration::from_millis(50));
    });

    assert_eq!(client.get("slow-key").unwrap(), Some(b"eventually".to_vec()));
}

#[test]
fn test_independent_clients_share_server_state() {
    let server = MockServer::start();
    let writer = KvClient::connect_with_config(server.config()).unwrap();
    let reader = KvClient::connect_with_config(server.config()).unwrap();

    writer.put("shared", b"data").unwrap();
    assert_eq!(reader.get("shared").unwrap(), Some(b"data".to_vec()));
}

// =============================================================================
// Conditional Get Tests
// =============================================================================

#[test]
fn test_get_when_condition_already_true() {
    let (_server, client) = setup_client();

    client.put("status", b"done").unwrap();
    client.put("result", b"42").unwrap();

    let value = client.get_when("result", "status", b"done").unwrap();
    assert_eq!(value, b"42".to_vec());
}

#[test]
fn test_get_when_blocks_until_condition() {
    let server = MockServer::start();
    let waiter = KvClient::connect_with_config(server.config()).unwrap();
    let writer = KvClient::connect_with_config(server.config()).unwrap();

    writer.put("result", b"computed").unwrap();

    thread::scope(|s| {
        let blocked = s.spawn(|| waiter.get_when("result", "status", b"done"));

        wait_until(|| server.parked() == 1);
        thread::sleep(Duration::from_millis(50));
        assert!(!blocked.is_finished());

        writer.put("status", b"running").unwrap();
        thread::sleep(Duration::from_millis(50));
        assert!(!blocked.is_finished());

        writer.put("status", b"done").unwrap();
        assert_eq!(blocked.join().unwrap().unwrap(), b"computed".to_vec());
    });

    assert_eq!(waiter.pending_slots(), 0);
}

#[test]
fn test_get_when_with_legacy_empty_placeholder() {
    let server = MockServer::start_legacy();
    let waiter = KvClient::connect_with_config(server.config()).unwrap();
    let writer = KvClient::connect_with_config(server.config()).unwrap();

    thread::scope(|s| {
        let blocked = s.spawn(|| waiter.get_when("job", "flag", b"set"));

        wait_until(|| server.parked() == 1);
        let mut pairs = HashMap::new();
        pairs.insert("job".to_string(), b"output".to_vec());
        pairs.insert("flag".to_string(), b"set".to_vec());
        writer.multi_put(&pairs).unwrap();

        assert_eq!(blocked.join().unwrap().unwrap(), b"output".to_vec());
    });
}

#[test]
fn test_get_when_through_repeated_placeholders() {
    let (client, server) = setup_scripted();

    thread::scope(|s| {
        let caller = s.spawn(|| client.get_when("k", "c", b"v"));

        let request = server.receive().unwrap().unwrap();
        assert_eq!(
            decode_request(&request.payload).unwrap().request_type(),
            RequestType::GetWhen
        );

        // Legacy empty placeholder, then the typed marker, then the result
        server.send(request.tag, b"").unwrap();
        server
            .send(request.tag, &encode_response(&Response::Pending).unwrap())
            .unwrap();
        thread::sleep(Duration::from_millis(50));
        assert!(!caller.is_finished());

        server
            .send(
                request.tag,
                &encode_response(&Response::Ready(Vec::new())).unwrap(),
            )
            .unwrap();

        // A ready empty value is a real result, not "not yet"
        assert_eq!(caller.join().unwrap().unwrap(), Vec::<u8>::new());
    });
}

#[test]
fn test_get_when_timeout() {
    let (_server, client) = setup_client();

    let result = client.get_when_timeout("x", "never", b"true", Duration::from_millis(100));
    assert!(matches!(result, Err(MuxError::Timeout { .. })));
    assert_eq!(client.pending_slots(), 0);

    // The connection is still usable
    client.put("after", b"timeout").unwrap();
    assert_eq!(client.get("after").unwrap(), Some(b"timeout".to_vec()));
}

#[test]
fn test_request_timeout_from_config() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let config = Config::builder()
        .server_addr(listener.local_addr().unwrap().to_string())
        .request_timeout_ms(100)
        .build();
    let client = KvClient::connect_with_config(config).unwrap();
    // Accepted but never answered
    let (_silent, _) = listener.accept().unwrap();

    assert!(matches!(
        client.get("anything"),
        Err(MuxError::Timeout { .. })
    ));
}

// =============================================================================
// Lifecycle Tests
// =============================================================================

#[test]
fn test_close_sends_disconnect() {
    let (server, client) = setup_client();

    client.put("k", b"v").unwrap();
    client.close().unwrap();
    client.close().unwrap();

    wait_until(|| server.disconnects() == 1);
    assert!(client.is_closed());
    assert!(matches!(
        client.get("k"),
        Err(MuxError::ConnectionClosed)
    ));
}

#[test]
fn test_close_releases_blocked_get_when() {
    let (server, client) = setup_client();

    thread::scope(|s| {
        let blocked = s.spawn(|| client.get_when("k", "never", b"x"));

        wait_until(|| server.parked() == 1);
        client.close().unwrap();

        assert!(matches!(
            blocked.join().unwrap(),
            Err(MuxError::ConnectionClosed)
        ));
    });
}

#[test]
fn test_server_vanishing_fails_calls() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let client = KvClient::connect(listener.local_addr().unwrap().to_string()).unwrap();
    let (stream, _) = listener.accept().unwrap();
    drop(stream);

    let err = client.get("k").unwrap_err();
    assert!(err.is_connection_lost(), "unexpected error: {}", err);
}

#[test]
fn test_disconnect_request_is_last_frame() {
    let (client, server) = setup_scripted();

    client.close().unwrap();

    let frame = server.receive().unwrap().unwrap();
    assert_eq!(decode_request(&frame.payload).unwrap(), Request::Disconnect);
    assert!(server.receive().unwrap().is_none());
}

#[test]
fn test_connect_with_invalid_config() {
    let config = Config::builder().slot_capacity(0).build();
    assert!(matches!(
        KvClient::connect_with_config(config),
        Err(MuxError::Config(_))
    ));
}
