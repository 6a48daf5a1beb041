#![cfg(all(unix, feature = "peer"))]

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use relaybus::port::{MessagePort, UdsListener, UdsPort};
use relaybus::relay::{handler, FixedIdSource, PortTarget, RelayBus, RelayOptions};
use relaybus::schema::SchemaRegistry;
use serde_json::{json, Value};

fn unique_temp_dir(tag: &str) -> PathBuf {
    let dir = PathBuf::from(format!(
        "/tmp/relaybus-{tag}-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    dir
}

fn message_registry() -> Arc<SchemaRegistry> {
    let mut registry = SchemaRegistry::new();
    registry
        .register_value(
            "chat/message",
            &json!({
                "type": "object",
                "properties": {"text": {"type": "string"}},
                "required": ["text"]
            }),
        )
        .expect("schema should register");
    Arc::new(registry)
}

fn relay_on(port: Arc<dyn MessagePort>, identifier: &str) -> RelayBus {
    let relay = RelayBus::with_options(
        message_registry(),
        port.clone(),
        RelayOptions::new().with_id_source(Arc::new(FixedIdSource::new(identifier))),
    );
    relay.add_target(PortTarget::unrestricted(port));
    relay
}

fn record_payloads(relay: &RelayBus) -> Arc<Mutex<Vec<Value>>> {
    let seen: Arc<Mutex<Vec<Value>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    relay.subscribe(
        "chat/message",
        handler(move |payload| {
            sink.lock().expect("seen lock").push(payload.clone());
        }),
    );
    seen
}

fn poll_until(port: &UdsPort, mut done: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !done() {
        assert!(Instant::now() < deadline, "timed out waiting for delivery");
        port.poll().expect("poll should not fail");
        std::thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn relays_events_across_a_socket_in_both_directions() {
    let dir = unique_temp_dir("uds-relay");
    let sock = dir.join("relay.sock");
    let listener = UdsListener::bind(&sock, "relay://server").expect("bind should succeed");

    let client_thread = std::thread::spawn({
        let sock = sock.clone();
        move || {
            let port = UdsPort::connect(&sock, "relay://client").expect("connect should succeed");
            let relay = relay_on(port.clone(), "client-relay");
            let seen = record_payloads(&relay);

            relay
                .dispatch("chat/message", &json!({"text": "ping"}))
                .expect("ping should dispatch");

            poll_until(&port, || !seen.lock().expect("seen lock").is_empty());
            let payloads = seen.lock().expect("seen lock").clone();
            payloads
        }
    });

    let port = listener.accept().expect("accept should succeed");
    let relay = relay_on(port.clone(), "server-relay");
    let seen = record_payloads(&relay);

    poll_until(&port, || !seen.lock().expect("seen lock").is_empty());
    relay
        .dispatch("chat/message", &json!({"text": "pong"}))
        .expect("pong should dispatch");

    let client_seen = client_thread.join().expect("client thread should finish");
    assert_eq!(client_seen, vec![json!({"text": "pong"})]);
    assert_eq!(
        *seen.lock().expect("seen lock"),
        vec![json!({"text": "ping"})]
    );

    drop(port);
    drop(listener);
    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn peer_origins_are_exchanged_during_the_handshake() {
    let dir = unique_temp_dir("uds-hello");
    let sock = dir.join("hello.sock");
    let listener = UdsListener::bind(&sock, "relay://server").expect("bind should succeed");

    let client_thread = std::thread::spawn({
        let sock = sock.clone();
        move || {
            let port = UdsPort::connect(&sock, "relay://client").expect("connect should succeed");
            port.peer_origin().to_string()
        }
    });

    let port = listener.accept().expect("accept should succeed");
    let seen_by_client = client_thread.join().expect("client thread should finish");

    assert_eq!(port.peer_origin(), "relay://client");
    assert_eq!(seen_by_client, "relay://server");

    drop(port);
    drop(listener);
    let _ = std::fs::remove_dir_all(&dir);
}
