//! Gateway behaviour against fake transport, codec, bus and log hooks.

use bytes::Bytes;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use mqttsn_dtls_gateway::bus::{Bus, TopicKey};
use mqttsn_dtls_gateway::codec::{CodecError, Packet};
use mqttsn_dtls_gateway::config::BindConfig;
use mqttsn_dtls_gateway::net::{ServerEvent, TransportError};
use mqttsn_dtls_gateway::observability::{message_ids, LogHooks};
use mqttsn_dtls_gateway::{configure, EventBus, GatewayOptions, StopHandle};

mod common;
use common::{eventually, peer, MockTransport, RecordingBus, RecordingLog, ScriptedCodec};

struct Harness {
    transport: MockTransport,
    codec: ScriptedCodec,
    gateway: StopHandle,
}

async fn start(log: LogHooks, bus: Arc<dyn Bus>) -> Harness {
    let transport = MockTransport::default();
    let codec = ScriptedCodec::default();
    let options = GatewayOptions {
        log,
        ..GatewayOptions::default()
    };

    let gateway = configure(options, Arc::new(transport.clone()), Arc::new(codec.clone()))
        .attach(bus)
        .await
        .unwrap()
        .start();

    Harness {
        transport,
        codec,
        gateway,
    }
}

fn egress_topic() -> TopicKey {
    TopicKey::new("snUnicastOutgress", "::1_12345", "*")
}

#[tokio::test]
async fn attach_fails_with_transport_error() {
    let error = TransportError::Create("no certificate".into());
    let transport = MockTransport::failing(error.clone());

    let result = configure(
        GatewayOptions::default(),
        Arc::new(transport),
        Arc::new(ScriptedCodec::default()),
    )
    .attach(Arc::new(RecordingBus::default()))
    .await;

    match result {
        Err(e) => assert_eq!(e, error),
        Ok(_) => panic!("attach succeeded without a server"),
    }
}

#[tokio::test]
async fn start_binds_configured_address() {
    let transport = MockTransport::default();
    let bind = BindConfig {
        address: "::".into(),
        port: 20000,
    };
    let options = GatewayOptions {
        bind: bind.clone(),
        ..GatewayOptions::default()
    };

    let start = configure(options, Arc::new(transport.clone()), Arc::new(ScriptedCodec::default()))
        .attach(Arc::new(RecordingBus::default()))
        .await
        .unwrap();
    assert!(transport.state.binds.lock().unwrap().is_empty());

    let mut gateway = start.start();
    assert_eq!(transport.state.binds.lock().unwrap().as_slice(), &[bind]);
    gateway.stop().await;
}

#[tokio::test]
async fn debug_logs_incoming_handshakes() {
    let log = RecordingLog::default();
    let h = start(log.hooks(), Arc::new(RecordingBus::default())).await;

    h.transport.state.emit(ServerEvent::Connection { peer: peer() });

    assert!(eventually(|| RecordingLog::count(&log.debug) == 1).await);
    let (message, fields) = RecordingLog::call(&log.debug, 0);
    assert_eq!(message, "Handshake started by [::1]:12345");
    assert_eq!(fields.message_id(), message_ids::HANDSHAKE_STARTED);
    assert_eq!(fields.client_key(), "::1_12345");
}

#[tokio::test]
async fn warn_logs_errors_caused_by_peers() {
    let log = RecordingLog::default();
    let h = start(log.hooks(), Arc::new(RecordingBus::default())).await;

    h.transport.state.emit(ServerEvent::Error {
        peer: peer(),
        error: TransportError::Handshake("testErr".into()),
    });

    assert!(eventually(|| RecordingLog::count(&log.warn) == 1).await);
    let (message, fields) = RecordingLog::call(&log.warn, 0);
    assert_eq!(message, "Error caused by [::1]:12345: handshake failed: testErr");
    assert_eq!(fields.message_id(), message_ids::PEER_ERROR);
    assert_eq!(fields.client_key(), "::1_12345");
}

#[tokio::test]
async fn debug_logs_established_connections() {
    let log = RecordingLog::default();
    let h = start(log.hooks(), Arc::new(RecordingBus::default())).await;

    let _conn = h.transport.state.connect(peer());

    assert!(eventually(|| RecordingLog::count(&log.debug) == 1).await);
    let (message, fields) = RecordingLog::call(&log.debug, 0);
    assert_eq!(message, "Handshake successfully finished with [::1]:12345");
    assert_eq!(fields.message_id(), message_ids::HANDSHAKE_FINISHED);
    assert_eq!(fields.client_key(), "::1_12345");
}

#[tokio::test]
async fn debug_logs_closed_connections() {
    let log = RecordingLog::default();
    let h = start(log.hooks(), Arc::new(RecordingBus::default())).await;

    let conn = h.transport.state.connect(peer());
    conn.close();

    assert!(eventually(|| RecordingLog::count(&log.debug) == 2).await);
    let (message, fields) = RecordingLog::call(&log.debug, 1);
    assert_eq!(message, "Connection to [::1]:12345 closed");
    assert_eq!(fields.message_id(), message_ids::CONNECTION_CLOSED);
    assert_eq!(fields.client_key(), "::1_12345");
}

#[tokio::test]
async fn feeds_incoming_messages_to_decoder() {
    let h = start(LogHooks::none(), Arc::new(RecordingBus::default())).await;

    let conn = h.transport.state.connect(peer());
    conn.message(b"\x02\x16");

    let fed = &h.codec.state.fed;
    assert!(eventually(|| fed.lock().unwrap().len() == 1).await);
    assert_eq!(fed.lock().unwrap()[0], b"\x02\x16".to_vec());
    assert_eq!(h.codec.state.parsers.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn warn_logs_parser_errors() {
    let log = RecordingLog::default();
    let bus = Arc::new(RecordingBus::default());
    let h = start(log.hooks(), bus.clone()).await;
    h.codec.decodes(vec![Err(CodecError::Truncated("publish"))]);

    let conn = h.transport.state.connect(peer());
    conn.message(b"\x05\x0c\x00");

    assert!(eventually(|| RecordingLog::count(&log.warn) == 1).await);
    let (message, fields) = RecordingLog::call(&log.warn, 0);
    assert_eq!(message, "Parser error: truncated publish packet");
    assert_eq!(fields.message_id(), message_ids::PARSER_ERROR);
    assert_eq!(fields.client_key(), "::1_12345");
    assert!(fields.get("stack").is_some());
    assert!(bus.emitted.lock().unwrap().is_empty());
}

#[tokio::test]
async fn parser_errors_without_hook_keep_session_open() {
    let bus = Arc::new(RecordingBus::default());
    let h = start(LogHooks::none(), bus.clone()).await;
    h.codec.decodes(vec![Err(CodecError::InvalidLength(1))]);
    h.codec.decodes(vec![Ok(Packet::new("pingreq"))]);

    let conn = h.transport.state.connect(peer());
    conn.message(b"\x01");
    conn.message(b"\x02\x16");

    assert!(eventually(|| bus.emitted.lock().unwrap().len() == 1).await);
    assert!(bus.removed.lock().unwrap().is_empty());
}

#[tokio::test]
async fn emits_parsed_packets_to_bus() {
    let bus = Arc::new(RecordingBus::default());
    let h = start(LogHooks::none(), bus.clone()).await;
    h.codec.decodes(vec![Ok(Packet::new("testCmd"))]);

    let conn = h.transport.state.connect(peer());
    conn.message(b"\x02\x00");

    assert!(eventually(|| bus.emitted.lock().unwrap().len() == 1).await);
    let (topic, packet) = bus.emitted.lock().unwrap()[0].clone();
    assert_eq!(topic, TopicKey::new("snUnicastIngress", "::1_12345", "testCmd"));
    assert_eq!(packet.cmd, "testCmd");
    assert_eq!(packet.client_key.unwrap().as_str(), "::1_12345");
}

#[tokio::test]
async fn one_datagram_may_yield_many_packets_in_order() {
    let bus = Arc::new(RecordingBus::default());
    let h = start(LogHooks::none(), bus.clone()).await;
    h.codec.decodes(vec![]);
    h.codec.decodes(vec![Ok(Packet::new("connect")), Ok(Packet::new("register"))]);

    let conn = h.transport.state.connect(peer());
    conn.message(b"partial");
    conn.message(b"rest");

    assert!(eventually(|| bus.emitted.lock().unwrap().len() == 2).await);
    let emitted = bus.emitted.lock().unwrap();
    assert_eq!(emitted[0].1.cmd, "connect");
    assert_eq!(emitted[1].1.cmd, "register");
}

#[tokio::test]
async fn error_logs_unconsumed_bus_events() {
    let log = RecordingLog::default();
    let bus = Arc::new(RecordingBus::unconsumed());
    let h = start(log.hooks(), bus.clone()).await;
    h.codec.decodes(vec![Ok(Packet::new("testCmd").with("msg_id", 7))]);

    let conn = h.transport.state.connect(peer());
    conn.message(b"\x02\x00");

    assert!(eventually(|| RecordingLog::count(&log.error) == 1).await);
    let (message, fields) = RecordingLog::call(&log.error, 0);
    assert_eq!(message, "Unconsumed MQTTSN packet");
    assert_eq!(fields.message_id(), message_ids::UNCONSUMED_PACKET);
    assert_eq!(fields.client_key(), "::1_12345");
    assert_eq!(fields.get("cmd").and_then(|v| v.as_str()), Some("testCmd"));
    assert_eq!(fields.get("msg_id").and_then(|v| v.as_u64()), Some(7));
}

#[tokio::test]
async fn listens_for_egress_packets_on_the_bus() {
    let bus = Arc::new(RecordingBus::default());
    let h = start(LogHooks::none(), bus.clone()).await;

    let _conn = h.transport.state.connect(peer());

    assert!(eventually(|| bus.subscribed.lock().unwrap().len() == 1).await);
    assert_eq!(bus.subscribed.lock().unwrap()[0].0, egress_topic());
}

#[tokio::test]
async fn encodes_and_transmits_egress_packets() {
    let bus = Arc::new(RecordingBus::default());
    let h = start(LogHooks::none(), bus.clone()).await;

    let conn = h.transport.state.connect(peer());
    assert!(eventually(|| bus.subscribed.lock().unwrap().len() == 1).await);

    let packet = Packet::new("pingresp");
    bus.listener(0)(&packet);

    assert_eq!(h.codec.state.generated.lock().unwrap().as_slice(), &[packet]);
    assert_eq!(conn.sender.sent.lock().unwrap().as_slice(), &[Bytes::from("pingresp")]);
}

#[tokio::test]
async fn error_logs_unencodable_egress_packets() {
    let log = RecordingLog::default();
    let bus = Arc::new(RecordingBus::default());
    let h = start(log.hooks(), bus.clone()).await;
    h.codec.fails_encoding(CodecError::UnknownCommand(String::new()));

    let conn = h.transport.state.connect(peer());
    assert!(eventually(|| bus.subscribed.lock().unwrap().len() == 1).await);

    bus.listener(0)(&Packet::default().with("test", 1234));

    assert!(conn.sender.sent.lock().unwrap().is_empty());
    assert_eq!(RecordingLog::count(&log.error), 1);
    let (message, fields) = RecordingLog::call(&log.error, 0);
    assert_eq!(message, "Generator error: unknown command ''");
    assert_eq!(fields.message_id(), message_ids::GENERATOR_ERROR);
    assert_eq!(fields.client_key(), "::1_12345");
    assert_eq!(fields.get("test").and_then(|v| v.as_u64()), Some(1234));
    assert!(fields.get("stack").is_some());
    assert!(bus.removed.lock().unwrap().is_empty());
}

#[tokio::test]
async fn removes_egress_listener_on_disconnect() {
    let bus = Arc::new(RecordingBus::default());
    let h = start(LogHooks::none(), bus.clone()).await;

    let conn = h.transport.state.connect(peer());
    conn.close();
    conn.close();

    assert!(eventually(|| bus.removed.lock().unwrap().len() == 1).await);
    let removed = bus.removed.lock().unwrap();
    let subscribed = bus.subscribed.lock().unwrap();
    assert_eq!(removed[0].0, egress_topic());
    assert!(Arc::ptr_eq(&removed[0].1, &subscribed[0].1));
}

#[tokio::test]
async fn peer_errors_do_not_disturb_sessions() {
    let bus = Arc::new(RecordingBus::default());
    let h = start(LogHooks::none(), bus.clone()).await;
    h.codec.decodes(vec![Ok(Packet::new("pingreq"))]);

    let conn = h.transport.state.connect(peer());
    h.transport.state.emit(ServerEvent::Error {
        peer: "[::1]:4000".parse().unwrap(),
        error: TransportError::Refused("session limit reached".into()),
    });
    conn.message(b"\x02\x16");

    assert!(eventually(|| bus.emitted.lock().unwrap().len() == 1).await);
    assert!(bus.removed.lock().unwrap().is_empty());
}

#[tokio::test]
async fn stop_closes_server_and_sessions() {
    let log = RecordingLog::default();
    let bus = Arc::new(RecordingBus::default());
    let mut h = start(log.hooks(), bus.clone()).await;

    let _first = h.transport.state.connect(peer());
    let _second = h.transport.state.connect("[::1]:54321".parse().unwrap());
    assert!(eventually(|| bus.subscribed.lock().unwrap().len() == 2).await);

    h.gateway.stop().await;
    assert!(h.gateway.is_stopped());
    assert_eq!(h.transport.state.closes.load(Ordering::SeqCst), 1);
    assert_eq!(bus.removed.lock().unwrap().len(), 2);

    h.gateway.stop().await;
    assert_eq!(h.transport.state.closes.load(Ordering::SeqCst), 1);
    assert_eq!(bus.removed.lock().unwrap().len(), 2);

    let closed = log
        .debug
        .lock()
        .unwrap()
        .iter()
        .filter(|(_, f)| f.message_id() == message_ids::CONNECTION_CLOSED)
        .count();
    assert_eq!(closed, 2);
}

#[tokio::test]
async fn end_to_end_over_event_bus() {
    let log = RecordingLog::default();
    let bus = EventBus::new();
    let mut h = start(log.hooks(), Arc::new(bus.clone())).await;

    let received = Arc::new(std::sync::Mutex::new(Vec::new()));
    let sink = Arc::clone(&received);
    bus.on(
        TopicKey::new("snUnicastIngress", "::1_12345", "testCmd"),
        Arc::new(move |p: &Packet| sink.lock().unwrap().push(p.clone())),
    );
    h.codec.decodes(vec![Ok(Packet::new("testCmd"))]);

    let conn = h.transport.state.connect(peer());
    conn.message(b"\x02\x00");

    assert!(eventually(|| received.lock().unwrap().len() == 1).await);
    assert_eq!(
        received.lock().unwrap()[0].client_key.as_ref().map(|k| k.as_str()),
        Some("::1_12345")
    );
    assert_eq!(bus.listener_count(&egress_topic()), 1);

    let reply = Packet::new("pingresp");
    assert!(bus.emit(&TopicKey::new("snUnicastOutgress", "::1_12345", "pingresp"), &reply));
    assert_eq!(conn.sender.sent.lock().unwrap().as_slice(), &[Bytes::from("pingresp")]);

    conn.close();
    assert!(eventually(|| bus.listener_count(&egress_topic()) == 0).await);
    assert!(!bus.emit(&TopicKey::new("snUnicastOutgress", "::1_12345", "pingresp"), &reply));
    assert_eq!(conn.sender.sent.lock().unwrap().len(), 1);
    assert_eq!(RecordingLog::count(&log.error), 0);

    h.gateway.stop().await;
}

#[tokio::test]
async fn empty_packet_on_wildcard_topic_is_sent_once() {
    let log = RecordingLog::default();
    let bus = EventBus::new();
    let mut h = start(log.hooks(), Arc::new(bus.clone())).await;

    let published = Arc::new(std::sync::Mutex::new(Vec::new()));
    let sink = Arc::clone(&published);
    bus.on(
        TopicKey::new("snUnicastIngress", "::1_12345", "testCmd"),
        Arc::new(move |p: &Packet| sink.lock().unwrap().push(serde_json::to_value(p).unwrap())),
    );
    h.codec.decodes(vec![Ok(Packet::new("testCmd"))]);
    h.codec.encodes(Bytes::from_static(b"\x02\x17"));

    let conn = h.transport.state.connect(peer());
    conn.message(b"\x02\x00");

    assert!(eventually(|| published.lock().unwrap().len() == 1).await);
    assert_eq!(
        published.lock().unwrap()[0],
        serde_json::json!({ "cmd": "testCmd", "clientKey": "::1_12345" })
    );

    assert!(bus.emit(&egress_topic(), &Packet::default()));
    assert_eq!(h.codec.state.generated.lock().unwrap().as_slice(), &[Packet::default()]);
    assert_eq!(
        conn.sender.sent.lock().unwrap().as_slice(),
        &[Bytes::from_static(b"\x02\x17")]
    );

    conn.close();
    assert!(eventually(|| RecordingLog::count(&log.debug) == 2).await);
    assert_eq!(bus.listener_count(&egress_topic()), 0);
    let (message, fields) = RecordingLog::call(&log.debug, 1);
    assert_eq!(message, "Connection to [::1]:12345 closed");
    assert_eq!(fields.message_id(), message_ids::CONNECTION_CLOSED);

    h.gateway.stop().await;
}
