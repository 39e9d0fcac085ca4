//! Shared fakes for gateway integration tests.
#![allow(dead_code)]

use bytes::Bytes;
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

use mqttsn_dtls_gateway::bus::{Bus, Listener, TopicKey};
use mqttsn_dtls_gateway::codec::{Codec, CodecError, Decoder, Packet};
use mqttsn_dtls_gateway::config::BindConfig;
use mqttsn_dtls_gateway::net::{
    Connection, ConnectionEvent, DatagramSender, SecureServer, ServerEvent, ServerEventSender,
    Transport, TransportError,
};
use mqttsn_dtls_gateway::observability::{LogFields, LogFn, LogHooks};

pub const PEER: &str = "[::1]:12345";

pub fn peer() -> SocketAddr {
    PEER.parse().unwrap()
}

/// Poll `cond` until it holds or a second passes.
pub async fn eventually(mut cond: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct TransportState {
    events: Mutex<Option<ServerEventSender>>,
    pub binds: Mutex<Vec<BindConfig>>,
    pub closes: AtomicUsize,
    pub fail_with: Mutex<Option<TransportError>>,
}

impl TransportState {
    pub fn emit(&self, event: ServerEvent) {
        let events = self.events.lock().unwrap();
        events
            .as_ref()
            .expect("server not created")
            .send(event)
            .expect("dispatcher gone");
    }

    /// Announce an established connection from `peer`.
    pub fn connect(&self, peer: SocketAddr) -> FakeConnection {
        let (tx, rx) = mpsc::unbounded_channel();
        let sender = Arc::new(RecordingSender::default());
        self.emit(ServerEvent::SecureConnection(Connection::new(
            peer,
            sender.clone(),
            rx,
        )));
        FakeConnection { events: tx, sender }
    }
}

/// The test-side ends of a fake connection.
pub struct FakeConnection {
    pub events: mpsc::UnboundedSender<ConnectionEvent>,
    pub sender: Arc<RecordingSender>,
}

impl FakeConnection {
    pub fn message(&self, datagram: &'static [u8]) {
        self.events
            .send(ConnectionEvent::Message(Bytes::from_static(datagram)))
            .unwrap();
    }

    pub fn close(&self) {
        let _ = self.events.send(ConnectionEvent::Close);
    }
}

#[derive(Default, Clone)]
pub struct MockTransport {
    pub state: Arc<TransportState>,
}

impl MockTransport {
    pub fn failing(error: TransportError) -> Self {
        let transport = Self::default();
        *transport.state.fail_with.lock().unwrap() = Some(error);
        transport
    }
}

impl Transport for MockTransport {
    fn create_server(&self, events: ServerEventSender) -> Result<Box<dyn SecureServer>, TransportError> {
        if let Some(error) = self.state.fail_with.lock().unwrap().clone() {
            return Err(error);
        }
        *self.state.events.lock().unwrap() = Some(events);
        Ok(Box::new(MockServer {
            state: Arc::clone(&self.state),
        }))
    }
}

struct MockServer {
    state: Arc<TransportState>,
}

impl SecureServer for MockServer {
    fn bind(&mut self, bind: &BindConfig) {
        self.state.binds.lock().unwrap().push(bind.clone());
    }

    fn close(&mut self) {
        self.state.closes.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Default)]
pub struct RecordingSender {
    pub sent: Mutex<Vec<Bytes>>,
}

impl DatagramSender for RecordingSender {
    fn send(&self, datagram: Bytes) -> Result<(), TransportError> {
        self.sent.lock().unwrap().push(datagram);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Codec
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct CodecState {
    /// Chunks fed to any decoder, in order.
    pub fed: Mutex<Vec<Vec<u8>>>,
    /// Results returned by successive `parse` calls; empty when exhausted.
    pub decoded: Mutex<VecDeque<Vec<Result<Packet, CodecError>>>>,
    /// Packets passed to `generate`.
    pub generated: Mutex<Vec<Packet>>,
    pub encode_error: Mutex<Option<CodecError>>,
    /// Bytes returned by `generate`; the packet's `cmd` when unset.
    pub encoded: Mutex<Option<Bytes>>,
    pub parsers: AtomicUsize,
}

#[derive(Default, Clone)]
pub struct ScriptedCodec {
    pub state: Arc<CodecState>,
}

impl ScriptedCodec {
    pub fn decodes(&self, results: Vec<Result<Packet, CodecError>>) {
        self.state.decoded.lock().unwrap().push_back(results);
    }

    pub fn encodes(&self, datagram: Bytes) {
        *self.state.encoded.lock().unwrap() = Some(datagram);
    }

    pub fn fails_encoding(&self, error: CodecError) {
        *self.state.encode_error.lock().unwrap() = Some(error);
    }
}

impl Codec for ScriptedCodec {
    fn parser(&self) -> Box<dyn Decoder> {
        self.state.parsers.fetch_add(1, Ordering::SeqCst);
        Box::new(ScriptedDecoder {
            state: Arc::clone(&self.state),
        })
    }

    fn generate(&self, packet: &Packet) -> Result<Bytes, CodecError> {
        self.state.generated.lock().unwrap().push(packet.clone());
        match self.state.encode_error.lock().unwrap().clone() {
            Some(error) => Err(error),
            None => Ok(self
                .state
                .encoded
                .lock()
                .unwrap()
                .clone()
                .unwrap_or_else(|| Bytes::from(packet.cmd.clone()))),
        }
    }
}

struct ScriptedDecoder {
    state: Arc<CodecState>,
}

impl Decoder for ScriptedDecoder {
    fn parse(&mut self, chunk: &[u8]) -> Vec<Result<Packet, CodecError>> {
        self.state.fed.lock().unwrap().push(chunk.to_vec());
        self.state.decoded.lock().unwrap().pop_front().unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Bus
// ---------------------------------------------------------------------------

/// Records every bus call without routing anything.
pub struct RecordingBus {
    pub subscribed: Mutex<Vec<(TopicKey, Listener)>>,
    pub removed: Mutex<Vec<(TopicKey, Listener)>>,
    pub emitted: Mutex<Vec<(TopicKey, Packet)>>,
    pub consumed: AtomicBool,
}

impl Default for RecordingBus {
    fn default() -> Self {
        Self {
            subscribed: Mutex::default(),
            removed: Mutex::default(),
            emitted: Mutex::default(),
            consumed: AtomicBool::new(true),
        }
    }
}

impl RecordingBus {
    pub fn unconsumed() -> Self {
        let bus = Self::default();
        bus.consumed.store(false, Ordering::SeqCst);
        bus
    }

    pub fn listener(&self, index: usize) -> Listener {
        Arc::clone(&self.subscribed.lock().unwrap()[index].1)
    }
}

impl Bus for RecordingBus {
    fn on(&self, topic: TopicKey, listener: Listener) {
        self.subscribed.lock().unwrap().push((topic, listener));
    }

    fn remove_listener(&self, topic: &TopicKey, listener: &Listener) {
        self.removed
            .lock()
            .unwrap()
            .push((topic.clone(), Arc::clone(listener)));
    }

    fn emit(&self, topic: &TopicKey, packet: &Packet) -> bool {
        self.emitted.lock().unwrap().push((topic.clone(), packet.clone()));
        self.consumed.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// Log hooks
// ---------------------------------------------------------------------------

pub type Calls = Arc<Mutex<Vec<(String, LogFields)>>>;

#[derive(Default, Clone)]
pub struct RecordingLog {
    pub debug: Calls,
    pub warn: Calls,
    pub error: Calls,
}

impl RecordingLog {
    pub fn hooks(&self) -> LogHooks {
        LogHooks {
            debug: Some(recorder(&self.debug)),
            warn: Some(recorder(&self.warn)),
            error: Some(recorder(&self.error)),
        }
    }

    pub fn count(calls: &Calls) -> usize {
        calls.lock().unwrap().len()
    }

    pub fn call(calls: &Calls, index: usize) -> (String, LogFields) {
        calls.lock().unwrap()[index].clone()
    }
}

fn recorder(calls: &Calls) -> LogFn {
    let calls = Arc::clone(calls);
    Arc::new(move |message: &str, fields: &LogFields| {
        calls.lock().unwrap().push((message.to_string(), fields.clone()))
    })
}
