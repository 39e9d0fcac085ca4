//! MQTT-SN gateway bridging secure datagram sessions to a publish/subscribe bus.

// Core subsystems
pub mod bus;
pub mod codec;
pub mod gateway;
pub mod net;

// Cross-cutting concerns
pub mod config;
pub mod lifecycle;
pub mod observability;

pub use bus::{Bus, EventBus, Listener, TopicKey};
pub use codec::{Codec, CodecError, Decoder, MqttSnCodec, Packet};
pub use config::schema::GatewayConfig;
pub use gateway::{configure, Gateway, GatewayOptions, Start, StopHandle};
pub use lifecycle::Shutdown;
pub use net::{ClientKey, Transport, TransportError, UdpTransport};
pub use observability::{LogFields, LogHooks};
