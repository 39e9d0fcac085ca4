//! Packet codec subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound:  datagrams → Decoder::parse (buffers partial frames) → Packet*
//! Outbound: Packet → Codec::generate → datagram
//! ```
//!
//! # Design Decisions
//! - One decoder per session; decoders never share buffered state
//! - A decode error is reported per frame and does not poison the decoder
//! - Encoding is synchronous and fallible

pub mod mqttsn;
pub mod packet;

use bytes::Bytes;
use thiserror::Error;

pub use mqttsn::MqttSnCodec;
pub use packet::Packet;

/// Errors produced while decoding or encoding packets.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// The length header describes an impossible frame.
    #[error("invalid frame length {0}")]
    InvalidLength(usize),

    /// The message type byte is not supported.
    #[error("unknown message type 0x{0:02x}")]
    UnknownMessageType(u8),

    /// The frame ended before all fields were read.
    #[error("truncated {0} packet")]
    Truncated(&'static str),

    /// The packet's `cmd` has no encoding.
    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    /// A field required for encoding is absent.
    #[error("missing field '{field}' in {cmd} packet")]
    MissingField { cmd: String, field: &'static str },

    /// A field is present but has the wrong type or range.
    #[error("invalid field '{field}' in {cmd} packet: {reason}")]
    InvalidField {
        cmd: String,
        field: &'static str,
        reason: String,
    },

    /// The encoded packet exceeds the maximum frame size.
    #[error("packet too large: {0} bytes")]
    TooLarge(usize),
}

/// Incremental, stateful decoder owned by exactly one session.
pub trait Decoder: Send {
    /// Feed one chunk of bytes.
    ///
    /// Returns every packet (or per-frame error) completed by this chunk, in
    /// order. Incomplete frames stay buffered for the next call.
    fn parse(&mut self, chunk: &[u8]) -> Vec<Result<Packet, CodecError>>;
}

/// A packet format.
pub trait Codec: Send + Sync {
    /// Create a fresh decoder.
    fn parser(&self) -> Box<dyn Decoder>;

    /// Encode one packet into a single datagram.
    fn generate(&self, packet: &Packet) -> Result<Bytes, CodecError>;
}
