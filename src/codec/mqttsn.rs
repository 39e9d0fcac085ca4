//! MQTT-SN v1.2 codec.
//!
//! # Framing
//! ```text
//! | length (1) | type (1) | body ... |               length <= 255
//! | 0x01 | length (2, BE) | type (1) | body ... |    length <= 65535
//! ```
//! `length` always counts the whole frame, header included.
//!
//! Packets are mapped onto [`Packet`] with snake_case field names
//! (`msg_id`, `topic_id`, `return_code`, ...). Binary data (`payload`,
//! `will_msg`, `gw_add`) is carried as an array of byte values.

use bytes::{BufMut, Bytes, BytesMut};
use serde_json::Value;

use crate::codec::{Codec, CodecError, Decoder, Packet};

const ADVERTISE: u8 = 0x00;
const SEARCHGW: u8 = 0x01;
const GWINFO: u8 = 0x02;
const CONNECT: u8 = 0x04;
const CONNACK: u8 = 0x05;
const WILLTOPICREQ: u8 = 0x06;
const WILLTOPIC: u8 = 0x07;
const WILLMSGREQ: u8 = 0x08;
const WILLMSG: u8 = 0x09;
const REGISTER: u8 = 0x0a;
const REGACK: u8 = 0x0b;
const PUBLISH: u8 = 0x0c;
const PUBACK: u8 = 0x0d;
const PUBCOMP: u8 = 0x0e;
const PUBREC: u8 = 0x0f;
const PUBREL: u8 = 0x10;
const SUBSCRIBE: u8 = 0x12;
const SUBACK: u8 = 0x13;
const UNSUBSCRIBE: u8 = 0x14;
const UNSUBACK: u8 = 0x15;
const PINGREQ: u8 = 0x16;
const PINGRESP: u8 = 0x17;
const DISCONNECT: u8 = 0x18;

const COMMANDS: &[(u8, &str)] = &[
    (ADVERTISE, "advertise"),
    (SEARCHGW, "searchgw"),
    (GWINFO, "gwinfo"),
    (CONNECT, "connect"),
    (CONNACK, "connack"),
    (WILLTOPICREQ, "willtopicreq"),
    (WILLTOPIC, "willtopic"),
    (WILLMSGREQ, "willmsgreq"),
    (WILLMSG, "willmsg"),
    (REGISTER, "register"),
    (REGACK, "regack"),
    (PUBLISH, "publish"),
    (PUBACK, "puback"),
    (PUBCOMP, "pubcomp"),
    (PUBREC, "pubrec"),
    (PUBREL, "pubrel"),
    (SUBSCRIBE, "subscribe"),
    (SUBACK, "suback"),
    (UNSUBSCRIBE, "unsubscribe"),
    (UNSUBACK, "unsuback"),
    (PINGREQ, "pingreq"),
    (PINGRESP, "pingresp"),
    (DISCONNECT, "disconnect"),
];

const FLAG_DUP: u8 = 0x80;
const FLAG_QOS_MASK: u8 = 0x60;
const FLAG_QOS_SHIFT: u8 = 5;
const FLAG_RETAIN: u8 = 0x10;
const FLAG_WILL: u8 = 0x08;
const FLAG_CLEAN_SESSION: u8 = 0x04;
const FLAG_TOPIC_ID_TYPE_MASK: u8 = 0x03;

const PROTOCOL_ID: u8 = 0x01;
const LONG_LENGTH_MARKER: u8 = 0x01;
const MAX_FRAME_LEN: usize = 0xffff;

const TOPIC_NORMAL: u8 = 0;
const TOPIC_PREDEFINED: u8 = 1;
const TOPIC_SHORT_NAME: u8 = 2;

fn command_name(msg_type: u8) -> Option<&'static str> {
    COMMANDS.iter().find(|(t, _)| *t == msg_type).map(|(_, name)| *name)
}

fn message_type(cmd: &str) -> Option<u8> {
    COMMANDS.iter().find(|(_, name)| *name == cmd).map(|(t, _)| *t)
}

/// The MQTT-SN codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct MqttSnCodec;

impl Codec for MqttSnCodec {
    fn parser(&self) -> Box<dyn Decoder> {
        Box::new(MqttSnDecoder::default())
    }

    fn generate(&self, packet: &Packet) -> Result<Bytes, CodecError> {
        encode(packet)
    }
}

/// Buffers partial frames between calls to [`Decoder::parse`].
#[derive(Debug, Default)]
pub struct MqttSnDecoder {
    buffer: BytesMut,
}

impl Decoder for MqttSnDecoder {
    fn parse(&mut self, chunk: &[u8]) -> Vec<Result<Packet, CodecError>> {
        self.buffer.extend_from_slice(chunk);

        let mut decoded = Vec::new();
        loop {
            match frame_length(&self.buffer) {
                None => break,
                Some(Ok(len)) => {
                    let frame = self.buffer.split_to(len);
                    decoded.push(decode_frame(&frame));
                }
                Some(Err(e)) => {
                    // The length header is the only sync point, so nothing after it can be trusted.
                    self.buffer.clear();
                    decoded.push(Err(e));
                    break;
                }
            }
        }
        decoded
    }
}

/// Length of the next complete frame, `None` while more bytes are needed.
fn frame_length(buf: &[u8]) -> Option<Result<usize, CodecError>> {
    let first = *buf.first()?;
    let (len, header_len) = if first == LONG_LENGTH_MARKER {
        if buf.len() < 3 {
            return None;
        }
        (u16::from_be_bytes([buf[1], buf[2]]) as usize, 3)
    } else {
        (first as usize, 1)
    };

    if len < header_len + 1 {
        return Some(Err(CodecError::InvalidLength(len)));
    }
    if buf.len() < len {
        return None;
    }
    Some(Ok(len))
}

fn header_len(frame: &[u8]) -> usize {
    if frame.first() == Some(&LONG_LENGTH_MARKER) {
        3
    } else {
        1
    }
}

fn decode_frame(frame: &[u8]) -> Result<Packet, CodecError> {
    let header = header_len(frame);
    let msg_type = *frame
        .get(header)
        .ok_or(CodecError::InvalidLength(frame.len()))?;
    let cmd = command_name(msg_type).ok_or(CodecError::UnknownMessageType(msg_type))?;

    let mut r = Reader {
        cmd,
        buf: &frame[header + 1..],
    };
    let mut p = Packet::new(cmd);

    match msg_type {
        ADVERTISE => {
            p.set("gw_id", r.u8()?);
            p.set("duration", r.u16()?);
        }
        SEARCHGW => p.set("radius", r.u8()?),
        GWINFO => {
            p.set("gw_id", r.u8()?);
            let add = r.rest();
            if !add.is_empty() {
                p.set("gw_add", bytes_value(add));
            }
        }
        CONNECT => {
            let flags = r.u8()?;
            let protocol_id = r.u8()?;
            if protocol_id != PROTOCOL_ID {
                return Err(r.invalid("protocol_id", format!("unsupported protocol 0x{:02x}", protocol_id)));
            }
            p.set("will", flags & FLAG_WILL != 0);
            p.set("clean_session", flags & FLAG_CLEAN_SESSION != 0);
            p.set("duration", r.u16()?);
            p.set("client_id", r.string("client_id")?);
        }
        CONNACK => p.set("return_code", r.u8()?),
        WILLTOPICREQ | WILLMSGREQ | PINGRESP => {}
        WILLTOPIC => {
            // An empty WILLTOPIC deletes the will.
            if !r.is_empty() {
                let flags = r.u8()?;
                p.set("qos", decode_qos(flags));
                p.set("retain", flags & FLAG_RETAIN != 0);
                p.set("will_topic", r.string("will_topic")?);
            }
        }
        WILLMSG => p.set("will_msg", bytes_value(r.rest())),
        REGISTER => {
            p.set("topic_id", r.u16()?);
            p.set("msg_id", r.u16()?);
            p.set("topic_name", r.string("topic_name")?);
        }
        REGACK | PUBACK => {
            p.set("topic_id", r.u16()?);
            p.set("msg_id", r.u16()?);
            p.set("return_code", r.u8()?);
        }
        PUBLISH => {
            let flags = r.u8()?;
            let topic_type = r.topic_id_type(flags)?;
            p.set("dup", flags & FLAG_DUP != 0);
            p.set("qos", decode_qos(flags));
            p.set("retain", flags & FLAG_RETAIN != 0);
            p.set("topic_id_type", topic_type_name(topic_type));
            if topic_type == TOPIC_SHORT_NAME {
                p.set("topic_name", r.short_name()?);
            } else {
                p.set("topic_id", r.u16()?);
            }
            p.set("msg_id", r.u16()?);
            p.set("payload", bytes_value(r.rest()));
        }
        PUBCOMP | PUBREC | PUBREL | UNSUBACK => p.set("msg_id", r.u16()?),
        SUBSCRIBE | UNSUBSCRIBE => {
            let flags = r.u8()?;
            let topic_type = r.topic_id_type(flags)?;
            if msg_type == SUBSCRIBE {
                p.set("dup", flags & FLAG_DUP != 0);
                p.set("qos", decode_qos(flags));
            }
            p.set("topic_id_type", topic_type_name(topic_type));
            p.set("msg_id", r.u16()?);
            match topic_type {
                TOPIC_NORMAL => p.set("topic_name", r.string("topic_name")?),
                TOPIC_PREDEFINED => p.set("topic_id", r.u16()?),
                _ => p.set("topic_name", r.short_name()?),
            }
        }
        SUBACK => {
            let flags = r.u8()?;
            p.set("qos", decode_qos(flags));
            p.set("topic_id", r.u16()?);
            p.set("msg_id", r.u16()?);
            p.set("return_code", r.u8()?);
        }
        PINGREQ => {
            if !r.is_empty() {
                p.set("client_id", r.string("client_id")?);
            }
        }
        DISCONNECT => {
            if !r.is_empty() {
                p.set("duration", r.u16()?);
            }
        }
        other => return Err(CodecError::UnknownMessageType(other)),
    }

    Ok(p)
}

fn decode_qos(flags: u8) -> i64 {
    match (flags & FLAG_QOS_MASK) >> FLAG_QOS_SHIFT {
        3 => -1,
        qos => qos as i64,
    }
}

fn topic_type_name(topic_type: u8) -> &'static str {
    match topic_type {
        TOPIC_PREDEFINED => "predefined",
        TOPIC_SHORT_NAME => "short_name",
        _ => "normal",
    }
}

fn bytes_value(bytes: &[u8]) -> Value {
    Value::Array(bytes.iter().map(|b| Value::from(*b)).collect())
}

struct Reader<'a> {
    cmd: &'static str,
    buf: &'a [u8],
}

impl<'a> Reader<'a> {
    fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        if self.buf.len() < n {
            return Err(CodecError::Truncated(self.cmd));
        }
        let (head, tail) = self.buf.split_at(n);
        self.buf = tail;
        Ok(head)
    }

    fn u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, CodecError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn rest(&mut self) -> &'a [u8] {
        std::mem::take(&mut self.buf)
    }

    fn string(&mut self, field: &'static str) -> Result<String, CodecError> {
        let raw = self.rest();
        String::from_utf8(raw.to_vec()).map_err(|e| self.invalid(field, e.to_string()))
    }

    fn short_name(&mut self) -> Result<String, CodecError> {
        let raw = self.take(2)?;
        String::from_utf8(raw.to_vec()).map_err(|e| self.invalid("topic_name", e.to_string()))
    }

    fn topic_id_type(&self, flags: u8) -> Result<u8, CodecError> {
        match flags & FLAG_TOPIC_ID_TYPE_MASK {
            3 => Err(self.invalid("topic_id_type", "reserved topic id type".to_string())),
            t => Ok(t),
        }
    }

    fn invalid(&self, field: &'static str, reason: String) -> CodecError {
        CodecError::InvalidField {
            cmd: self.cmd.to_string(),
            field,
            reason,
        }
    }
}

fn encode(packet: &Packet) -> Result<Bytes, CodecError> {
    let msg_type =
        message_type(&packet.cmd).ok_or_else(|| CodecError::UnknownCommand(packet.cmd.clone()))?;
    let f = Fields { packet };
    let mut body = BytesMut::new();

    match msg_type {
        ADVERTISE => {
            body.put_u8(f.u8("gw_id")?);
            body.put_u16(f.u16("duration")?);
        }
        SEARCHGW => body.put_u8(f.u8("radius")?),
        GWINFO => {
            body.put_u8(f.u8("gw_id")?);
            body.extend_from_slice(&f.bytes("gw_add")?);
        }
        CONNECT => {
            let mut flags = 0;
            if f.flag("will")? {
                flags |= FLAG_WILL;
            }
            if f.flag("clean_session")? {
                flags |= FLAG_CLEAN_SESSION;
            }
            body.put_u8(flags);
            body.put_u8(PROTOCOL_ID);
            body.put_u16(f.u16("duration")?);
            body.extend_from_slice(f.string("client_id")?.as_bytes());
        }
        CONNACK => body.put_u8(f.u8("return_code")?),
        WILLTOPICREQ | WILLMSGREQ | PINGRESP => {}
        WILLTOPIC => {
            if let Some(topic) = f.opt_string("will_topic")? {
                let mut flags = f.qos()?;
                if f.flag("retain")? {
                    flags |= FLAG_RETAIN;
                }
                body.put_u8(flags);
                body.extend_from_slice(topic.as_bytes());
            }
        }
        WILLMSG => body.extend_from_slice(&f.bytes("will_msg")?),
        REGISTER => {
            body.put_u16(f.opt_u16("topic_id")?.unwrap_or(0));
            body.put_u16(f.u16("msg_id")?);
            body.extend_from_slice(f.string("topic_name")?.as_bytes());
        }
        REGACK | PUBACK => {
            body.put_u16(f.u16("topic_id")?);
            body.put_u16(f.u16("msg_id")?);
            body.put_u8(f.u8("return_code")?);
        }
        PUBLISH => {
            let topic_type = f.topic_id_type()?;
            let mut flags = f.qos()? | topic_type;
            if f.flag("dup")? {
                flags |= FLAG_DUP;
            }
            if f.flag("retain")? {
                flags |= FLAG_RETAIN;
            }
            body.put_u8(flags);
            if topic_type == TOPIC_SHORT_NAME {
                body.extend_from_slice(&f.short_name()?);
            } else {
                body.put_u16(f.u16("topic_id")?);
            }
            body.put_u16(f.opt_u16("msg_id")?.unwrap_or(0));
            body.extend_from_slice(&f.bytes("payload")?);
        }
        PUBCOMP | PUBREC | PUBREL | UNSUBACK => body.put_u16(f.u16("msg_id")?),
        SUBSCRIBE | UNSUBSCRIBE => {
            let topic_type = f.topic_id_type()?;
            let mut flags = topic_type;
            if msg_type == SUBSCRIBE {
                flags |= f.qos()?;
                if f.flag("dup")? {
                    flags |= FLAG_DUP;
                }
            }
            body.put_u8(flags);
            body.put_u16(f.u16("msg_id")?);
            match topic_type {
                TOPIC_NORMAL => body.extend_from_slice(f.string("topic_name")?.as_bytes()),
                TOPIC_PREDEFINED => body.put_u16(f.u16("topic_id")?),
                _ => body.extend_from_slice(&f.short_name()?),
            }
        }
        SUBACK => {
            body.put_u8(f.qos()?);
            body.put_u16(f.opt_u16("topic_id")?.unwrap_or(0));
            body.put_u16(f.u16("msg_id")?);
            body.put_u8(f.u8("return_code")?);
        }
        PINGREQ => {
            if let Some(client_id) = f.opt_string("client_id")? {
                body.extend_from_slice(client_id.as_bytes());
            }
        }
        DISCONNECT => {
            if let Some(duration) = f.opt_u16("duration")? {
                body.put_u16(duration);
            }
        }
        other => return Err(CodecError::UnknownMessageType(other)),
    }

    frame(msg_type, &body)
}

fn frame(msg_type: u8, body: &[u8]) -> Result<Bytes, CodecError> {
    let short_len = body.len() + 2;
    let mut out = BytesMut::with_capacity(short_len + 2);
    if short_len <= 0xff {
        out.put_u8(short_len as u8);
    } else {
        let long_len = body.len() + 4;
        if long_len > MAX_FRAME_LEN {
            return Err(CodecError::TooLarge(long_len));
        }
        out.put_u8(LONG_LENGTH_MARKER);
        out.put_u16(long_len as u16);
    }
    out.put_u8(msg_type);
    out.extend_from_slice(body);
    Ok(out.freeze())
}

/// Typed access to a packet's fields for encoding.
struct Fields<'a> {
    packet: &'a Packet,
}

impl<'a> Fields<'a> {
    fn missing(&self, field: &'static str) -> CodecError {
        CodecError::MissingField {
            cmd: self.packet.cmd.clone(),
            field,
        }
    }

    fn invalid(&self, field: &'static str, reason: impl Into<String>) -> CodecError {
        CodecError::InvalidField {
            cmd: self.packet.cmd.clone(),
            field,
            reason: reason.into(),
        }
    }

    fn opt_uint(&self, field: &'static str, max: u64) -> Result<Option<u64>, CodecError> {
        match self.packet.get(field) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => match value.as_u64() {
                Some(n) if n <= max => Ok(Some(n)),
                _ => Err(self.invalid(field, format!("expected an integer in 0..={}", max))),
            },
        }
    }

    fn u8(&self, field: &'static str) -> Result<u8, CodecError> {
        self.opt_uint(field, u8::MAX as u64)?
            .map(|n| n as u8)
            .ok_or_else(|| self.missing(field))
    }

    fn u16(&self, field: &'static str) -> Result<u16, CodecError> {
        self.opt_u16(field)?.ok_or_else(|| self.missing(field))
    }

    fn opt_u16(&self, field: &'static str) -> Result<Option<u16>, CodecError> {
        Ok(self.opt_uint(field, u16::MAX as u64)?.map(|n| n as u16))
    }

    /// Absent flags are false.
    fn flag(&self, field: &'static str) -> Result<bool, CodecError> {
        match self.packet.get(field) {
            None | Some(Value::Null) => Ok(false),
            Some(Value::Bool(b)) => Ok(*b),
            Some(_) => Err(self.invalid(field, "expected a boolean")),
        }
    }

    fn opt_string(&self, field: &'static str) -> Result<Option<&'a str>, CodecError> {
        match self.packet.get(field) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.as_str())),
            Some(_) => Err(self.invalid(field, "expected a string")),
        }
    }

    fn string(&self, field: &'static str) -> Result<&'a str, CodecError> {
        self.opt_string(field)?.ok_or_else(|| self.missing(field))
    }

    /// Binary data given as an array of byte values or as a UTF-8 string.
    /// Absent data encodes as empty.
    fn bytes(&self, field: &'static str) -> Result<Vec<u8>, CodecError> {
        match self.packet.get(field) {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(Value::String(s)) => Ok(s.as_bytes().to_vec()),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| match item.as_u64() {
                    Some(b) if b <= u8::MAX as u64 => Ok(b as u8),
                    _ => Err(self.invalid(field, "expected byte values")),
                })
                .collect(),
            Some(_) => Err(self.invalid(field, "expected a byte array or string")),
        }
    }

    /// QoS bits; absent means 0, -1 is encoded as 0b11.
    fn qos(&self) -> Result<u8, CodecError> {
        let qos = match self.packet.get("qos") {
            None | Some(Value::Null) => 0,
            Some(value) => match value.as_i64() {
                Some(-1) => 3,
                Some(q @ 0..=2) => q as u8,
                _ => return Err(self.invalid("qos", "expected -1, 0, 1 or 2")),
            },
        };
        Ok(qos << FLAG_QOS_SHIFT)
    }

    fn topic_id_type(&self) -> Result<u8, CodecError> {
        match self.opt_string("topic_id_type")? {
            None | Some("normal") => Ok(TOPIC_NORMAL),
            Some("predefined") => Ok(TOPIC_PREDEFINED),
            Some("short_name") => Ok(TOPIC_SHORT_NAME),
            Some(other) => Err(self.invalid("topic_id_type", format!("unknown type '{}'", other))),
        }
    }

    fn short_name(&self) -> Result<[u8; 2], CodecError> {
        let name = self.string("topic_name")?.as_bytes();
        <[u8; 2]>::try_from(name).map_err(|_| self.invalid("topic_name", "short names are exactly two bytes"))
    }
}
