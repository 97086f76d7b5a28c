//! Wire protocol between the coordinator and peers
//!
//! Every framed payload starts with a fixed envelope followed by a
//! type-specific body. All multi-byte fields are big-endian; floats are
//! IEEE-754 binary64.
//!
//! # Envelope
//!
//! ```text
//! [4 bytes: magic 0x4E50524A][2 bytes: version][1 byte: message type][body...]
//! ```
//!
//! # Bodies
//!
//! ```text
//! HELLO  (1): cores u32
//! TASK   (2): a f64, b f64, h f64, method u8, peer_index u32, peer_count u32
//! RESULT (3): value f64
//! ERROR  (4): length u32, UTF-8 text
//! ```
//!
//! Bytes after a complete body are ignored.
//!
//! # Message Flow
//!
//! ```text
//! Coordinator                     Peer
//!     |                              |
//!     |<------- HELLO(cores) --------|
//!     |                              |
//!     |-- TASK(a, b, h, method) ---->|
//!     |                              |
//!     |<--- RESULT(value) / ERROR ---|
//! ```
//!
//! Either side may send ERROR; a peer receiving one gives up.

use crate::engine::Method;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

/// `"NPRJ"` in ASCII
pub const PROTOCOL_MAGIC: u32 = 0x4E50_524A;

/// Protocol version
///
/// Both sides must agree exactly; there is no negotiation.
pub const PROTOCOL_VERSION: u16 = 1;

/// Envelope size in bytes
pub const ENVELOPE_LEN: usize = 4 + 2 + 1;

/// Longest error text put on the wire, in bytes
pub const MAX_ERROR_TEXT: usize = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("bad magic 0x{0:08x} (expected 0x4e50524a)")]
    BadMagic(u32),

    #[error("protocol version mismatch: got {0}, expected 1")]
    VersionMismatch(u16),

    #[error("unknown message type: 0x{0:02x}")]
    UnknownType(u8),

    #[error("unknown integration method: 0x{0:02x}")]
    UnknownMethod(u8),

    #[error("truncated {section}: need {needed} bytes, {remaining} remaining")]
    Truncated {
        section: &'static str,
        needed: usize,
        remaining: usize,
    },

    #[error("error text is not valid UTF-8")]
    InvalidUtf8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    Hello = 1,
    Task = 2,
    Result = 3,
    Error = 4,
}

impl TryFrom<u8> for MessageType {
    type Error = ProtocolError;

    fn try_from(v: u8) -> Result<Self, ProtocolError> {
        match v {
            1 => Ok(MessageType::Hello),
            2 => Ok(MessageType::Task),
            3 => Ok(MessageType::Result),
            4 => Ok(MessageType::Error),
            other => Err(ProtocolError::UnknownType(other)),
        }
    }
}

/// Fixed header carried by every message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Envelope {
    pub magic: u32,
    pub version: u16,
    pub message_type: MessageType,
}

impl Envelope {
    pub fn new(message_type: MessageType) -> Self {
        Self {
            magic: PROTOCOL_MAGIC,
            version: PROTOCOL_VERSION,
            message_type,
        }
    }

    /// Read and check an envelope, leaving `buf` positioned at the body.
    pub fn read(buf: &mut impl Buf) -> Result<Self, ProtocolError> {
        ensure(&*buf, ENVELOPE_LEN, "envelope")?;

        let magic = buf.get_u32();
        if magic != PROTOCOL_MAGIC {
            return Err(ProtocolError::BadMagic(magic));
        }
        let version = buf.get_u16();
        if version != PROTOCOL_VERSION {
            return Err(ProtocolError::VersionMismatch(version));
        }
        let message_type = MessageType::try_from(buf.get_u8())?;

        Ok(Self {
            magic,
            version,
            message_type,
        })
    }

    pub fn write(&self, buf: &mut impl BufMut) {
        buf.put_u32(self.magic);
        buf.put_u16(self.version);
        buf.put_u8(self.message_type as u8);
    }
}

/// Peer announces itself and its execution capacity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HelloMessage {
    /// Number of parallel execution units, at least 1 when sent by a real peer
    pub cores: u32,
}

/// Sub-interval assignment sent to exactly one peer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TaskMessage {
    pub a: f64,
    pub b: f64,
    pub h: f64,
    pub method: Method,
    /// Position of the peer in dispatch order (informational)
    pub peer_index: u32,
    pub peer_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResultMessage {
    pub value: f64,
}

/// Failure report, in either direction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorMessage {
    pub text: String,
}

impl ErrorMessage {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// Protocol message
///
/// All messages exchanged between the coordinator and peers.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Peer → Coordinator, once, right after connecting
    Hello(HelloMessage),

    /// Coordinator → Peer, once, after every expected peer said hello
    Task(TaskMessage),

    /// Peer → Coordinator, the partial integral of the assigned sub-interval
    Result(ResultMessage),

    /// Either direction
    ///
    /// From a peer it stands in for a result that could not be computed; from
    /// the coordinator it tells the peer to give up.
    Error(ErrorMessage),
}

impl Message {
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::Hello(_) => MessageType::Hello,
            Message::Task(_) => MessageType::Task,
            Message::Result(_) => MessageType::Result,
            Message::Error(_) => MessageType::Error,
        }
    }

    pub fn hello(cores: u32) -> Self {
        Message::Hello(HelloMessage { cores })
    }

    pub fn result(value: f64) -> Self {
        Message::Result(ResultMessage { value })
    }

    pub fn error(text: impl Into<String>) -> Self {
        Message::Error(ErrorMessage::new(text))
    }
}

/// Encode a message into a frame payload (envelope + body, no length prefix).
pub fn encode(msg: &Message) -> Bytes {
    let mut buf = BytesMut::with_capacity(ENVELOPE_LEN + 40);
    Envelope::new(msg.message_type()).write(&mut buf);

    match msg {
        Message::Hello(hello) => {
            buf.put_u32(hello.cores);
        }
        Message::Task(task) => {
            buf.put_f64(task.a);
            buf.put_f64(task.b);
            buf.put_f64(task.h);
            buf.put_u8(task.method.code());
            buf.put_u32(task.peer_index);
            buf.put_u32(task.peer_count);
        }
        Message::Result(result) => {
            buf.put_f64(result.value);
        }
        Message::Error(error) => {
            let text = clamp_utf8(&error.text, MAX_ERROR_TEXT);
            buf.put_u32(text.len() as u32);
            buf.put_slice(text.as_bytes());
        }
    }

    buf.freeze()
}

/// Decode a frame payload into its message.
///
/// Once validated, the envelope carries nothing the message does not, so it
/// is dropped here. Use [`decode_with_envelope`] to keep it.
pub fn decode(payload: &[u8]) -> Result<Message, ProtocolError> {
    decode_with_envelope(payload).map(|(_, message)| message)
}

/// Decode a frame payload into its envelope and typed body.
///
/// The envelope is validated before the body is looked at. Trailing bytes
/// after a complete body are ignored.
pub fn decode_with_envelope(payload: &[u8]) -> Result<(Envelope, Message), ProtocolError> {
    let mut buf = payload;
    let envelope = Envelope::read(&mut buf)?;
    let message = decode_body(envelope.message_type, &mut buf)?;
    Ok((envelope, message))
}

fn decode_body(message_type: MessageType, buf: &mut &[u8]) -> Result<Message, ProtocolError> {
    match message_type {
        MessageType::Hello => {
            ensure(&*buf, 4, "hello body")?;
            Ok(Message::hello(buf.get_u32()))
        }
        MessageType::Task => {
            ensure(&*buf, 8 * 3 + 1 + 4 * 2, "task body")?;
            let a = buf.get_f64();
            let b = buf.get_f64();
            let h = buf.get_f64();
            let code = buf.get_u8();
            let method = Method::from_code(code).ok_or(ProtocolError::UnknownMethod(code))?;
            let peer_index = buf.get_u32();
            let peer_count = buf.get_u32();
            Ok(Message::Task(TaskMessage {
                a,
                b,
                h,
                method,
                peer_index,
                peer_count,
            }))
        }
        MessageType::Result => {
            ensure(&*buf, 8, "result body")?;
            Ok(Message::result(buf.get_f64()))
        }
        MessageType::Error => {
            ensure(&*buf, 4, "error text length")?;
            let len = buf.get_u32() as usize;
            ensure(&*buf, len, "error text")?;
            let text = std::str::from_utf8(&buf[..len]).map_err(|_| ProtocolError::InvalidUtf8)?;
            Ok(Message::error(text))
        }
    }
}

fn ensure(buf: &impl Buf, needed: usize, section: &'static str) -> Result<(), ProtocolError> {
    if buf.remaining() < needed {
        return Err(ProtocolError::Truncated {
            section,
            needed,
            remaining: buf.remaining(),
        });
    }
    Ok(())
}

/// Longest prefix of `s` that fits in `max` bytes without splitting a char.
fn clamp_utf8(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
