//! I2NP messages: typed, length-prefixed, checksummed, expiring binary
//! messages carried over every tunnel and transport.

use crate::error::{I2npError, Result};
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};

/// Absolute cap on a long-header message's total size.
pub const MAX_MESSAGE_SIZE: usize = 32 * 1024;
/// Cap on the short-header transport variant.
pub const MAX_SHORT_MESSAGE_SIZE: usize = 4 * 1024;
/// Default time-to-live for a freshly built message.
pub const DEFAULT_EXPIRATION_MS: u64 = 60_000;

const LONG_HEADER_SIZE: usize = 1 + 4 + 8 + 2 + 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    DatabaseStore,
    DatabaseLookup,
    DatabaseSearchReply,
    DeliveryStatus,
    Garlic,
    TunnelData,
    TunnelGateway,
    Data,
    TunnelBuild,
    TunnelBuildReply,
    VariableTunnelBuild,
    VariableTunnelBuildReply,
}

impl MessageType {
    pub fn code(self) -> u8 {
        match self {
            Self::DatabaseStore => 1,
            Self::DatabaseLookup => 2,
            Self::DatabaseSearchReply => 3,
            Self::DeliveryStatus => 10,
            Self::Garlic => 11,
            Self::TunnelData => 18,
            Self::TunnelGateway => 19,
            Self::Data => 20,
            Self::TunnelBuild => 21,
            Self::TunnelBuildReply => 22,
            Self::VariableTunnelBuild => 23,
            Self::VariableTunnelBuildReply => 24,
        }
    }

    pub fn from_code(code: u8) -> Result<Self> {
        Ok(match code {
            1 => Self::DatabaseStore,
            2 => Self::DatabaseLookup,
            3 => Self::DatabaseSearchReply,
            10 => Self::DeliveryStatus,
            11 => Self::Garlic,
            18 => Self::TunnelData,
            19 => Self::TunnelGateway,
            20 => Self::Data,
            21 => Self::TunnelBuild,
            22 => Self::TunnelBuildReply,
            23 => Self::VariableTunnelBuild,
            24 => Self::VariableTunnelBuildReply,
            other => return Err(I2npError::UnknownType(other)),
        })
    }
}

/// A parsed or freshly-built I2NP message, long-header form. Treated as
/// immutable once published: every handler holding a reference reads it,
/// none mutates its buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub message_type: MessageType,
    pub message_id: u32,
    pub expiration_ms: u64,
    pub payload: Vec<u8>,
    /// The inbound tunnel this message arrived on, if any — used for
    /// reply routing by components that need to answer without an
    /// explicit destination.
    pub origin_tunnel: Option<u32>,
    /// The peer this message arrived directly from over a transport (not
    /// via a tunnel), if known — lets a handler reply to an unsolicited
    /// DatabaseLookup without a reply tunnel.
    pub origin_peer: Option<[u8; 32]>,
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before epoch")
        .as_millis() as u64
}

fn payload_checksum(payload: &[u8]) -> u8 {
    Sha256::digest(payload)[0]
}

/// Build a fresh message: random messageID unless `reply_id` is given,
/// expiration = now + 1 minute.
pub fn build(message_type: MessageType, payload: Vec<u8>, reply_id: Option<u32>) -> Result<Message> {
    if payload.len() > MAX_MESSAGE_SIZE {
        return Err(I2npError::Overflow(format!("payload {} bytes exceeds cap", payload.len())));
    }
    let message_id = reply_id.unwrap_or_else(|| rand::thread_rng().next_u32());
    Ok(Message {
        message_type,
        message_id,
        expiration_ms: now_ms() + DEFAULT_EXPIRATION_MS,
        payload,
        origin_tunnel: None,
        origin_peer: None,
    })
}

/// Re-stamp an existing message's header fields in place — used when a
/// message is being re-sent under a new identity (e.g. the creator
/// re-using a buffer for a retried build).
pub fn fill_header(message: &mut Message, message_type: MessageType, reply_id: Option<u32>) {
    message.message_type = message_type;
    message.message_id = reply_id.unwrap_or_else(|| rand::thread_rng().next_u32());
    message.expiration_ms = now_ms() + DEFAULT_EXPIRATION_MS;
}

/// Serialize to the long-header wire form.
pub fn serialize(message: &Message) -> Vec<u8> {
    let mut out = Vec::with_capacity(LONG_HEADER_SIZE + message.payload.len());
    out.push(message.message_type.code());
    out.extend_from_slice(&message.message_id.to_be_bytes());
    out.extend_from_slice(&message.expiration_ms.to_be_bytes());
    out.extend_from_slice(&(message.payload.len() as u16).to_be_bytes());
    out.push(payload_checksum(&message.payload));
    out.extend_from_slice(&message.payload);
    out
}

/// Declared total length of the message encoded at the start of `bytes`,
/// without requiring the full buffer to be present yet (only the header).
pub fn length(bytes: &[u8]) -> Result<usize> {
    if bytes.len() < LONG_HEADER_SIZE {
        return Err(I2npError::Malformed("buffer shorter than header".into()));
    }
    let payload_size = u16::from_be_bytes(bytes[13..15].try_into().unwrap()) as usize;
    Ok(LONG_HEADER_SIZE + payload_size)
}

/// Parse a long-header message out of `bytes`. Fails with `Malformed` if
/// the declared size exceeds the buffer, `BadChecksum` if the payload's
/// first SHA-256 byte doesn't match the stored checksum.
pub fn parse(bytes: &[u8]) -> Result<Message> {
    if bytes.len() < LONG_HEADER_SIZE {
        return Err(I2npError::Malformed("buffer shorter than header".into()));
    }
    let message_type = MessageType::from_code(bytes[0])?;
    let message_id = u32::from_be_bytes(bytes[1..5].try_into().unwrap());
    let expiration_ms = u64::from_be_bytes(bytes[5..13].try_into().unwrap());
    let payload_size = u16::from_be_bytes(bytes[13..15].try_into().unwrap()) as usize;
    let checksum = bytes[15];

    if payload_size > MAX_MESSAGE_SIZE {
        return Err(I2npError::Overflow(format!("declared size {payload_size} exceeds cap")));
    }
    if bytes.len() < LONG_HEADER_SIZE + payload_size {
        return Err(I2npError::Malformed("declared size exceeds buffer".into()));
    }
    let payload = bytes[LONG_HEADER_SIZE..LONG_HEADER_SIZE + payload_size].to_vec();
    if payload_checksum(&payload) != checksum {
        return Err(I2npError::BadChecksum);
    }

    Ok(Message {
        message_type,
        message_id,
        expiration_ms,
        payload,
        origin_tunnel: None,
        origin_peer: None,
    })
}

/// Short-header transport variant: no messageID/expiration repetition,
/// used only by the (out-of-scope) concrete transports when carrying a
/// message that already has its identity established by the transport
/// framing itself. Modeled here because inbound messages may arrive via
/// either header form and must parse correctly regardless.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShortMessage {
    pub message_type: MessageType,
    pub payload: Vec<u8>,
}

const SHORT_HEADER_SIZE: usize = 1 + 2 + 1;

pub fn serialize_short(message: &ShortMessage) -> Result<Vec<u8>> {
    if message.payload.len() > MAX_SHORT_MESSAGE_SIZE {
        return Err(I2npError::Overflow(format!("payload {} bytes exceeds short cap", message.payload.len())));
    }
    let mut out = Vec::with_capacity(SHORT_HEADER_SIZE + message.payload.len());
    out.push(message.message_type.code());
    out.extend_from_slice(&(message.payload.len() as u16).to_be_bytes());
    out.push(payload_checksum(&message.payload));
    out.extend_from_slice(&message.payload);
    Ok(out)
}

pub fn parse_short(bytes: &[u8]) -> Result<ShortMessage> {
    if bytes.len() < SHORT_HEADER_SIZE {
        return Err(I2npError::Malformed("buffer shorter than short header".into()));
    }
    let message_type = MessageType::from_code(bytes[0])?;
    let payload_size = u16::from_be_bytes(bytes[1..3].try_into().unwrap()) as usize;
    let checksum = bytes[3];
    if bytes.len() < SHORT_HEADER_SIZE + payload_size {
        return Err(I2npError::Malformed("declared size exceeds buffer".into()));
    }
    let payload = bytes[SHORT_HEADER_SIZE..SHORT_HEADER_SIZE + payload_size].to_vec();
    if payload_checksum(&payload) != checksum {
        return Err(I2npError::BadChecksum);
    }
    Ok(ShortMessage { message_type, payload })
}
