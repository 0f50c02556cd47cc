//! C6: delivery instructions, gateway-side fragmentation, and
//! endpoint-side reassembly of TunnelDataMessage fragments.

use crate::error::{Result, TunnelError};
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Usable payload bytes inside one tunnel data message's plaintext body,
/// after the checksum/zero/padding/delimiter overhead.
pub const DATA_WINDOW_SIZE: usize = 1003;

/// An out-of-order follow-on fragment is dropped if its message makes no
/// progress for this long.
pub const REASSEMBLY_TIMEOUT: Duration = Duration::from_secs(10);

/// Marks a block's leading byte as carrying a [`DeliveryInstruction`]
/// rather than a bare follow-on fragment header. Follow-on flag bytes
/// never set this bit (fragment numbers are kept to 6 bits), so it is an
/// unambiguous discriminator for the first byte of any block.
const INSTRUCTION_MARKER: u8 = 0b1000_0000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryType {
    Local,
    Tunnel { peer_hash_prefix: [u8; 32], tunnel_id: u32 },
    Router { peer_hash_prefix: [u8; 32] },
}

impl DeliveryType {
    fn type_bits(self) -> u8 {
        match self {
            DeliveryType::Local => 0b00,
            DeliveryType::Tunnel { .. } => 0b01,
            DeliveryType::Router { .. } => 0b10,
        }
    }
}

/// One delivery instruction as it prefixes a message block or first
/// fragment inside the tunnel data stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryInstruction {
    pub delivery_type: DeliveryType,
    pub fragmented: bool,
}

impl DeliveryInstruction {
    /// Serialize the flag byte plus any address/tunnel-ID fields. Total
    /// size is 1 + up to 36 (32-byte hash + 4-byte tunnel ID) bytes.
    pub fn to_bytes(self) -> Vec<u8> {
        let mut flags = INSTRUCTION_MARKER | (self.delivery_type.type_bits() << 5);
        if self.fragmented {
            flags |= 0b0001_0000;
        }
        let mut out = vec![flags];
        match self.delivery_type {
            DeliveryType::Local => {}
            DeliveryType::Tunnel { peer_hash_prefix, tunnel_id } => {
                out.extend_from_slice(&peer_hash_prefix);
                out.extend_from_slice(&tunnel_id.to_be_bytes());
            }
            DeliveryType::Router { peer_hash_prefix } => {
                out.extend_from_slice(&peer_hash_prefix);
            }
        }
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<(Self, usize)> {
        if bytes.is_empty() {
            return Err(TunnelError::Malformed("empty delivery instruction".into()));
        }
        let flags = bytes[0];
        if flags & INSTRUCTION_MARKER == 0 {
            return Err(TunnelError::Malformed("block is a follow-on fragment, not an instruction".into()));
        }
        let fragmented = flags & 0b0001_0000 != 0;
        let type_bits = (flags >> 5) & 0b11;
        let (delivery_type, consumed) = match type_bits {
            0b00 => (DeliveryType::Local, 1),
            0b01 => {
                if bytes.len() < 37 {
                    return Err(TunnelError::Malformed("truncated tunnel delivery instruction".into()));
                }
                let mut peer_hash_prefix = [0u8; 32];
                peer_hash_prefix.copy_from_slice(&bytes[1..33]);
                let tunnel_id = u32::from_be_bytes(bytes[33..37].try_into().unwrap());
                (DeliveryType::Tunnel { peer_hash_prefix, tunnel_id }, 37)
            }
            0b10 => {
                if bytes.len() < 33 {
                    return Err(TunnelError::Malformed("truncated router delivery instruction".into()));
                }
                let mut peer_hash_prefix = [0u8; 32];
                peer_hash_prefix.copy_from_slice(&bytes[1..33]);
                (DeliveryType::Router { peer_hash_prefix }, 33)
            }
            _ => return Err(TunnelError::Malformed("unknown delivery type bits".into())),
        };
        Ok((Self { delivery_type, fragmented }, consumed))
    }
}

/// An assembled outbound tunnel-data payload window, ready to become one
/// message's plaintext fragment stream.
pub struct Fragmenter {
    message_id_counter: u32,
}

impl Default for Fragmenter {
    fn default() -> Self {
        Self { message_id_counter: 0 }
    }
}

impl Fragmenter {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_message_id(&mut self) -> u32 {
        self.message_id_counter = self.message_id_counter.wrapping_add(1);
        self.message_id_counter
    }

    /// Split `instruction ‖ payload` into one or more [`DATA_WINDOW_SIZE`]
    /// windows. A payload that fits alongside its instruction in one
    /// window becomes a single "first-and-last" fragment (no message ID
    /// needed); otherwise a "first" fragment carrying a fresh message ID
    /// and its chunk size is emitted, followed by one or more
    /// 7-byte-headered follow-on fragments.
    pub fn fragment(&mut self, instruction: DeliveryInstruction, payload: &[u8]) -> Vec<Vec<u8>> {
        let instr_bytes = instruction.to_bytes();
        if instr_bytes.len() + payload.len() + 2 <= DATA_WINDOW_SIZE {
            let mut first = instr_bytes;
            first.extend_from_slice(payload);
            return vec![first];
        }

        let message_id = self.next_message_id();
        let mut windows = Vec::new();

        const FIRST_FRAGMENT_HEADER: usize = 6; // message ID(4) + chunk size(2)
        let first_capacity = DATA_WINDOW_SIZE.saturating_sub(instr_bytes.len() + FIRST_FRAGMENT_HEADER);
        let (first_chunk, mut rest) = payload.split_at(first_capacity.min(payload.len()));
        let mut first = instr_bytes;
        first.extend_from_slice(&message_id.to_be_bytes());
        first.extend_from_slice(&(first_chunk.len() as u16).to_be_bytes());
        first.extend_from_slice(first_chunk);
        windows.push(first);

        let mut fragment_num: u8 = 1;
        const FOLLOW_ON_HEADER: usize = 7;
        while !rest.is_empty() {
            let last = rest.len() + FOLLOW_ON_HEADER <= DATA_WINDOW_SIZE;
            let chunk_capacity = DATA_WINDOW_SIZE - FOLLOW_ON_HEADER;
            let take = rest.len().min(chunk_capacity);
            let (chunk, remainder) = rest.split_at(take);

            // Fragment numbers are kept to 6 bits so the flag byte's top
            // bit stays clear, distinguishing a follow-on from a block
            // that opens with a `DeliveryInstruction`.
            let mut flag = (fragment_num & 0x3F) << 1;
            if last {
                flag |= 1;
            }
            let mut follow_on = vec![flag];
            follow_on.extend_from_slice(&message_id.to_be_bytes());
            follow_on.extend_from_slice(&(chunk.len() as u16).to_be_bytes());
            follow_on.extend_from_slice(chunk);
            windows.push(follow_on);

            rest = remainder;
            fragment_num += 1;
        }
        windows
    }
}

/// A parsed "first" fragment header: the message ID later follow-ons
/// will carry, plus this window's share of the payload.
struct ParsedFirstFragment {
    message_id: u32,
    chunk: Vec<u8>,
}

/// Parse the 6-byte first-fragment header (message ID, chunk size) that
/// follows a fragmented delivery instruction's bytes.
fn parse_first_fragment(data: &[u8]) -> Result<ParsedFirstFragment> {
    if data.len() < 6 {
        return Err(TunnelError::Malformed("truncated first fragment header".into()));
    }
    let message_id = u32::from_be_bytes(data[0..4].try_into().unwrap());
    let chunk_size = u16::from_be_bytes(data[4..6].try_into().unwrap()) as usize;
    if data.len() < 6 + chunk_size {
        return Err(TunnelError::Malformed("first fragment shorter than declared size".into()));
    }
    Ok(ParsedFirstFragment {
        message_id,
        chunk: data[6..6 + chunk_size].to_vec(),
    })
}

/// A parsed follow-on fragment header.
struct ParsedFollowOn {
    message_id: u32,
    fragment_num: u8,
    is_last: bool,
    chunk: Vec<u8>,
}

/// Parse a 7-byte-headered follow-on fragment: flag byte (fragment
/// number in bits 1-6, last-fragment flag in bit 0), message ID, chunk
/// size, then the chunk itself.
fn parse_follow_on(data: &[u8]) -> Result<ParsedFollowOn> {
    if data.len() < 7 {
        return Err(TunnelError::Malformed("truncated follow-on fragment header".into()));
    }
    let flag = data[0];
    let fragment_num = (flag >> 1) & 0x3F;
    let is_last = flag & 1 != 0;
    let message_id = u32::from_be_bytes(data[1..5].try_into().unwrap());
    let chunk_size = u16::from_be_bytes(data[5..7].try_into().unwrap()) as usize;
    if data.len() < 7 + chunk_size {
        return Err(TunnelError::Malformed("follow-on fragment shorter than declared size".into()));
    }
    Ok(ParsedFollowOn {
        message_id,
        fragment_num,
        is_last,
        chunk: data[7..7 + chunk_size].to_vec(),
    })
}

/// One block decoded from a tunnel data message's plaintext fragment
/// stream.
pub enum DataBlock {
    /// A complete, unfragmented delivery.
    Whole { instruction: DeliveryInstruction, payload: Vec<u8> },
    /// The first chunk of a message that continues in later fragments.
    First { instruction: DeliveryInstruction, message_id: u32, chunk: Vec<u8> },
    /// A follow-on chunk, keyed to the message ID its first fragment
    /// carried.
    FollowOn { message_id: u32, fragment_num: u8, is_last: bool, chunk: Vec<u8> },
}

/// Decode one block from the start of a plaintext fragment stream,
/// dispatching on [`INSTRUCTION_MARKER`].
pub fn parse_data_block(data: &[u8]) -> Result<DataBlock> {
    if data.is_empty() {
        return Err(TunnelError::Malformed("empty data block".into()));
    }
    if data[0] & INSTRUCTION_MARKER != 0 {
        let (instruction, consumed) = DeliveryInstruction::from_bytes(data)?;
        let rest = &data[consumed..];
        if instruction.fragmented {
            let first = parse_first_fragment(rest)?;
            Ok(DataBlock::First {
                instruction,
                message_id: first.message_id,
                chunk: first.chunk,
            })
        } else {
            Ok(DataBlock::Whole {
                instruction,
                payload: rest.to_vec(),
            })
        }
    } else {
        let follow_on = parse_follow_on(data)?;
        Ok(DataBlock::FollowOn {
            message_id: follow_on.message_id,
            fragment_num: follow_on.fragment_num,
            is_last: follow_on.is_last,
            chunk: follow_on.chunk,
        })
    }
}

struct IncompleteMessage {
    instruction: DeliveryInstruction,
    data: Vec<u8>,
    next_fragment: u8,
    out_of_order: HashMap<u8, Vec<u8>>,
    last_progress: Instant,
}

/// Endpoint-side fragment reassembly state, keyed by message ID.
#[derive(Default)]
pub struct Reassembler {
    incomplete: HashMap<u32, IncompleteMessage>,
}

impl Reassembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start_message(&mut self, message_id: u32, instruction: DeliveryInstruction, first_chunk: Vec<u8>, now: Instant) {
        self.incomplete.insert(
            message_id,
            IncompleteMessage {
                instruction,
                data: first_chunk,
                next_fragment: 1,
                out_of_order: HashMap::new(),
                last_progress: now,
            },
        );
    }

    /// Append a follow-on fragment. Returns the completed message's
    /// delivery instruction and bytes once the last fragment has been
    /// drained in order.
    pub fn add_follow_on(
        &mut self,
        message_id: u32,
        fragment_num: u8,
        is_last: bool,
        chunk: Vec<u8>,
        now: Instant,
    ) -> Result<Option<(DeliveryInstruction, Vec<u8>)>> {
        let msg = self
            .incomplete
            .get_mut(&message_id)
            .ok_or(TunnelError::UnexpectedState)?;

        if fragment_num == msg.next_fragment {
            msg.data.extend_from_slice(&chunk);
            msg.next_fragment = msg.next_fragment.wrapping_add(1);
            msg.last_progress = now;
            if is_last {
                let completed = self.incomplete.remove(&message_id).unwrap();
                return Ok(Some((completed.instruction, completed.data)));
            }
            // Drain any buffered out-of-order fragments that are now in order.
            loop {
                let msg = self.incomplete.get_mut(&message_id).unwrap();
                let Some(next_chunk) = msg.out_of_order.remove(&msg.next_fragment) else {
                    break;
                };
                msg.data.extend_from_slice(&next_chunk);
                msg.next_fragment = msg.next_fragment.wrapping_add(1);
                msg.last_progress = now;
            }
            Ok(None)
        } else {
            msg.out_of_order.insert(fragment_num, chunk);
            msg.last_progress = now;
            Ok(None)
        }
    }

    /// Evict any message that has made no progress for
    /// [`REASSEMBLY_TIMEOUT`], returning the evicted message IDs.
    pub fn evict_stale(&mut self, now: Instant) -> Vec<u32> {
        let stale: Vec<u32> = self
            .incomplete
            .iter()
            .filter(|(_, msg)| now.duration_since(msg.last_progress) >= REASSEMBLY_TIMEOUT)
            .map(|(id, _)| *id)
            .collect();
        for id in &stale {
            self.incomplete.remove(id);
        }
        stale
    }

    pub fn pending_count(&self) -> usize {
        self.incomplete.len()
    }
}
