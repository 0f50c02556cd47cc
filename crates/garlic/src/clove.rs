//! Garlic cloves: the individually-addressed I2NP messages bundled inside
//! one encrypted garlic payload.

use crate::error::{GarlicError, Result};
use garlicrouter_i2np::message;

const CLOVE_ID_SIZE: usize = 4;
const EXPIRATION_SIZE: usize = 8;
const CERTIFICATE_SIZE: usize = 3;
const ENCRYPTED_KEY_SIZE: usize = 32;

/// Where a clove's embedded message should go once decrypted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryType {
    /// Hand the embedded message to this router's own I2NP handler.
    Local,
    /// Addressed to a destination; the hash is informational since only
    /// the destination that can decrypt the garlic learns it at all.
    Destination { identity_hash: [u8; 32] },
    /// Forward via an outbound tunnel to `gateway_hash`'s `tunnel_id`.
    Tunnel { gateway_hash: [u8; 32], tunnel_id: u32 },
    /// Deliver directly to a router. Not implemented downstream; kept so
    /// the clove can still be parsed and skipped rather than corrupting
    /// the cursor for cloves that follow it.
    Router { router_hash: [u8; 32] },
}

impl DeliveryType {
    fn type_bits(&self) -> u8 {
        match self {
            DeliveryType::Local => 0,
            DeliveryType::Destination { .. } => 1,
            DeliveryType::Tunnel { .. } => 2,
            DeliveryType::Router { .. } => 3,
        }
    }
}

/// One indivisible I2NP message bundled inside a garlic payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clove {
    pub delivery_type: DeliveryType,
    /// The embedded message, already in long-header wire form.
    pub message_bytes: Vec<u8>,
    pub clove_id: u32,
    pub expiration_ms: u64,
}

impl Clove {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = vec![self.delivery_type.type_bits() << 5];
        match &self.delivery_type {
            DeliveryType::Local => {}
            DeliveryType::Destination { identity_hash } => out.extend_from_slice(identity_hash),
            DeliveryType::Tunnel { gateway_hash, tunnel_id } => {
                out.extend_from_slice(gateway_hash);
                out.extend_from_slice(&tunnel_id.to_be_bytes());
            }
            DeliveryType::Router { router_hash } => out.extend_from_slice(router_hash),
        }
        out.extend_from_slice(&self.message_bytes);
        out.extend_from_slice(&self.clove_id.to_be_bytes());
        out.extend_from_slice(&self.expiration_ms.to_be_bytes());
        out.extend_from_slice(&[0u8; CERTIFICATE_SIZE]);
        out
    }

    /// Decode one clove starting at `data[0]`, returning it along with the
    /// number of bytes it consumed so the caller can advance to the next
    /// clove in the bundle.
    pub fn decode(data: &[u8]) -> Result<(Self, usize)> {
        if data.is_empty() {
            return Err(GarlicError::Malformed("empty clove".into()));
        }
        let flag = data[0];
        let mut offset = 1;

        if flag & 0x80 != 0 {
            // Encrypted cloves are not implemented; the key material is
            // skipped so the cursor stays valid for the cloves after this
            // one, matching how the rest of this bundle is framed.
            require(&data, offset + ENCRYPTED_KEY_SIZE)?;
            offset += ENCRYPTED_KEY_SIZE;
        }

        let delivery_type = match (flag >> 5) & 0x03 {
            0 => DeliveryType::Local,
            1 => {
                require(&data, offset + 32)?;
                let mut identity_hash = [0u8; 32];
                identity_hash.copy_from_slice(&data[offset..offset + 32]);
                offset += 32;
                DeliveryType::Destination { identity_hash }
            }
            2 => {
                require(&data, offset + 36)?;
                let mut gateway_hash = [0u8; 32];
                gateway_hash.copy_from_slice(&data[offset..offset + 32]);
                let tunnel_id = u32::from_be_bytes(data[offset + 32..offset + 36].try_into().unwrap());
                offset += 36;
                DeliveryType::Tunnel { gateway_hash, tunnel_id }
            }
            3 => {
                require(&data, offset + 32)?;
                let mut router_hash = [0u8; 32];
                router_hash.copy_from_slice(&data[offset..offset + 32]);
                offset += 32;
                DeliveryType::Router { router_hash }
            }
            _ => unreachable!("two-bit field"),
        };

        require(&data, offset)?;
        let message_len = message::length(&data[offset..])?;
        require(&data, offset + message_len)?;
        let message_bytes = data[offset..offset + message_len].to_vec();
        offset += message_len;

        require(&data, offset + CLOVE_ID_SIZE + EXPIRATION_SIZE + CERTIFICATE_SIZE)?;
        let clove_id = u32::from_be_bytes(data[offset..offset + CLOVE_ID_SIZE].try_into().unwrap());
        offset += CLOVE_ID_SIZE;
        let expiration_ms = u64::from_be_bytes(data[offset..offset + EXPIRATION_SIZE].try_into().unwrap());
        offset += EXPIRATION_SIZE;
        offset += CERTIFICATE_SIZE;

        Ok((
            Clove {
                delivery_type,
                message_bytes,
                clove_id,
                expiration_ms,
            },
            offset,
        ))
    }
}

fn require(data: &[u8], len: usize) -> Result<()> {
    if data.len() < len {
        return Err(GarlicError::Malformed("clove truncated".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use garlicrouter_i2np::message::{self, MessageType};

    fn sample_message() -> Vec<u8> {
        let msg = message::build(MessageType::Data, vec![1, 2, 3], Some(7)).unwrap();
        message::serialize(&msg)
    }

    #[test]
    fn local_clove_round_trips() {
        let clove = Clove {
            delivery_type: DeliveryType::Local,
            message_bytes: sample_message(),
            clove_id: 99,
            expiration_ms: 123_456,
        };
        let bytes = clove.encode();
        let (decoded, consumed) = Clove::decode(&bytes).unwrap();
        assert_eq!(consumed, bytes.len());
        assert_eq!(decoded, clove);
    }

    #[test]
    fn destination_clove_round_trips() {
        let clove = Clove {
            delivery_type: DeliveryType::Destination { identity_hash: [9u8; 32] },
            message_bytes: sample_message(),
            clove_id: 1,
            expiration_ms: 1,
        };
        let bytes = clove.encode();
        let (decoded, _) = Clove::decode(&bytes).unwrap();
        assert_eq!(decoded.delivery_type, clove.delivery_type);
    }

    #[test]
    fn tunnel_clove_round_trips() {
        let clove = Clove {
            delivery_type: DeliveryType::Tunnel { gateway_hash: [3u8; 32], tunnel_id: 555 },
            message_bytes: sample_message(),
            clove_id: 2,
            expiration_ms: 2,
        };
        let bytes = clove.encode();
        let (decoded, _) = Clove::decode(&bytes).unwrap();
        assert_eq!(decoded.delivery_type, clove.delivery_type);
    }

    #[test]
    fn two_cloves_in_sequence_decode_independently() {
        let a = Clove {
            delivery_type: DeliveryType::Local,
            message_bytes: sample_message(),
            clove_id: 1,
            expiration_ms: 1,
        };
        let b = Clove {
            delivery_type: DeliveryType::Destination { identity_hash: [5u8; 32] },
            message_bytes: sample_message(),
            clove_id: 2,
            expiration_ms: 2,
        };
        let mut bundle = a.encode();
        bundle.extend_from_slice(&b.encode());

        let (decoded_a, consumed_a) = Clove::decode(&bundle).unwrap();
        let (decoded_b, _) = Clove::decode(&bundle[consumed_a..]).unwrap();
        assert_eq!(decoded_a, a);
        assert_eq!(decoded_b, b);
    }

    #[test]
    fn truncated_clove_is_rejected() {
        let clove = Clove {
            delivery_type: DeliveryType::Tunnel { gateway_hash: [1u8; 32], tunnel_id: 1 },
            message_bytes: sample_message(),
            clove_id: 1,
            expiration_ms: 1,
        };
        let bytes = clove.encode();
        assert!(Clove::decode(&bytes[..bytes.len() - 5]).is_err());
    }
}
