//! Wire payloads for the three NetDB I2NP message types: DatabaseStore,
//! DatabaseLookup, and DatabaseSearchReply. These are carried as the
//! `payload` of an [`garlicrouter_i2np::message::Message`] whose
//! `message_type` names which one it is; this module only knows the
//! payload shape, not the envelope.

use crate::error::{NetDbError, Result};

/// `store_type` byte naming what a DatabaseStore payload carries.
pub const STORE_TYPE_LEASESET: u8 = 0;
pub const STORE_TYPE_ROUTER_INFO: u8 = 1;

const HASH_LEN: usize = 32;

/// `key(32) || store_type(1) || reply_token(4) || data`. `reply_token` of
/// zero means the sender is not asking for a floodfill-confirmation
/// DatabaseStore back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseStorePayload {
    pub key: [u8; 32],
    pub store_type: u8,
    pub reply_token: u32,
    pub data: Vec<u8>,
}

impl DatabaseStorePayload {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HASH_LEN + 1 + 4 + self.data.len());
        out.extend_from_slice(&self.key);
        out.push(self.store_type);
        out.extend_from_slice(&self.reply_token.to_be_bytes());
        out.extend_from_slice(&self.data);
        out
    }

    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HASH_LEN + 1 + 4 {
            return Err(NetDbError::Malformed("database store payload shorter than header".into()));
        }
        let mut key = [0u8; 32];
        key.copy_from_slice(&bytes[0..HASH_LEN]);
        let store_type = bytes[HASH_LEN];
        let reply_token = u32::from_be_bytes(bytes[HASH_LEN + 1..HASH_LEN + 5].try_into().unwrap());
        let data = bytes[HASH_LEN + 5..].to_vec();
        Ok(Self { key, store_type, reply_token, data })
    }
}

/// `target(32) || from(32) || reply_tunnel_id(4, 0 = none) ||
/// excluded_count(2) || excluded_hash(32) * count`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseLookupPayload {
    pub target: [u8; 32],
    pub from: [u8; 32],
    pub reply_tunnel_id: u32,
    pub excluded: Vec<[u8; 32]>,
}

impl DatabaseLookupPayload {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HASH_LEN * 2 + 4 + 2 + self.excluded.len() * HASH_LEN);
        out.extend_from_slice(&self.target);
        out.extend_from_slice(&self.from);
        out.extend_from_slice(&self.reply_tunnel_id.to_be_bytes());
        out.extend_from_slice(&(self.excluded.len() as u16).to_be_bytes());
        for hash in &self.excluded {
            out.extend_from_slice(hash);
        }
        out
    }

    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HASH_LEN * 2 + 4 + 2 {
            return Err(NetDbError::Malformed("database lookup payload shorter than header".into()));
        }
        let mut target = [0u8; 32];
        target.copy_from_slice(&bytes[0..HASH_LEN]);
        let mut from = [0u8; 32];
        from.copy_from_slice(&bytes[HASH_LEN..HASH_LEN * 2]);
        let mut offset = HASH_LEN * 2;
        let reply_tunnel_id = u32::from_be_bytes(bytes[offset..offset + 4].try_into().unwrap());
        offset += 4;
        let count = u16::from_be_bytes(bytes[offset..offset + 2].try_into().unwrap()) as usize;
        offset += 2;

        if bytes.len() < offset + count * HASH_LEN {
            return Err(NetDbError::Malformed("database lookup payload truncated excluded list".into()));
        }
        let mut excluded = Vec::with_capacity(count);
        for _ in 0..count {
            let mut hash = [0u8; 32];
            hash.copy_from_slice(&bytes[offset..offset + HASH_LEN]);
            excluded.push(hash);
            offset += HASH_LEN;
        }

        Ok(Self { target, from, reply_tunnel_id, excluded })
    }
}

/// `key(32) || from(32) || count(1) || peer_hash(32) * count`. `from`
/// names the floodfill that answered; `peer_hash` entries are floodfills
/// closer to `key` than the answering one, for the requester to retry
/// against on a miss.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseSearchReplyPayload {
    pub key: [u8; 32],
    pub from: [u8; 32],
    pub peers: Vec<[u8; 32]>,
}

impl DatabaseSearchReplyPayload {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HASH_LEN * 2 + 1 + self.peers.len() * HASH_LEN);
        out.extend_from_slice(&self.key);
        out.extend_from_slice(&self.from);
        out.push(self.peers.len() as u8);
        for peer in &self.peers {
            out.extend_from_slice(peer);
        }
        out
    }

    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HASH_LEN * 2 + 1 {
            return Err(NetDbError::Malformed("database search reply payload shorter than header".into()));
        }
        let mut key = [0u8; 32];
        key.copy_from_slice(&bytes[0..HASH_LEN]);
        let mut from = [0u8; 32];
        from.copy_from_slice(&bytes[HASH_LEN..HASH_LEN * 2]);
        let count = bytes[HASH_LEN * 2] as usize;
        let mut offset = HASH_LEN * 2 + 1;

        if bytes.len() < offset + count * HASH_LEN {
            return Err(NetDbError::Malformed("database search reply payload truncated peer list".into()));
        }
        let mut peers = Vec::with_capacity(count);
        for _ in 0..count {
            let mut hash = [0u8; 32];
            hash.copy_from_slice(&bytes[offset..offset + HASH_LEN]);
            peers.push(hash);
            offset += HASH_LEN;
        }

        Ok(Self { key, from, peers })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_store_round_trips() {
        let payload = DatabaseStorePayload {
            key: [1u8; 32],
            store_type: STORE_TYPE_ROUTER_INFO,
            reply_token: 42,
            data: vec![9, 8, 7],
        };
        let encoded = payload.encode();
        assert_eq!(DatabaseStorePayload::parse(&encoded).unwrap(), payload);
    }

    #[test]
    fn database_store_rejects_truncated_header() {
        assert!(DatabaseStorePayload::parse(&[0u8; 10]).is_err());
    }

    #[test]
    fn database_lookup_round_trips_with_excluded_peers() {
        let payload = DatabaseLookupPayload {
            target: [2u8; 32],
            from: [3u8; 32],
            reply_tunnel_id: 7,
            excluded: vec![[4u8; 32], [5u8; 32]],
        };
        let encoded = payload.encode();
        assert_eq!(DatabaseLookupPayload::parse(&encoded).unwrap(), payload);
    }

    #[test]
    fn database_lookup_rejects_truncated_excluded_list() {
        let payload = DatabaseLookupPayload {
            target: [2u8; 32],
            from: [3u8; 32],
            reply_tunnel_id: 0,
            excluded: vec![[4u8; 32]],
        };
        let mut encoded = payload.encode();
        encoded.truncate(encoded.len() - 5);
        assert!(DatabaseLookupPayload::parse(&encoded).is_err());
    }

    #[test]
    fn database_search_reply_round_trips() {
        let payload = DatabaseSearchReplyPayload {
            key: [6u8; 32],
            from: [7u8; 32],
            peers: vec![[8u8; 32], [9u8; 32], [10u8; 32]],
        };
        let encoded = payload.encode();
        assert_eq!(DatabaseSearchReplyPayload::parse(&encoded).unwrap(), payload);
    }

    #[test]
    fn database_search_reply_rejects_truncated_peer_list() {
        let payload = DatabaseSearchReplyPayload {
            key: [6u8; 32],
            from: [7u8; 32],
            peers: vec![[8u8; 32]],
        };
        let mut encoded = payload.encode();
        encoded.truncate(encoded.len() - 5);
        assert!(DatabaseSearchReplyPayload::parse(&encoded).is_err());
    }
}
