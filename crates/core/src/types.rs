use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};

/// A 32-byte SHA-256 identity hash: router identities, destinations, and
/// tunnel gateway references are all addressed this way.
pub type Hash32 = [u8; 32];

/// 4-byte tunnel identifier, unique within the context of a single router.
pub type TunnelId = u32;

bitflags::bitflags! {
    /// Router capability flags, parsed out of a `RouterInfo`'s `"caps"`
    /// options string (e.g. `"fR"` = floodfill + reachable).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct CapabilityFlags: u8 {
        /// Router participates in the floodfill subset of NetDB.
        const FLOODFILL = 0b0000_0001;
        /// Router declares unlimited bandwidth.
        const UNLIMITED_BW = 0b0000_0010;
        /// Router declares high bandwidth.
        const HIGH_BW = 0b0000_0100;
        /// Router has been reachable for recent contact attempts.
        const REACHABLE = 0b0000_1000;
        /// Router is unreachable (firewalled, no published address works).
        const UNREACHABLE = 0b0001_0000;
        /// Router accepts SSU peer-test requests.
        const SSU_TESTING = 0b0010_0000;
        /// Router can act as an SSU introducer for firewalled peers.
        const SSU_INTRODUCER = 0b0100_0000;
        /// Router is hidden (does not publish itself to NetDB at all).
        const HIDDEN = 0b1000_0000;
    }
}

impl CapabilityFlags {
    /// Parse a kovri-style capability string, e.g. `"fR"`.
    pub fn parse(caps: &str) -> Self {
        let mut flags = CapabilityFlags::empty();
        for ch in caps.chars() {
            match ch {
                'f' => flags |= CapabilityFlags::FLOODFILL,
                'K' => flags |= CapabilityFlags::UNLIMITED_BW,
                'O' => flags |= CapabilityFlags::HIGH_BW,
                'R' => flags |= CapabilityFlags::REACHABLE,
                'U' => flags |= CapabilityFlags::UNREACHABLE,
                'B' => flags |= CapabilityFlags::SSU_TESTING,
                'C' => flags |= CapabilityFlags::SSU_INTRODUCER,
                'H' => flags |= CapabilityFlags::HIDDEN,
                _ => {}
            }
        }
        flags
    }

    /// Render back to a kovri-style capability string.
    pub fn to_caps_string(self) -> String {
        let mut s = String::new();
        if self.contains(CapabilityFlags::FLOODFILL) {
            s.push('f');
        }
        if self.contains(CapabilityFlags::UNLIMITED_BW) {
            s.push('K');
        }
        if self.contains(CapabilityFlags::HIGH_BW) {
            s.push('O');
        }
        if self.contains(CapabilityFlags::REACHABLE) {
            s.push('R');
        }
        if self.contains(CapabilityFlags::UNREACHABLE) {
            s.push('U');
        }
        if self.contains(CapabilityFlags::SSU_TESTING) {
            s.push('B');
        }
        if self.contains(CapabilityFlags::SSU_INTRODUCER) {
            s.push('C');
        }
        if self.contains(CapabilityFlags::HIDDEN) {
            s.push('H');
        }
        s
    }
}

/// Declared bandwidth class, carried in `RouterInfo` and used by peer
/// selection to avoid building tunnels through underpowered routers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BandwidthClass {
    /// < 12 KBps
    L,
    /// 12-48 KBps
    M,
    /// 48-64 KBps
    N,
    /// 64-128 KBps
    O,
    /// 128-256 KBps
    P,
    /// unlimited
    X,
}

impl BandwidthClass {
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            'L' => Some(Self::L),
            'M' => Some(Self::M),
            'N' => Some(Self::N),
            'O' => Some(Self::O),
            'P' => Some(Self::P),
            'X' => Some(Self::X),
            _ => None,
        }
    }

    pub fn to_char(self) -> char {
        match self {
            Self::L => 'L',
            Self::M => 'M',
            Self::N => 'N',
            Self::O => 'O',
            Self::P => 'P',
            Self::X => 'X',
        }
    }
}

/// One SSU introducer: a helper peer a firewalled router has registered
/// with so that others can reach it via hole-punching, named by identity
/// hash, the UDP port it introduces on, and the 32-byte relay tag the
/// introduction handshake must present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Introducer {
    pub hash: Hash32,
    pub port: u16,
    pub tag: [u8; 32],
}

/// A transport-reachable address published inside a `RouterInfo`: a
/// style/host/port tuple plus transport-specific options. The transport
/// implementations themselves (NTCP, SSU) are out of scope; this is only
/// the address record shape NetDB stores and serves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerAddress {
    pub transport_style: String,
    pub host: String,
    pub port: u16,
    pub cost: u8,
    /// Maximum transmission unit this address supports, if the transport
    /// declares one (SSU).
    pub mtu: Option<u16>,
    /// Introducer set for a firewalled address reachable only via
    /// hole-punching (SSU with NAT traversal).
    pub introducers: Option<Vec<Introducer>>,
    /// 32-byte key used to authenticate introduction requests against this
    /// address (SSU).
    pub intro_key: Option<[u8; 32]>,
}

impl PeerAddress {
    /// Encode to the wire form NetDB signs and serves: length-prefixed
    /// transport style and host, then port/cost, then an optional-field
    /// flag byte and whichever of mtu/introducers/intro_key it names.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.push(self.transport_style.len() as u8);
        out.extend_from_slice(self.transport_style.as_bytes());
        out.push(self.host.len() as u8);
        out.extend_from_slice(self.host.as_bytes());
        out.extend_from_slice(&self.port.to_be_bytes());
        out.push(self.cost);

        let mut flags = 0u8;
        if self.mtu.is_some() {
            flags |= 0b001;
        }
        if self.introducers.is_some() {
            flags |= 0b010;
        }
        if self.intro_key.is_some() {
            flags |= 0b100;
        }
        out.push(flags);

        if let Some(mtu) = self.mtu {
            out.extend_from_slice(&mtu.to_be_bytes());
        }
        if let Some(introducers) = &self.introducers {
            out.push(introducers.len() as u8);
            for intro in introducers {
                out.extend_from_slice(&intro.hash);
                out.extend_from_slice(&intro.port.to_be_bytes());
                out.extend_from_slice(&intro.tag);
            }
        }
        if let Some(key) = self.intro_key {
            out.extend_from_slice(&key);
        }
        out
    }

    /// Decode one address from the start of `bytes`, returning it together
    /// with the number of bytes consumed so the caller can keep parsing a
    /// surrounding address list.
    pub fn parse(bytes: &[u8]) -> Result<(Self, usize)> {
        let mut offset = 0usize;
        if bytes.is_empty() {
            return Err(CoreError::Malformed("address missing transport style length".into()));
        }
        let style_len = bytes[offset] as usize;
        offset += 1;
        if bytes.len() < offset + style_len {
            return Err(CoreError::Malformed("address transport style truncated".into()));
        }
        let transport_style = String::from_utf8_lossy(&bytes[offset..offset + style_len]).into_owned();
        offset += style_len;

        if bytes.len() < offset + 1 {
            return Err(CoreError::Malformed("address missing host length".into()));
        }
        let host_len = bytes[offset] as usize;
        offset += 1;
        if bytes.len() < offset + host_len {
            return Err(CoreError::Malformed("address host truncated".into()));
        }
        let host = String::from_utf8_lossy(&bytes[offset..offset + host_len]).into_owned();
        offset += host_len;

        if bytes.len() < offset + 4 {
            return Err(CoreError::Malformed("address missing port/cost/flags".into()));
        }
        let port = u16::from_be_bytes(bytes[offset..offset + 2].try_into().unwrap());
        offset += 2;
        let cost = bytes[offset];
        offset += 1;
        let flags = bytes[offset];
        offset += 1;

        let mut mtu = None;
        if flags & 0b001 != 0 {
            if bytes.len() < offset + 2 {
                return Err(CoreError::Malformed("address truncated mtu".into()));
            }
            mtu = Some(u16::from_be_bytes(bytes[offset..offset + 2].try_into().unwrap()));
            offset += 2;
        }

        let mut introducers = None;
        if flags & 0b010 != 0 {
            if bytes.len() < offset + 1 {
                return Err(CoreError::Malformed("address missing introducer count".into()));
            }
            let count = bytes[offset] as usize;
            offset += 1;
            let mut list = Vec::with_capacity(count);
            for _ in 0..count {
                if bytes.len() < offset + 32 + 2 + 32 {
                    return Err(CoreError::Malformed("address introducer truncated".into()));
                }
                let mut hash = [0u8; 32];
                hash.copy_from_slice(&bytes[offset..offset + 32]);
                offset += 32;
                let intro_port = u16::from_be_bytes(bytes[offset..offset + 2].try_into().unwrap());
                offset += 2;
                let mut tag = [0u8; 32];
                tag.copy_from_slice(&bytes[offset..offset + 32]);
                offset += 32;
                list.push(Introducer { hash, port: intro_port, tag });
            }
            introducers = Some(list);
        }

        let mut intro_key = None;
        if flags & 0b100 != 0 {
            if bytes.len() < offset + 32 {
                return Err(CoreError::Malformed("address truncated intro key".into()));
            }
            let mut key = [0u8; 32];
            key.copy_from_slice(&bytes[offset..offset + 32]);
            offset += 32;
            intro_key = Some(key);
        }

        Ok((
            Self {
                transport_style,
                host,
                port,
                cost,
                mtu,
                introducers,
                intro_key,
            },
            offset,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_flags_parse_round_trip() {
        let flags = CapabilityFlags::parse("fR");
        assert!(flags.contains(CapabilityFlags::FLOODFILL));
        assert!(flags.contains(CapabilityFlags::REACHABLE));
        assert!(!flags.contains(CapabilityFlags::HIDDEN));
        assert_eq!(flags.to_caps_string(), "fR");
    }

    #[test]
    fn capability_flags_unknown_chars_ignored() {
        let flags = CapabilityFlags::parse("fXz9");
        assert!(flags.contains(CapabilityFlags::FLOODFILL));
        assert_eq!(flags.to_caps_string(), "f");
    }

    #[test]
    fn capability_flags_empty_string() {
        assert_eq!(CapabilityFlags::parse(""), CapabilityFlags::empty());
    }

    #[test]
    fn bandwidth_class_round_trip() {
        for c in ['L', 'M', 'N', 'O', 'P', 'X'] {
            let class = BandwidthClass::from_char(c).unwrap();
            assert_eq!(class.to_char(), c);
        }
    }

    #[test]
    fn bandwidth_class_unknown_char() {
        assert!(BandwidthClass::from_char('Z').is_none());
    }

    #[test]
    fn peer_address_serialization_round_trip() {
        let addr = PeerAddress {
            transport_style: "NTCP2".to_string(),
            host: "203.0.113.5".to_string(),
            port: 12345,
            cost: 10,
            mtu: None,
            introducers: None,
            intro_key: None,
        };
        let json = serde_json::to_string(&addr).unwrap();
        let restored: PeerAddress = serde_json::from_str(&json).unwrap();
        assert_eq!(addr, restored);
    }

    #[test]
    fn peer_address_wire_round_trip_without_optional_fields() {
        let addr = PeerAddress {
            transport_style: "NTCP2".to_string(),
            host: "203.0.113.5".to_string(),
            port: 12345,
            cost: 10,
            mtu: None,
            introducers: None,
            intro_key: None,
        };
        let encoded = addr.encode();
        let (restored, consumed) = PeerAddress::parse(&encoded).unwrap();
        assert_eq!(consumed, encoded.len());
        assert_eq!(restored, addr);
    }

    #[test]
    fn peer_address_wire_round_trip_with_introducers() {
        let addr = PeerAddress {
            transport_style: "SSU".to_string(),
            host: "203.0.113.6".to_string(),
            port: 4444,
            cost: 20,
            mtu: Some(1492),
            introducers: Some(vec![Introducer { hash: [7u8; 32], port: 9999, tag: [8u8; 32] }]),
            intro_key: Some([9u8; 32]),
        };
        let encoded = addr.encode();
        let (restored, consumed) = PeerAddress::parse(&encoded).unwrap();
        assert_eq!(consumed, encoded.len());
        assert_eq!(restored, addr);
    }

    #[test]
    fn peer_address_parse_rejects_truncated_buffer() {
        let addr = PeerAddress {
            transport_style: "NTCP2".to_string(),
            host: "203.0.113.5".to_string(),
            port: 12345,
            cost: 10,
            mtu: Some(1400),
            introducers: None,
            intro_key: None,
        };
        let encoded = addr.encode();
        assert!(PeerAddress::parse(&encoded[..encoded.len() - 1]).is_err());
    }
}
