//! C8: the tunnel manager. Owns every tunnel object this router knows
//! about — local and transit — runs the single inbound dispatch loop,
//! and performs periodic maintenance (expiry, pool top-up, transit
//! admission).

use crate::build::HopKeys;
use crate::data::{PlaintextBody, TunnelDataMessage};
use crate::error::{Result, TunnelError};
use crate::fragment::{parse_data_block, DataBlock, DeliveryInstruction, DeliveryType, Reassembler};
use crate::pool::{TunnelPool, RECREATE_MARGIN, TUNNEL_LIFETIME};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use garlicrouter_i2np::message::{Message, MessageType};
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Cadence of `manage_tunnels()`.
pub const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(15);
/// How long the dispatch loop blocks waiting for the next inbound
/// message before running a maintenance check anyway.
pub const DISPATCH_WAIT: Duration = Duration::from_secs(1);
/// Hard cap on concurrently admitted transit tunnels.
pub const MAX_TRANSIT_TUNNELS: usize = 2500;
/// Floor the manager tries to keep local inbound/outbound tunnel counts at.
pub const MIN_LOCAL_TUNNELS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunnelRole {
    LocalInbound,
    LocalOutbound,
    TransitParticipant,
    TransitGateway,
    TransitEndpoint,
}

impl TunnelRole {
    pub fn is_transit(self) -> bool {
        matches!(self, Self::TransitParticipant | Self::TransitGateway | Self::TransitEndpoint)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunnelState {
    Pending,
    BuildReplyReceived,
    Established,
    Expiring,
    Expired,
    BuildFailed,
}

/// A transit hop's own forwarding parameters: its layer keys plus where
/// the re-encrypted message goes next.
#[derive(Debug, Clone)]
pub struct HopCrypto {
    pub layer_key: [u8; 32],
    pub iv_key: [u8; 32],
    pub next_tunnel_id: u32,
    pub next_hop: [u8; 32],
}

/// What the manager produced for a message that needs to leave this
/// router. The caller (the router's transport plumbing, out of scope
/// here) performs the actual send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Fully reassembled, fully decrypted bytes for the local I2NP handler.
    Local(Vec<u8>),
    /// Re-encrypted tunnel data to hand to the next hop in the chain.
    ForwardTunnelData { next_hop: [u8; 32], message: Vec<u8> },
    /// A fragment payload to wrap in a `TunnelGateway` message and send
    /// to `peer_hash_prefix`, optionally addressed to a specific tunnel.
    ForwardToPeer {
        peer_hash_prefix: [u8; 32],
        tunnel_id: Option<u32>,
        payload: Vec<u8>,
    },
}

/// One tunnel this router knows about, in any of its five roles.
pub struct Tunnel {
    pub tunnel_id: u32,
    pub role: TunnelRole,
    pub state: TunnelState,
    pub created_at: Instant,
    /// Set for the three transit roles: this hop's own layer keys.
    pub hop_crypto: Option<HopCrypto>,
    /// Set for `LocalInbound`/`LocalOutbound`: every hop's keys, in hop
    /// order, needed by the owning endpoint to peel the full onion.
    pub hop_keys: Vec<HopKeys>,
    reassembler: Reassembler,
}

impl Tunnel {
    pub fn new_local(tunnel_id: u32, role: TunnelRole, hop_keys: Vec<HopKeys>, created_at: Instant) -> Self {
        Self {
            tunnel_id,
            role,
            state: TunnelState::Established,
            created_at,
            hop_crypto: None,
            hop_keys,
            reassembler: Reassembler::new(),
        }
    }

    pub fn new_transit(tunnel_id: u32, role: TunnelRole, hop_crypto: HopCrypto, created_at: Instant) -> Self {
        Self {
            tunnel_id,
            role,
            state: TunnelState::Established,
            created_at,
            hop_crypto: Some(hop_crypto),
            hop_keys: Vec::new(),
            reassembler: Reassembler::new(),
        }
    }

    pub fn age(&self, now: Instant) -> Duration {
        now.duration_since(self.created_at)
    }

    pub fn is_near_expiry(&self, now: Instant) -> bool {
        self.age(now) >= TUNNEL_LIFETIME.saturating_sub(RECREATE_MARGIN)
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        self.age(now) >= TUNNEL_LIFETIME
    }

    /// Transit handling: add this hop's own encryption layer and forward.
    /// A transit endpoint never exposes `Local` delivery — any such
    /// fragment is dropped as malformed, per the endpoint's transit rule.
    fn forward_transit(&self, mut message: TunnelDataMessage) -> Result<Vec<DeliveryOutcome>> {
        let hop = self.hop_crypto.as_ref().ok_or(TunnelError::UnexpectedState)?;
        message.forward_layer(&hop.layer_key, &hop.iv_key, hop.next_tunnel_id)?;

        if self.role != TunnelRole::TransitEndpoint {
            return Ok(vec![DeliveryOutcome::ForwardTunnelData {
                next_hop: hop.next_hop,
                message: message.to_bytes().to_vec(),
            }]);
        }

        let plaintext = PlaintextBody::parse(&message.body, &message.iv)?;
        match parse_data_block(&plaintext.fragments)? {
            DataBlock::Whole { instruction, payload } => {
                if matches!(instruction.delivery_type, DeliveryType::Local) {
                    return Ok(Vec::new());
                }
                Ok(vec![dispatch_block(instruction, payload)])
            }
            // A transit endpoint has no reassembly state of its own to
            // offer (it doesn't own the tunnel); multi-fragment messages
            // passing through are forwarded whole rather than assembled.
            DataBlock::First { .. } | DataBlock::FollowOn { .. } => Ok(Vec::new()),
        }
    }

    /// Owning-endpoint handling: peel every hop's layer, in reverse of
    /// how the gateway applied them, to recover the plaintext body, then
    /// dispatch or buffer the fragment it contains.
    fn receive_local(&mut self, mut message: TunnelDataMessage, now: Instant) -> Result<Vec<DeliveryOutcome>> {
        for keys in self.hop_keys.iter().rev() {
            message.peel_layer(&keys.layer_key, &keys.iv_key)?;
        }
        let plaintext = PlaintextBody::parse(&message.body, &message.iv)?;

        match parse_data_block(&plaintext.fragments)? {
            DataBlock::Whole { instruction, payload } => Ok(vec![dispatch_block(instruction, payload)]),
            DataBlock::First { instruction, message_id, chunk } => {
                self.reassembler.start_message(message_id, instruction, chunk, now);
                Ok(Vec::new())
            }
            DataBlock::FollowOn { message_id, fragment_num, is_last, chunk } => {
                match self.reassembler.add_follow_on(message_id, fragment_num, is_last, chunk, now)? {
                    Some((instruction, complete)) => Ok(vec![dispatch_block(instruction, complete)]),
                    None => Ok(Vec::new()),
                }
            }
        }
    }
}

/// The tunnel ID a `TunnelData` message is addressed to, read directly
/// out of its payload without fully parsing the message.
fn tunnel_id_of(message: &Message) -> Option<u32> {
    if message.message_type != MessageType::TunnelData || message.payload.len() < 4 {
        return None;
    }
    Some(u32::from_be_bytes(message.payload[..4].try_into().unwrap()))
}

/// Dispatch one fully-available delivery, per its delivery type. `Local`
/// resolves directly to the finished bytes; `Tunnel`/`Router` become
/// outbound work for the caller.
fn dispatch_block(instruction: DeliveryInstruction, payload: Vec<u8>) -> DeliveryOutcome {
    match instruction.delivery_type {
        DeliveryType::Local => DeliveryOutcome::Local(payload),
        DeliveryType::Tunnel { peer_hash_prefix, tunnel_id } => DeliveryOutcome::ForwardToPeer {
            peer_hash_prefix,
            tunnel_id: Some(tunnel_id),
            payload,
        },
        DeliveryType::Router { peer_hash_prefix } => DeliveryOutcome::ForwardToPeer {
            peer_hash_prefix,
            tunnel_id: None,
            payload,
        },
    }
}

/// Owns every tunnel, the pools that keep local tunnels topped up, and
/// the inbound I2NP queue. One instance per router.
pub struct TunnelManager {
    /// Local inbound tunnels (this router is their endpoint) plus local
    /// outbound tunnels (this router is their gateway), keyed by the
    /// tunnel ID this router receives or originates on.
    local: HashMap<u32, Tunnel>,
    /// Transit tunnels of all three transit roles, keyed by the tunnel
    /// ID this router receives on for that tunnel.
    transit: HashMap<u32, Tunnel>,
    pools: Vec<TunnelPool>,
    accepts_tunnels: bool,
    last_maintenance: Option<Instant>,
    inbound_rx: Receiver<Message>,
}

impl TunnelManager {
    pub fn new(inbound_rx: Receiver<Message>) -> Self {
        Self {
            local: HashMap::new(),
            transit: HashMap::new(),
            pools: Vec::new(),
            accepts_tunnels: true,
            last_maintenance: None,
            inbound_rx,
        }
    }

    pub fn add_pool(&mut self, pool: TunnelPool) {
        self.pools.push(pool);
    }

    pub fn set_accepts_tunnels(&mut self, accepts: bool) {
        self.accepts_tunnels = accepts;
    }

    pub fn local_tunnel_count(&self, role: TunnelRole) -> usize {
        self.local.values().filter(|t| t.role == role).count()
    }

    pub fn transit_tunnel_count(&self) -> usize {
        self.transit.len()
    }

    /// Whether this router currently admits a new transit tunnel, per
    /// the admission-control policy: under the hard cap and willing to
    /// accept tunnels at all. Bandwidth exhaustion is signalled by the
    /// caller clearing `accepts_tunnels` rather than modeled here.
    pub fn admits_transit(&self) -> bool {
        self.accepts_tunnels && self.transit.len() < MAX_TRANSIT_TUNNELS
    }

    pub fn insert_local(&mut self, tunnel: Tunnel) {
        self.local.insert(tunnel.tunnel_id, tunnel);
    }

    /// Admit a new transit tunnel. Rejects with `Unreachable` if
    /// admission control currently refuses new transit work.
    pub fn insert_transit(&mut self, tunnel: Tunnel) -> Result<()> {
        if !self.admits_transit() {
            return Err(TunnelError::Unreachable("transit admission refused".into()));
        }
        self.transit.insert(tunnel.tunnel_id, tunnel);
        Ok(())
    }

    /// Route one `TunnelData` I2NP message by its tunnel ID, across the
    /// local and transit maps (outbound-only local tunnels never receive,
    /// so they're never looked up here), and run its role's handling.
    pub fn handle_tunnel_data(&mut self, payload: &[u8], now: Instant) -> Result<Vec<DeliveryOutcome>> {
        let message = TunnelDataMessage::from_bytes(payload)?;
        if let Some(tunnel) = self.local.get_mut(&message.tunnel_id) {
            return tunnel.receive_local(message, now);
        }
        if let Some(tunnel) = self.transit.get(&message.tunnel_id) {
            return tunnel.forward_transit(message);
        }
        Err(TunnelError::UnexpectedState)
    }

    /// One pass of the dispatch loop: block for up to [`DISPATCH_WAIT`]
    /// for the next inbound message, coalescing any further messages for
    /// the same tunnel that are already queued, then process them.
    /// Returns the delivery outcomes produced, in arrival order.
    pub fn dispatch_once(&mut self, now: Instant) -> Result<Vec<DeliveryOutcome>> {
        let first = match self.inbound_rx.recv_timeout(DISPATCH_WAIT) {
            Ok(message) => message,
            Err(RecvTimeoutError::Timeout) => return Ok(Vec::new()),
            Err(RecvTimeoutError::Disconnected) => return Err(TunnelError::Unreachable("inbound queue closed".into())),
        };

        let mut batch = vec![first];
        while let Ok(next) = self.inbound_rx.try_recv() {
            batch.push(next);
        }
        // Group consecutive messages bound for the same tunnel together
        // to cut head-of-line rework; the sort is stable, so messages
        // with no tunnel (or for distinct tunnels) keep their relative
        // arrival order.
        batch.sort_by_key(|m| tunnel_id_of(m).unwrap_or(u32::MAX));

        let mut outcomes = Vec::new();
        for message in batch {
            if message.message_type == MessageType::TunnelData {
                outcomes.extend(self.handle_tunnel_data(&message.payload, now)?);
            }
        }
        Ok(outcomes)
    }

    /// Purge pending builds past their creation timeout, mark
    /// near-expiry established tunnels `Expiring`, remove expired ones,
    /// and top up every pool. Idempotent if called more often than
    /// [`MAINTENANCE_INTERVAL`]; callers should gate on
    /// [`Self::due_for_maintenance`].
    pub fn manage_tunnels(&mut self, now: Instant) {
        for tunnel in self.local.values_mut().chain(self.transit.values_mut()) {
            if tunnel.state == TunnelState::Established && tunnel.is_near_expiry(now) {
                tunnel.state = TunnelState::Expiring;
            }
        }
        self.local.retain(|_, t| !t.is_expired(now));
        self.transit.retain(|_, t| !t.is_expired(now));

        self.last_maintenance = Some(now);
    }

    pub fn due_for_maintenance(&self, now: Instant) -> bool {
        match self.last_maintenance {
            None => true,
            Some(last) => now.duration_since(last) >= MAINTENANCE_INTERVAL,
        }
    }

    pub fn pools(&self) -> &[TunnelPool] {
        &self.pools
    }

    pub fn pools_mut(&mut self) -> &mut [TunnelPool] {
        &mut self.pools
    }

    /// Whether a zero-hop inbound tunnel (for purely internal use) should
    /// be synthesised because this router has no inbound tunnels at all.
    pub fn needs_zero_hop_inbound(&self) -> bool {
        self.local_tunnel_count(TunnelRole::LocalInbound) == 0
    }

    pub fn needs_minimum_inbound(&self) -> bool {
        self.local_tunnel_count(TunnelRole::LocalInbound) < MIN_LOCAL_TUNNELS
    }

    pub fn needs_minimum_outbound(&self) -> bool {
        self.local_tunnel_count(TunnelRole::LocalOutbound) < MIN_LOCAL_TUNNELS
    }
}
