//! Tunnel subsystem: build protocol (C5), data-plane wire format and
//! fragmentation (C6), pools (C7), and the manager that owns every
//! local/transit tunnel and runs the dispatch loop (C8).

pub mod build;
pub mod data;
pub mod error;
pub mod fragment;
pub mod manager;
pub mod pool;
pub mod record;

pub use error::{Result, TunnelError};

pub use build::{
    BuildState, HopKeys, HopSpec, PendingBuild, BUILD_TIMEOUT, FIXED_RECORD_COUNT, MAX_VARIABLE_RECORD_COUNT,
};
/// The role a hop plays in the tunnel it is being *built* for: which end
/// of the tunnel the pending build is assembling. Distinct from
/// [`manager::TunnelRole`], which names the role an already-established
/// tunnel plays in this router's live tunnel tables.
pub use build::TunnelRole as BuildRole;

pub use record::{
    BuildRecord, BuildRecordFields, HopStatus, ENCRYPTED_INNER_SIZE, FLAG_INBOUND_GATEWAY, FLAG_OUTBOUND_ENDPOINT,
    INNER_PLAINTEXT_SIZE, RECORD_SIZE, TARGET_HASH_PREFIX_SIZE,
};

pub use data::{PlaintextBody, TunnelDataMessage, MESSAGE_SIZE};

pub use fragment::{
    DataBlock, DeliveryInstruction, DeliveryType, Fragmenter, Reassembler, DATA_WINDOW_SIZE, REASSEMBLY_TIMEOUT,
};

pub use pool::{PoolRole, TunnelPool, RECREATE_MARGIN, TEST_INTERVAL, TEST_TIMEOUT, TUNNEL_LIFETIME};

pub use manager::{
    DeliveryOutcome, HopCrypto, Tunnel, TunnelManager, TunnelState, DISPATCH_WAIT, MAINTENANCE_INTERVAL,
    MAX_TRANSIT_TUNNELS, MIN_LOCAL_TUNNELS,
};
/// The role an established tunnel plays in this router's live tunnel
/// tables (local inbound/outbound, or one of the transit roles).
/// Distinct from [`BuildRole`], which names only which end of a tunnel a
/// build-in-progress is assembling.
pub use manager::TunnelRole;
