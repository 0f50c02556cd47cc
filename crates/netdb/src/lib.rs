//! NetDB: the distributed directory of router descriptors and lease sets,
//! its daily-reshuffled routing-key geometry, and local peer profiling.

mod error;
pub mod lookup;
pub mod peer;
pub mod profile;
pub mod routing_key;
pub mod store;
pub mod wire;

pub use error::{NetDbError, Result};
pub use lookup::{LookupKind, LookupTable, PendingLookup};
pub use peer::RouterInfo;
pub use profile::{PeerProfile, ProfileTable};
pub use store::NetDb;
pub use wire::{DatabaseLookupPayload, DatabaseSearchReplyPayload, DatabaseStorePayload, STORE_TYPE_LEASESET, STORE_TYPE_ROUTER_INFO};
