//! Garlic routing: session crypto and tag lifecycle (C9), and the local
//! destination that demultiplexes inbound garlics and composes outbound
//! ones (C10).

pub mod clove;
pub mod destination;
pub mod error;
pub mod session;

pub use error::{GarlicError, Result};

pub use clove::{Clove, DeliveryType};

pub use session::{
    GarlicSession, LeaseSetUpdateStatus, SessionTag, LEASE_SET_CONFIRMATION_TIMEOUT, NUM_TAGS_CONNECTION,
    NUM_TAGS_LOOKUP, OUTGOING_TAG_LIFETIME,
};

pub use destination::{GarlicDeliveryOutcome, GarlicDestination, GC_INTERVAL, INCOMING_TAG_LIFETIME};
