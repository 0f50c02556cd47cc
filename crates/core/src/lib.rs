//! Shared types used throughout the router: identity hashes, capability
//! flags, lease sets, configuration, and the common error enum.

pub mod config;
mod error;
pub mod lease_set;
mod types;

pub use error::{CoreError, Result};
pub use lease_set::{Lease, LeaseSet};
pub use types::*;
