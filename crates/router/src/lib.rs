//! The router: wires NetDB, the tunnel manager, local garlic
//! destinations, and the key pre-generation pool into one struct owned
//! by the embedding binary, replacing the source's global singletons.

pub mod error;
pub mod router;
pub mod traits;

pub use error::{Result, RouterError};
pub use router::Router;
pub use traits::{Clock, Csprng, FilesystemPersistence, Persistence, SystemClock, ThreadCsprng, Transport};
