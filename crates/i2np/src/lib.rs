//! The I2NP message plane: framing, parsing, checksums, and dispatch of
//! the network's typed binary messages.

pub mod dispatch;
mod error;
pub mod message;

pub use dispatch::{Dispatcher, Route};
pub use error::{I2npError, Result};
pub use message::{Message, MessageType};
