//! GarlicRouter Daemon
//!
//! Background service wrapping a [`garlicrouter_router::Router`] behind a
//! JSON-RPC-over-Unix-socket IPC server for local admin tooling.
//!
//! ## IPC methods
//!
//! - `status` — observability counters and admin state
//! - `set_reachable` — admin API: toggle this router's reachability
//! - `set_floodfill` — admin API: opt in/out of floodfill participation
//! - `set_bandwidth` — admin API: declare a bandwidth class (`L`..`X`)

mod ipc;
mod service;

pub use ipc::{IpcConfig, IpcHandler, IpcServer};
pub use service::RouterService;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DaemonError {
    #[error("IPC error: {0}")]
    IpcError(String),

    #[error("router error: {0}")]
    RouterError(#[from] garlicrouter_router::RouterError),

    #[error("already running")]
    AlreadyRunning,

    #[error("not running")]
    NotRunning,

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DaemonError>;
