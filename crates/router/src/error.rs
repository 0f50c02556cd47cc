use thiserror::Error;

#[derive(Error, Debug)]
pub enum RouterError {
    #[error("tunnel subsystem error: {0}")]
    Tunnel(#[from] garlicrouter_tunnel::TunnelError),

    #[error("garlic subsystem error: {0}")]
    Garlic(#[from] garlicrouter_garlic::GarlicError),

    #[error("netdb error: {0}")]
    NetDb(#[from] garlicrouter_netdb::NetDbError),

    #[error("no local destination with that identity hash")]
    UnknownDestination,

    #[error("router is already running")]
    AlreadyRunning,

    #[error("router is not running")]
    NotRunning,
}

pub type Result<T> = std::result::Result<T, RouterError>;
