//! Shared error type for the josefine workspace.

use std::net::AddrParseError;

pub type Result<T> = std::result::Result<T, Error>;

/// Error kinds shared by the driver, timer manager, proxy supervisor and
/// client API surface. Variants map onto the error taxonomy of the role
/// driver: transport, timeout, protocol violation, sub-driver crash, and
/// plain IO/config failures underneath all of them.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid address: {0}")]
    Addr(#[from] AddrParseError),

    #[error("config error: {0}")]
    Config(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("timed out waiting for {0}")]
    Timeout(String),

    #[error("internal channel closed: {0}")]
    ChannelClosed(String),

    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("replication proxy failed: {0}")]
    ProxyFailure(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn transport<S: Into<String>>(msg: S) -> Error {
        Error::Transport(msg.into())
    }

    pub fn timeout<S: Into<String>>(server: S) -> Error {
        Error::Timeout(server.into())
    }

    pub fn protocol_violation<S: Into<String>>(msg: S) -> Error {
        Error::ProtocolViolation(msg.into())
    }
}
