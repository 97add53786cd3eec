use crate::protocol::MacAddr;
use std::io;
use std::net::Ipv4Addr;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("interface {name} not found")]
    InterfaceNotFound { name: String },

    #[error("invalid packet: {0}")]
    InvalidPacket(String),

    #[error("transport closed")]
    TransportClosed,

    #[error("host table full ({capacity} entries)")]
    TableFull { capacity: usize },

    #[error("host {mac} already in table")]
    DuplicateHost { mac: MacAddr },

    #[error("host {mac} not found")]
    HostNotFound { mac: MacAddr },

    #[error("host {mac} is already being hunted")]
    HuntInProgress { mac: MacAddr },

    #[error("host {mac} holds {actual}, not {expected}")]
    AddressMismatch {
        mac: MacAddr,
        expected: Ipv4Addr,
        actual: Ipv4Addr,
    },

    #[error("failed to update host {mac} to {ip}")]
    UpdateFailed { mac: MacAddr, ip: Ipv4Addr },

    #[error("timed out waiting for tasks to stop")]
    StopTimeout,
}

impl Error {
    /// Whether a receive loop should back off and retry after this error.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Io(e) => {
                matches!(
                    e.kind(),
                    io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                ) || matches!(
                    e.raw_os_error(),
                    Some(libc::ENETDOWN) | Some(libc::ENOBUFS) | Some(libc::EAGAIN)
                )
            }
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
