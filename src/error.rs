use crate::config::{Route, Step};
use std::io;
use std::net::Ipv4Addr;
use thiserror::Error;

/// Recoverable channel errors.
#[derive(Debug, Error)]
pub enum Error {
    /// `/dev/net/tun` could not be opened or `TUNSETIFF` was refused.
    #[error("failed to create tunnel device: {0}")]
    DeviceCreation(#[source] io::Error),

    /// One of the ordered configuration steps failed.
    #[error("failed to configure interface ({step}): {source}")]
    Configuration {
        step: Step,
        #[source]
        source: io::Error,
    },

    /// The read path saw this channel's stop marker. Not a failure: the reader
    /// loop should stop.
    #[error("channel is closing")]
    Closing,

    /// The channel has been closed.
    #[error("channel is closed")]
    Closed,

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    /// True for the stop-marker signal, which callers treat as end-of-stream
    pub fn is_closing(&self) -> bool {
        matches!(self, Error::Closing)
    }

    /// True once nothing more will be read: the stop marker arrived or the
    /// channel was already closed when the call started
    pub fn is_terminal(&self) -> bool {
        matches!(self, Error::Closing | Error::Closed)
    }

    /// OS error code behind this error, if any
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Error::DeviceCreation(e) | Error::Io(e) => e.raw_os_error(),
            Error::Configuration { source, .. } => source.raw_os_error(),
            Error::Closing | Error::Closed => None,
        }
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::DeviceCreation(e) | Error::Io(e) => e,
            Error::Closing => io::Error::new(io::ErrorKind::UnexpectedEof, Error::Closing),
            Error::Closed => io::Error::new(io::ErrorKind::NotConnected, Error::Closed),
            other @ Error::Configuration { .. } => io::Error::new(io::ErrorKind::Other, other),
        }
    }
}

/// The diagnostic route could not be installed. The virtual networking
/// subsystem is unusable; whoever owns the process should exit.
#[derive(Debug, Error)]
#[error("failed to install diagnostic route {route} via {gateway}: {source}")]
pub struct FatalConfigurationError {
    pub route: Route,
    pub gateway: Ipv4Addr,
    #[source]
    pub source: io::Error,
}

/// Outcome of opening a channel, split by severity.
#[derive(Debug, Error)]
pub enum OpenError {
    #[error(transparent)]
    Channel(#[from] Error),

    #[error(transparent)]
    Fatal(#[from] FatalConfigurationError),
}

impl OpenError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, OpenError::Fatal(_))
    }
}
