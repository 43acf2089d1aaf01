use std::io;
use thiserror::Error;

/// Failures while reading a request off the wire.
///
/// `ConnectionClosed` (the peer went away before sending a complete
/// request) is kept distinct from the parse failures, which get a 400:
/// a closed connection gets no response at all.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("connection closed before a complete request arrived")]
    ConnectionClosed,

    #[error("malformed request line")]
    Malformed,

    #[error("header block exceeds the 64 KiB cap")]
    HeadersTooLarge,

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Failures while serving one accepted connection.
#[derive(Debug, Error)]
pub enum ServeError {
    #[error("upstream connect to {addr} failed")]
    UpstreamConnect {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("upstream read timed out")]
    UpstreamTimeout,

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl ServeError {
    /// Whether this error is a read-timeout rather than a hard failure.
    /// Platforms disagree on the kind a timed-out socket read returns.
    pub fn is_timeout(&self) -> bool {
        match self {
            ServeError::UpstreamTimeout => true,
            ServeError::Io(e) => {
                matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
            }
            _ => false,
        }
    }
}
