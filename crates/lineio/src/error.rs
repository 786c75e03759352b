use thiserror::Error;

/// Library-wide error type.
///
/// Streaming paths (`read`/`write`) return the recoverable kinds so callers
/// can check and continue; construction and configuration failures surface as
/// the distinguished variants below.
#[derive(Error, Debug)]
pub enum LineError {
    #[error("bounded wait elapsed with no progress")]
    Timeout,
    #[error("peer closed or queue disconnected")]
    ConnectionLost,
    #[error("write of {0} bytes exceeds the queue capacity")]
    TooBigBuffer(usize),
    #[error("option not supported by this backend")]
    UnsupportedOption,
    #[error("endpoint has no pollable native handle")]
    NotPollable,
    #[error("an acceptor is already bound to {0}")]
    AddressInUse(String),
    #[error("no factory claims scheme {0:?}")]
    NoFactory(String),
    #[error("endpoint must look like scheme://address, got {0:?}")]
    InvalidUri(String),
    #[error("malformed message: declared frame length overruns the buffer")]
    MalformedMessage,
    #[error("buffer capacity must be a power of two of at least 1024, got {0}")]
    InvalidCapacity(usize),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl LineError {
    /// Numeric sentinel for callers speaking the wire-level convention:
    /// −1 timeout, −2 connection lost, −3 oversized write, −100 anything else.
    pub fn sentinel(&self) -> i32 {
        match self {
            Self::Timeout => -1,
            Self::ConnectionLost => -2,
            Self::TooBigBuffer(_) => -3,
            _ => -100,
        }
    }
}
