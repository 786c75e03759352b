use std::time::Duration;

use crate::error::LineError;

/// Tuning option understood by [`Line::set_option`].
///
/// A zero duration disables the bound and restores indefinite blocking.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LineOption {
    /// Bound every subsequent read to the given wait.
    ReceiveTimeout(Duration),
    /// Bound every subsequent write to the given wait.
    SendTimeout(Duration),
}

/// An endpoint that may expose a native handle for readiness multiplexing.
///
/// Backends whose transport lives in the kernel (sockets) return their file
/// descriptor; purely in-process endpoints return `None` and cannot be added
/// to a poller.
pub trait Pollable {
    #[cfg(unix)]
    fn native_handle(&self) -> Option<std::os::unix::io::RawFd> {
        None
    }
}

/// A connected bidirectional byte stream.
///
/// `read` returns `Ok(n >= 1)` with data, `Ok(0)` when a configured receive
/// timeout elapsed with nothing to deliver, and `Err(ConnectionLost)` once
/// the peer is gone. `write` accepts as many bytes as the transport can take
/// right now; short writes are legal and the caller loops.
pub trait Line: Pollable + Send {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, LineError>;
    fn write(&mut self, buf: &[u8]) -> Result<usize, LineError>;
    fn set_option(&mut self, option: LineOption) -> Result<(), LineError>;
}

/// Server side of a transport: produces a connected [`Line`] per incoming
/// connection, or `None` when the bounded wait elapses.
pub trait Acceptor: Pollable + Send {
    fn accept(&mut self, timeout: Duration) -> Result<Option<Box<dyn Line>>, LineError>;
}

/// Pluggable backend constructor, keyed by URI scheme.
///
/// `address` is everything after the `"://"` delimiter; its meaning is
/// backend-specific.
pub trait LineFactory: Send + Sync {
    fn supports_scheme(&self, scheme: &str) -> bool;
    fn create_client(&self, address: &str) -> Result<Box<dyn Line>, LineError>;
    fn create_server(&self, address: &str) -> Result<Box<dyn Acceptor>, LineError>;
}
