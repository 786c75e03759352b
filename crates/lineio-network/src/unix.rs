use std::io::{self, Read, Write};
use std::os::unix::io::{AsRawFd, RawFd};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use mio::unix::SourceFd;
use mio::{Events, Interest, Poll, Token};
use tracing::debug;

use lineio::{Acceptor, Line, LineError, LineFactory, LineOption, Pollable};

use crate::tcp::{map_read_error, map_write_error, timeout_option};

const LISTENER: Token = Token(0);

/// A connected Unix-domain byte stream (`local:///absolute/path`).
pub struct UnixLine {
    stream: UnixStream,
}

impl UnixLine {
    fn connect(address: &str) -> Result<Self, LineError> {
        let stream = UnixStream::connect(address)?;
        debug!(address, "unix client connected");
        Ok(Self { stream })
    }
}

impl Pollable for UnixLine {
    fn native_handle(&self) -> Option<RawFd> {
        Some(self.stream.as_raw_fd())
    }
}

impl Line for UnixLine {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, LineError> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            match self.stream.read(buf) {
                Ok(0) => return Err(LineError::ConnectionLost),
                Ok(n) => return Ok(n),
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => return map_read_error(err),
            }
        }
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize, LineError> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            match self.stream.write(buf) {
                Ok(0) => return Err(LineError::ConnectionLost),
                Ok(n) => return Ok(n),
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => return Err(map_write_error(err)),
            }
        }
    }

    fn set_option(&mut self, option: LineOption) -> Result<(), LineError> {
        match option {
            LineOption::ReceiveTimeout(timeout) => {
                self.stream.set_read_timeout(timeout_option(timeout))?;
            }
            LineOption::SendTimeout(timeout) => {
                self.stream.set_write_timeout(timeout_option(timeout))?;
            }
        }
        Ok(())
    }
}

/// Bounded-wait Unix-domain acceptor. Owns the socket file: a stale one is
/// unlinked before bind and the live one is removed on drop.
pub struct UnixAcceptor {
    listener: UnixListener,
    path: PathBuf,
    poll: Poll,
    events: Events,
}

impl UnixAcceptor {
    fn bind(address: &str) -> Result<Self, LineError> {
        let path = PathBuf::from(address);
        match std::fs::remove_file(&path) {
            Ok(()) => debug!(address, "removed stale socket file"),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }

        let listener = UnixListener::bind(&path)?;
        listener.set_nonblocking(true)?;

        let poll = Poll::new()?;
        poll.registry().register(
            &mut SourceFd(&listener.as_raw_fd()),
            LISTENER,
            Interest::READABLE,
        )?;
        debug!(address, "unix acceptor listening");
        Ok(Self { listener, path, poll, events: Events::with_capacity(4) })
    }
}

impl Pollable for UnixAcceptor {
    fn native_handle(&self) -> Option<RawFd> {
        Some(self.listener.as_raw_fd())
    }
}

impl Acceptor for UnixAcceptor {
    fn accept(&mut self, timeout: Duration) -> Result<Option<Box<dyn Line>>, LineError> {
        let deadline = Instant::now() + timeout;
        loop {
            match self.listener.accept() {
                Ok((stream, _)) => {
                    stream.set_nonblocking(false)?;
                    debug!(path = %self.path.display(), "unix connection accepted");
                    return Ok(Some(Box::new(UnixLine { stream })));
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Ok(None);
                    }
                    self.poll.poll(&mut self.events, Some(deadline - now))?;
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => return Err(err.into()),
            }
        }
    }
}

impl Drop for UnixAcceptor {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Factory for `local:///absolute/path` endpoints backed by Unix-domain
/// sockets.
pub struct UnixFactory;

impl LineFactory for UnixFactory {
    fn supports_scheme(&self, scheme: &str) -> bool {
        scheme == "local"
    }

    fn create_client(&self, address: &str) -> Result<Box<dyn Line>, LineError> {
        Ok(Box::new(UnixLine::connect(address)?))
    }

    fn create_server(&self, address: &str) -> Result<Box<dyn Acceptor>, LineError> {
        Ok(Box::new(UnixAcceptor::bind(address)?))
    }
}
