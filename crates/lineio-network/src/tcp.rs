use std::io::{self, Read, Write};
use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpListener, TcpStream};
use std::os::unix::io::{AsRawFd, RawFd};
use std::time::{Duration, Instant};

use mio::unix::SourceFd;
use mio::{Events, Interest, Poll, Token};
use tracing::debug;

use lineio::{Acceptor, Line, LineError, LineFactory, LineOption, Pollable};

const LISTENER: Token = Token(0);

/// Converts a `host:port` address; `*` binds every interface.
fn parse_address(address: &str, wildcard_ok: bool) -> Result<SocketAddr, LineError> {
    let invalid = || LineError::InvalidUri(format!("tcp://{address}"));
    let (host, port) = address.rsplit_once(':').ok_or_else(invalid)?;
    let port: u16 = port.parse().map_err(|_| invalid())?;
    let ip: IpAddr = if host == "*" {
        if !wildcard_ok {
            return Err(invalid());
        }
        IpAddr::V4(Ipv4Addr::UNSPECIFIED)
    } else {
        host.parse().map_err(|_| invalid())?
    };
    Ok(SocketAddr::new(ip, port))
}

pub(crate) fn map_read_error(err: io::Error) -> Result<usize, LineError> {
    match err.kind() {
        // Kernel receive timeout expired with nothing delivered.
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => Ok(0),
        io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::BrokenPipe
        | io::ErrorKind::NotConnected
        | io::ErrorKind::UnexpectedEof => Err(LineError::ConnectionLost),
        _ => Err(LineError::Io(err)),
    }
}

pub(crate) fn map_write_error(err: io::Error) -> LineError {
    match err.kind() {
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => LineError::Timeout,
        io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::BrokenPipe
        | io::ErrorKind::NotConnected => LineError::ConnectionLost,
        _ => LineError::Io(err),
    }
}

pub(crate) fn timeout_option(timeout: Duration) -> Option<Duration> {
    // A zero bound restores indefinite blocking.
    (!timeout.is_zero()).then_some(timeout)
}

/// A connected TCP byte stream (`tcp://host:port`).
pub struct TcpLine {
    stream: TcpStream,
}

impl TcpLine {
    fn connect(address: &str) -> Result<Self, LineError> {
        let addr = parse_address(address, false)?;
        let stream = TcpStream::connect(addr)?;
        debug!(%addr, "tcp client connected");
        Self::from_stream(stream)
    }

    fn from_stream(stream: TcpStream) -> Result<Self, LineError> {
        stream.set_nodelay(true)?;
        Ok(Self { stream })
    }
}

impl Pollable for TcpLine {
    fn native_handle(&self) -> Option<RawFd> {
        Some(self.stream.as_raw_fd())
    }
}

impl Line for TcpLine {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, LineError> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            match self.stream.read(buf) {
                // EOF: the peer shut the stream down.
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

/// Bounded-wait TCP acceptor. The listener runs non-blocking and readiness
/// is awaited through a private poll, so `accept` can honour its timeout.
pub struct TcpAcceptor {
    listener: TcpListener,
    poll: Poll,
    events: Events,
}

impl TcpAcceptor {
    fn bind(address: &str) -> Result<Self, LineError> {
        let addr = parse_address(address, true)?;
        let listener = TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;

        let poll = Poll::new()?;
        poll.registry().register(
            &mut SourceFd(&listener.as_raw_fd()),
            LISTENER,
            Interest::READABLE,
        )?;
        debug!(%addr, "tcp acceptor listening");
        Ok(Self { listener, poll, events: Events::with_capacity(4) })
    }
}

impl Pollable for TcpAcceptor {
    fn native_handle(&self) -> Option<RawFd> {
        Some(self.listener.as_raw_fd())
    }
}

impl Acceptor for TcpAcceptor {
    fn accept(&mut self, timeout: Duration) -> Result<Option<Box<dyn Line>>, LineError> {
        let deadline = Instant::now() + timeout;
        loop {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    stream.set_nonblocking(false)?;
                    debug!(%peer, "tcp connection accepted");
                    return Ok(Some(Box::new(TcpLine::from_stream(stream)?)));
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

/// Factory for `tcp://host:port` endpoints; `tcp://*:port` binds every
/// interface on the server side.
pub struct TcpFactory;

impl LineFactory for TcpFactory {
    fn supports_scheme(&self, scheme: &str) -> bool {
        scheme == "tcp"
    }

    fn create_client(&self, address: &str) -> Result<Box<dyn Line>, LineError> {
        Ok(Box::new(TcpLine::connect(address)?))
    }

    fn create_server(&self, address: &str) -> Result<Box<dyn Acceptor>, LineError> {
        Ok(Box::new(TcpAcceptor::bind(address)?))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn address_parsing() {
        assert_eq!(
            parse_address("127.0.0.1:6000", false).unwrap(),
            SocketAddr::from((Ipv4Addr::LOCALHOST, 6000))
        );
        assert_eq!(
            parse_address("*:7000", true).unwrap(),
            SocketAddr::from((Ipv4Addr::UNSPECIFIED, 7000))
        );
        assert!(matches!(parse_address("*:7000", false), Err(LineError::InvalidUri(_))));
        assert!(matches!(parse_address("localhost", false), Err(LineError::InvalidUri(_))));
        assert!(matches!(parse_address("1.2.3.4:notaport", false), Err(LineError::InvalidUri(_))));
    }
}
