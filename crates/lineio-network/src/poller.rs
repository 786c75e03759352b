use std::os::unix::io::RawFd;
use std::time::Duration;

use mio::unix::SourceFd;
use mio::{Events, Interest, Poll, Token};
use tracing::debug;

use lineio::{LineError, Pollable};

bitflags::bitflags! {
    /// Readiness bits reported per registered endpoint.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct LineEvents: u8 {
        const READ = 1;
        const WRITE = 1 << 1;
        const ERROR = 1 << 2;
    }
}

struct Registration {
    fd: RawFd,
    token: Token,
    requested: LineEvents,
}

/// Readiness multiplex over any set of [`Pollable`] endpoints with a native
/// handle (socket lines and acceptors). In-process endpoints have none and
/// are rejected with [`LineError::NotPollable`].
///
/// One `poll` call refreshes the readiness sets returned by
/// [`events_for`](Self::events_for); results are valid until the next call.
pub struct Poller {
    poll: Poll,
    events: Events,
    registrations: Vec<Registration>,
    ready: Vec<(RawFd, LineEvents)>,
    next_token: usize,
}

impl Poller {
    pub fn new() -> Result<Self, LineError> {
        Ok(Self {
            poll: Poll::new()?,
            events: Events::with_capacity(64),
            registrations: Vec::new(),
            ready: Vec::new(),
            next_token: 0,
        })
    }

    /// Registers an endpoint for the given readiness bits.
    pub fn add(&mut self, endpoint: &dyn Pollable, events: LineEvents) -> Result<(), LineError> {
        let fd = endpoint.native_handle().ok_or(LineError::NotPollable)?;

        // Errors are reported regardless of interest, so an error-only
        // registration still needs a readable subscription to exist.
        let interest = if events.contains(LineEvents::WRITE) {
            Interest::READABLE | Interest::WRITABLE
        } else {
            Interest::READABLE
        };

        let token = Token(self.next_token);
        self.next_token += 1;
        self.poll.registry().register(&mut SourceFd(&fd), token, interest)?;
        self.registrations.push(Registration { fd, token, requested: events });
        Ok(())
    }

    /// Drops an endpoint from the set; unknown endpoints are ignored.
    pub fn remove(&mut self, endpoint: &dyn Pollable) {
        let Some(fd) = endpoint.native_handle() else { return };
        let Some(at) = self.registrations.iter().position(|r| r.fd == fd) else { return };
        if let Err(err) = self.poll.registry().deregister(&mut SourceFd(&fd)) {
            debug!(?err, fd, "poller deregister");
        }
        self.registrations.remove(at);
    }

    /// Waits up to `timeout` for readiness; returns whether any registered
    /// endpoint has events pending.
    pub fn poll(&mut self, timeout: Duration) -> Result<bool, LineError> {
        self.ready.clear();
        self.poll.poll(&mut self.events, Some(timeout))?;

        let registrations = &self.registrations;
        let ready = &mut self.ready;
        for event in self.events.iter() {
            let Some(registration) = registrations.iter().find(|r| r.token == event.token())
            else {
                continue;
            };
            let mut set = LineEvents::empty();
            if event.is_readable() {
                set |= LineEvents::READ;
            }
            if event.is_writable() {
                set |= LineEvents::WRITE;
            }
            if event.is_error() {
                set |= LineEvents::ERROR;
            }
            set &= registration.requested;
            if !set.is_empty() {
                ready.push((registration.fd, set));
            }
        }
        Ok(!self.ready.is_empty())
    }

    /// Readiness observed for `endpoint` in the most recent poll.
    pub fn events_for(&self, endpoint: &dyn Pollable) -> LineEvents {
        let Some(fd) = endpoint.native_handle() else {
            return LineEvents::empty();
        };
        self.ready
            .iter()
            .find(|(ready_fd, _)| *ready_fd == fd)
            .map_or(LineEvents::empty(), |(_, set)| *set)
    }
}
