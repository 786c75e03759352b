//! In-process transport: lines are pairs of crosswise-shared byte queues,
//! matched to acceptors through a process-wide rendezvous keyed by address.

mod queue;
mod ring;

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};

use once_cell::sync::Lazy;
use tracing::debug;

use crate::error::LineError;
use crate::line::{Acceptor, Line, LineFactory, LineOption, Pollable};

use queue::DataQueue;

/// Default per-direction queue capacity in bytes.
pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

/// The two queues of one connection, seen from one side. The peer holds the
/// same queues crosswise: its input is our output and vice versa. The final
/// drop of a side flips both to disconnected.
#[derive(Clone)]
struct QueuePair {
    /// Reads drain from here.
    input: Arc<DataQueue>,
    /// Writes append here.
    output: Arc<DataQueue>,
}

/// Pairing state a pending client shares with the rendezvous. The accepting
/// side installs the queues and signals; the client blocks until then.
struct InprocCore {
    address: String,
    pairing: Mutex<Option<QueuePair>>,
    paired: Condvar,
}

impl InprocCore {
    fn new(address: &str) -> Self {
        Self { address: address.to_string(), pairing: Mutex::new(None), paired: Condvar::new() }
    }

    /// Blocks until an acceptor installs the queues.
    fn wait_for_connection(&self) -> QueuePair {
        let mut slot = self.pairing.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if let Some(pair) = slot.as_ref() {
                return pair.clone();
            }
            slot = self.paired.wait(slot).unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn install(&self, pair: QueuePair) {
        let mut slot = self.pairing.lock().unwrap_or_else(PoisonError::into_inner);
        *slot = Some(pair);
        self.paired.notify_one();
    }
}

/// One side of an in-process connection.
pub struct InprocLine {
    address: String,
    queues: QueuePair,
    receive_timeout: Option<Duration>,
}

impl InprocLine {
    /// Server side of a pairing: allocates both queues, publishes them as
    /// connected, and hands the client its crosswise view.
    fn pair_with(client: &InprocCore, buffer_size: usize) -> Self {
        let forward = Arc::new(DataQueue::new(buffer_size));
        let backward = Arc::new(DataQueue::new(buffer_size));
        forward.set_connected(true);
        backward.set_connected(true);

        client.install(QueuePair { input: Arc::clone(&backward), output: Arc::clone(&forward) });
        debug!(address = %client.address, "in-process connection paired");

        Self {
            address: client.address.clone(),
            queues: QueuePair { input: forward, output: backward },
            receive_timeout: None,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }
}

impl Pollable for InprocLine {}

impl Line for InprocLine {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, LineError> {
        match self.receive_timeout {
            Some(timeout) => self.queues.input.read_with_timeout(buf, timeout),
            None => self.queues.input.read(buf),
        }
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize, LineError> {
        self.queues.output.write(buf)
    }

    fn set_option(&mut self, option: LineOption) -> Result<(), LineError> {
        match option {
            LineOption::ReceiveTimeout(timeout) => {
                self.receive_timeout = (!timeout.is_zero()).then_some(timeout);
                Ok(())
            }
            LineOption::SendTimeout(_) => Err(LineError::UnsupportedOption),
        }
    }
}

impl Drop for InprocLine {
    fn drop(&mut self) {
        self.queues.input.set_connected(false);
        self.queues.output.set_connected(false);
    }
}

/// Process-wide rendezvous: live acceptor addresses plus the queue of
/// clients awaiting pairing. The pending list holds weak references; the
/// strong reference lives on the connecting caller's stack, so a client that
/// gives up simply evaporates from the queue.
struct Rendezvous {
    state: Mutex<RendezvousState>,
    wakeup: Condvar,
}

#[derive(Default)]
struct RendezvousState {
    acceptors: Vec<String>,
    pending: VecDeque<Weak<InprocCore>>,
}

static RENDEZVOUS: Lazy<Rendezvous> =
    Lazy::new(|| Rendezvous { state: Mutex::new(RendezvousState::default()), wakeup: Condvar::new() });

fn rendezvous_state() -> MutexGuard<'static, RendezvousState> {
    RENDEZVOUS.state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Server side of the in-process transport. Registered in the rendezvous for
/// the lifetime of the value; no two live acceptors share an address.
pub struct InprocAcceptor {
    address: String,
    buffer_size: usize,
}

impl InprocAcceptor {
    fn bind(address: &str, buffer_size: usize) -> Result<Self, LineError> {
        let mut state = rendezvous_state();
        if state.acceptors.iter().any(|registered| registered == address) {
            return Err(LineError::AddressInUse(address.to_string()));
        }
        state.acceptors.push(address.to_string());
        debug!(address, "in-process acceptor registered");
        Ok(Self { address: address.to_string(), buffer_size })
    }

    pub fn address(&self) -> &str {
        &self.address
    }
}

impl Pollable for InprocAcceptor {}

impl Acceptor for InprocAcceptor {
    /// Picks the oldest pending client with a matching address, pairing it
    /// into a new server-side line. Dead pending entries are pruned on the
    /// way.
    fn accept(&mut self, timeout: Duration) -> Result<Option<Box<dyn Line>>, LineError> {
        let start = Instant::now();
        let mut state = rendezvous_state();
        loop {
            let mut i = 0;
            while i < state.pending.len() {
                let Some(core) = state.pending[i].upgrade() else {
                    state.pending.remove(i);
                    continue;
                };
                if core.address == self.address {
                    state.pending.remove(i);
                    return Ok(Some(Box::new(InprocLine::pair_with(&core, self.buffer_size))));
                }
                i += 1;
            }

            let elapsed = start.elapsed();
            if elapsed >= timeout {
                return Ok(None);
            }
            let (next, _) = RENDEZVOUS
                .wakeup
                .wait_timeout(state, timeout - elapsed)
                .unwrap_or_else(PoisonError::into_inner);
            state = next;
        }
    }
}

impl Drop for InprocAcceptor {
    fn drop(&mut self) {
        let mut state = rendezvous_state();
        state.acceptors.retain(|registered| registered != &self.address);
        debug!(address = %self.address, "in-process acceptor deregistered");
    }
}

/// Factory for `inproc://label` endpoints.
pub struct InprocFactory {
    buffer_size: usize,
}

impl InprocFactory {
    pub fn new() -> Self {
        Self { buffer_size: DEFAULT_BUFFER_SIZE }
    }

    /// Overrides the per-direction queue capacity; accepted values are
    /// powers of two of at least 1024 bytes.
    pub fn with_buffer_size(buffer_size: usize) -> Result<Self, LineError> {
        if !buffer_size.is_power_of_two() || buffer_size < 1024 {
            return Err(LineError::InvalidCapacity(buffer_size));
        }
        Ok(Self { buffer_size })
    }
}

impl Default for InprocFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl LineFactory for InprocFactory {
    fn supports_scheme(&self, scheme: &str) -> bool {
        scheme == "inproc"
    }

    /// Enqueues a pending client and blocks until an acceptor pairs it.
    fn create_client(&self, address: &str) -> Result<Box<dyn Line>, LineError> {
        let core = Arc::new(InprocCore::new(address));
        {
            let mut state = rendezvous_state();
            state.pending.push_back(Arc::downgrade(&core));
            RENDEZVOUS.wakeup.notify_all();
        }
        debug!(address, "in-process client awaiting pairing");

        let queues = core.wait_for_connection();
        Ok(Box::new(InprocLine {
            address: address.to_string(),
            queues,
            receive_timeout: None,
        }))
    }

    fn create_server(&self, address: &str) -> Result<Box<dyn Acceptor>, LineError> {
        Ok(Box::new(InprocAcceptor::bind(address, self.buffer_size)?))
    }
}
