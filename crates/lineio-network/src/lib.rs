//! OS-socket backends for the line transport abstraction: TCP
//! (`tcp://host:port`), Unix-domain sockets (`local:///path`), and a
//! readiness poller for endpoints with native handles.

mod poller;
mod tcp;
mod unix;

pub use poller::{LineEvents, Poller};
pub use tcp::{TcpAcceptor, TcpFactory, TcpLine};
pub use unix::{UnixAcceptor, UnixFactory, UnixLine};

use lineio::{InprocFactory, LineManager};

/// Manager with the default backend set registered in dispatch order:
/// in-process, Unix-domain sockets, TCP.
pub fn default_line_manager() -> LineManager {
    let mut manager = LineManager::new();
    manager.register_factory(Box::new(InprocFactory::new()));
    manager.register_factory(Box::new(UnixFactory));
    manager.register_factory(Box::new(TcpFactory));
    manager
}
