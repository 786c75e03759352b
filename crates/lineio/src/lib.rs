//! Uniform byte-stream endpoints ("lines") over interchangeable transport
//! backends, with a framed message protocol layered on top.
//!
//! A [`LineManager`] dispatches `scheme://address` endpoints to registered
//! [`LineFactory`] backends. Every backend yields the same two capabilities:
//! a connected [`Line`] carrying raw bytes, and an [`Acceptor`] producing
//! server-side lines for incoming connections. [`MessageProtocol`] turns any
//! line into a stream of multi-frame [`Message`]s.
//!
//! This crate ships the in-process backend (`inproc://label`): two
//! single-producer/single-consumer byte rings per connection, shared
//! crosswise between the peers, with a process-wide rendezvous matching
//! clients to acceptors by address. Socket backends live in the companion
//! network crate.

mod error;
pub mod inproc;
mod line;
mod manager;
mod message;
mod protocol;

pub use error::LineError;
pub use inproc::{DEFAULT_BUFFER_SIZE, InprocAcceptor, InprocFactory, InprocLine};
pub use line::{Acceptor, Line, LineFactory, LineOption, Pollable};
pub use manager::LineManager;
pub use message::{Frame, Message};
pub use protocol::MessageProtocol;
pub use tracing;
