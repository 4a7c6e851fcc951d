//! Keeps a long-lived OpenFlow session alive over a transport that isn't.
//!
//! A [`Session`] wraps one connection to a switch or controller: it
//! reconnects with exponential backoff when the transport dies, probes the
//! peer when traffic goes quiet, queues outbound messages while the
//! transport is backlogged, and mirrors everything to passive monitor
//! connections. The whole thing is cooperative: the embedding event loop
//! calls [`Session::run`] to make progress and [`Session::run_wait`] /
//! [`Session::recv_wait`] to learn when to call again.

pub mod clock;
pub mod codec;
pub mod counter;
pub mod coverage;
pub mod error;
pub mod message;
pub mod session;
pub mod tcp;
pub mod vconn;

mod queue;

pub use clock::{Clock, MonotonicClock, Scheduler, WakeTimer};
pub use counter::PacketCounter;
pub use coverage::Coverage;
pub use error::{NotConnected, SendError};
pub use message::Message;
pub use session::{Config, Session, Status};
pub use vconn::{Connector, Vconn};
