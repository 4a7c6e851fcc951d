use crate::{clock::Scheduler, message::Message};
use std::{io, net::IpAddr};

/// A byte-level transport carrying OpenFlow frames.
///
/// Everything here is non-blocking. An operation that cannot make progress
/// right now says so instead of blocking: `connect` and `send` return
/// `Ok(false)`, `recv` returns `Ok(None)`. Implementations map a raw
/// `io::ErrorKind::WouldBlock` into those forms rather than letting it
/// escape. Any error that does come out of these methods is fatal to the
/// transport, with `io::ErrorKind::UnexpectedEof` standing for a clean
/// close by the peer.
pub trait Vconn {
  /// The address this transport was opened against.
  fn name(&self) -> &str;

  /// Drives the asynchronous connection attempt; `Ok(true)` once the
  /// transport is ready to carry traffic.
  fn connect(&mut self) -> io::Result<bool>;

  /// Hands one frame to the transport. `Ok(true)` means the transport has
  /// taken it and owns delivery from here; `Ok(false)` means it cannot
  /// take a frame right now and the caller should retry later.
  fn send(&mut self, msg: &Message) -> io::Result<bool>;

  /// Pulls one frame out of the transport, `Ok(None)` if nothing is ready.
  fn recv(&mut self) -> io::Result<Option<Message>>;

  /// Registers a wake-up for when `send` may make progress again.
  fn wait_send(&mut self, scheduler: &mut dyn Scheduler);

  /// Registers a wake-up for when `recv` may make progress again.
  fn wait_recv(&mut self, scheduler: &mut dyn Scheduler);

  /// Local address of the transport, once known.
  fn local_ip(&self) -> Option<IpAddr>;

  /// Local port of the transport, once known.
  fn local_port(&self) -> Option<u16>;

  /// Address of the peer, once known.
  fn remote_ip(&self) -> Option<IpAddr>;

  /// Port of the peer, once known.
  fn remote_port(&self) -> Option<u16>;
}

/// Opens transports by name, e.g. `"tcp:127.0.0.1:6633"`.
pub trait Connector {
  /// Starts opening a connection to `name`. The returned transport is not
  /// ready yet; drive [`Vconn::connect`] until it reports so.
  fn open(&mut self, name: &str) -> io::Result<Box<dyn Vconn>>;
}
