//! Scripted stand-ins for the transport and the clock, shared with the
//! test through `Rc<RefCell<..>>` handles so behavior can be changed
//! mid-scenario while the session owns the objects themselves.

use crate::{
  clock::{Clock, Scheduler},
  message::Message,
  vconn::{Connector, Vconn},
};
use std::{
  cell::{Cell, RefCell},
  collections::VecDeque,
  io,
  net::IpAddr,
  rc::Rc,
  sync::Arc,
};

/// Test clock: starts at an arbitrary origin and moves only when told to.
pub(super) struct FakeClock {
  now: Cell<u64>,
}

impl FakeClock {
  pub fn new(origin: u64) -> Arc<Self> {
    Arc::new(Self { now: Cell::new(origin) })
  }

  pub fn advance(&self, secs: u64) {
    self.now.set(self.now.get() + secs);
  }
}

impl Clock for FakeClock {
  fn now(&self) -> u64 {
    self.now.get()
  }
}

/// One scripted outcome of a `Vconn::connect` call.
#[derive(Debug, Clone, Copy)]
pub(super) enum Step {
  Ready,
  Pending,
  Fail(io::ErrorKind),
}

/// The observable, scriptable state behind a [`FakeVconn`].
#[derive(Default)]
pub(super) struct Shared {
  /// Outcomes for upcoming `connect` calls, front first; empty means
  /// ready.
  pub connect_script: VecDeque<Step>,
  /// Frames waiting to be received.
  pub inbound: VecDeque<Message>,
  /// Every frame the session handed to this transport, in order.
  pub sent: Vec<Message>,
  /// While set, `send` reports busy instead of accepting.
  pub send_busy: bool,
  /// When set, the next `send` fails with this kind.
  pub send_fail: Option<io::ErrorKind>,
  /// When set, the next `recv` fails with this kind.
  pub recv_fail: Option<io::ErrorKind>,
  /// Set when the session dropped (closed) the transport.
  pub closed: bool,
}

pub(super) type Handle = Rc<RefCell<Shared>>;

pub(super) struct FakeVconn {
  name: String,
  shared: Handle,
}

impl FakeVconn {
  pub fn new(name: &str) -> (Box<dyn Vconn>, Handle) {
    let shared = Handle::default();
    let vconn = Self { name: name.to_owned(), shared: Rc::clone(&shared) };
    (Box::new(vconn), shared)
  }
}

impl Drop for FakeVconn {
  fn drop(&mut self) {
    self.shared.borrow_mut().closed = true;
  }
}

impl Vconn for FakeVconn {
  fn name(&self) -> &str {
    &self.name
  }

  fn connect(&mut self) -> io::Result<bool> {
    match self.shared.borrow_mut().connect_script.pop_front() {
      None | Some(Step::Ready) => Ok(true),
      Some(Step::Pending) => Ok(false),
      Some(Step::Fail(kind)) => Err(kind.into()),
    }
  }

  fn send(&mut self, msg: &Message) -> io::Result<bool> {
    let mut shared = self.shared.borrow_mut();
    if let Some(kind) = shared.send_fail.take() {
      return Err(kind.into());
    }
    if shared.send_busy {
      return Ok(false);
    }
    shared.sent.push(msg.clone());
    Ok(true)
  }

  fn recv(&mut self) -> io::Result<Option<Message>> {
    let mut shared = self.shared.borrow_mut();
    if let Some(kind) = shared.recv_fail.take() {
      return Err(kind.into());
    }
    Ok(shared.inbound.pop_front())
  }

  fn wait_send(&mut self, _scheduler: &mut dyn Scheduler) {}

  fn wait_recv(&mut self, _scheduler: &mut dyn Scheduler) {}

  fn local_ip(&self) -> Option<IpAddr> {
    Some([127, 0, 0, 1].into())
  }

  fn local_port(&self) -> Option<u16> {
    Some(45_000)
  }

  fn remote_ip(&self) -> Option<IpAddr> {
    Some([10, 0, 0, 1].into())
  }

  fn remote_port(&self) -> Option<u16> {
    Some(6633)
  }
}

/// What the fake connector has done and will do next.
#[derive(Default)]
pub(super) struct ConnectorState {
  /// Outcomes for upcoming `open` calls, front first; empty means
  /// success.
  pub open_script: VecDeque<Result<(), io::ErrorKind>>,
  /// Connect script installed into each transport as it is opened.
  pub connect_script: VecDeque<Step>,
  /// Handles of every transport opened so far, oldest first.
  pub opened: Vec<Handle>,
  /// Every name `open` was called with.
  pub names: Vec<String>,
}

pub(super) struct FakeConnector {
  inner: Rc<RefCell<ConnectorState>>,
}

impl FakeConnector {
  pub fn new() -> (Box<dyn Connector>, Rc<RefCell<ConnectorState>>) {
    let inner = Rc::new(RefCell::new(ConnectorState::default()));
    (Box::new(Self { inner: Rc::clone(&inner) }), inner)
  }
}

impl Connector for FakeConnector {
  fn open(&mut self, name: &str) -> io::Result<Box<dyn Vconn>> {
    let mut state = self.inner.borrow_mut();
    state.names.push(name.to_owned());
    if let Some(Err(kind)) = state.open_script.pop_front() {
      return Err(kind.into());
    }
    let (vconn, handle) = FakeVconn::new(name);
    handle.borrow_mut().connect_script = state.connect_script.clone();
    state.opened.push(handle);
    Ok(vconn)
  }
}
