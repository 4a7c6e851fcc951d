mod monitor;
mod recv;
mod send;

#[cfg(test)]
mod fake;

use crate::{
  clock::{Clock, MonotonicClock, Scheduler},
  coverage::Coverage,
  message::Message,
  queue::TxQueue,
  vconn::{Connector, Vconn},
};
use log::{debug, error, info, warn};
use monitor::MonitorSet;
pub use monitor::MAX_MONITORS;
use rand::{rngs::SmallRng, Rng, SeedableRng};
use serde::Serialize;
use std::{io, net::IpAddr, sync::Arc};

/// Name reported while no target is configured.
const VOID_NAME: &str = "void";

/// Default cap on the reconnect backoff, seconds.
pub const DEFAULT_MAX_BACKOFF: u64 = 8;

/// Shortest usable inactivity-probe interval, seconds.
pub const MIN_PROBE_INTERVAL: u64 = 5;

/// Minimum spacing of questionable-connectivity reports, and the session
/// length below which losing a connection makes connectivity questionable.
const QUESTION_INTERVAL: u64 = 60;

/// How long the peer must tolerate us before mere silence counts as an
/// admission decision.
const ADMISSION_GRACE: u64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
  /// Parked: no target, no transport, no timer.
  Void,
  /// Waiting out the backoff delay before the next attempt.
  Backoff,
  /// Transport exists but is not ready yet.
  Connecting,
  /// Connected and hearing from the peer.
  Active,
  /// Connected, but an inactivity probe is outstanding.
  Idle,
}

impl State {
  fn name(self) -> &'static str {
    match self {
      State::Void => "VOID",
      State::Backoff => "BACKOFF",
      State::Connecting => "CONNECTING",
      State::Active => "ACTIVE",
      State::Idle => "IDLE",
    }
  }

  /// ACTIVE and IDLE are the states with a usable transport.
  fn is_connected(self) -> bool {
    matches!(self, State::Active | State::Idle)
  }
}

/// Tunables for a [`Session`].
#[derive(Debug, Clone, Copy)]
pub struct Config {
  /// Seconds of silence before an echo request goes out, and again before
  /// the peer is given up on. 0 disables probing; nonzero values below 5
  /// are raised to 5.
  pub probe_interval: u64,
  /// Cap on the reconnect backoff, seconds. 0 means the default of 8.
  pub max_backoff: u64,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      probe_interval: 60,
      max_backoff: DEFAULT_MAX_BACKOFF,
    }
  }
}

/// A supervised session with a remote OpenFlow peer.
///
/// The session is cooperative and single-threaded: the owner drives it by
/// calling [`run`](Session::run) whenever the wake-ups registered through
/// [`run_wait`](Session::run_wait) fire, and talks to the peer through
/// [`send`](Session::send) and [`recv`](Session::recv). Transport failures
/// never surface from those calls; a *reliable* session absorbs them into
/// a backed-off reconnect loop, an unreliable one parks itself, and either
/// way the caller observes the difference through the status accessors.
pub struct Session {
  state: State,
  state_entered: u64,

  vconn: Option<Box<dyn Vconn>>,
  name: String,
  reliable: bool,

  txq: TxQueue,

  backoff: u64,
  max_backoff: u64,
  /// Failing before this instant escalates the backoff; failing after it
  /// resets the backoff to one second. `u64::MAX` is the "never reset"
  /// sentinel installed when an attempt dies without ever connecting.
  backoff_deadline: u64,
  probe_interval: u64,

  last_received: u64,
  last_connected: u64,

  probably_admitted: bool,
  last_admitted: u64,

  packets_sent: u64,
  packets_received: u64,
  attempted_connections: u64,
  successful_connections: u64,
  creation_time: u64,
  total_time_connected: u64,
  /// Ticks every time the session crosses the connected/disconnected
  /// boundary, so observers can tell one incarnation from the next.
  seqno: u64,

  questionable_connectivity: bool,
  last_questioned: Option<u64>,

  // endpoint info outlives the transport it was learned from, so upper
  // layers can keep acting on it between attempts
  local_ip: Option<IpAddr>,
  remote_ip: Option<IpAddr>,
  remote_port: Option<u16>,

  monitors: MonitorSet,

  connector: Option<Box<dyn Connector>>,
  clock: Arc<dyn Clock>,
  coverage: Arc<Coverage>,
  rng: SmallRng,
  immediate_wake: bool,
}

impl Session {
  /// Builds a session in the parked state; point it somewhere with
  /// [`connect`](Session::connect).
  pub fn new(config: Config, connector: Box<dyn Connector>) -> Self {
    Self::with_clock(config, connector, Arc::new(MonotonicClock::new()))
  }

  /// Builds a session on an explicit clock. The session never reads
  /// ambient time, so substituting a clock puts every timeout under the
  /// caller's control.
  pub fn with_clock(
    config: Config,
    connector: Box<dyn Connector>,
    clock: Arc<dyn Clock>,
  ) -> Self {
    Self::build(config, Some(connector), clock)
  }

  /// Creates a session and starts connecting it reliably to `name`.
  pub fn open(name: &str, config: Config, connector: Box<dyn Connector>) -> Self {
    let mut session = Self::new(config, connector);
    session.connect(name);
    session
  }

  /// Adopts an already-open transport, typically one that was accepted
  /// rather than dialed. The session will not reconnect when it fails.
  pub fn from_vconn(name: &str, vconn: Box<dyn Vconn>) -> Self {
    let config = Config { probe_interval: 60, max_backoff: 0 };
    let mut session = Self::build(config, None, Arc::new(MonotonicClock::new()));
    session.connect_unreliably(name, vconn);
    session
  }

  fn build(
    config: Config,
    connector: Option<Box<dyn Connector>>,
    clock: Arc<dyn Clock>,
  ) -> Self {
    let now = clock.now();
    let mut session = Self {
      state: State::Void,
      state_entered: now,
      vconn: None,
      name: VOID_NAME.to_owned(),
      reliable: false,
      txq: TxQueue::new(),
      backoff: 0,
      max_backoff: if config.max_backoff == 0 {
        DEFAULT_MAX_BACKOFF
      } else {
        config.max_backoff
      },
      backoff_deadline: 0,
      probe_interval: 0,
      last_received: now,
      last_connected: now,
      probably_admitted: false,
      last_admitted: now,
      packets_sent: 0,
      packets_received: 0,
      attempted_connections: 0,
      successful_connections: 0,
      creation_time: now,
      total_time_connected: 0,
      seqno: 0,
      questionable_connectivity: false,
      last_questioned: None,
      local_ip: None,
      remote_ip: None,
      remote_port: None,
      monitors: MonitorSet::new(),
      connector,
      clock,
      coverage: Arc::new(Coverage::default()),
      rng: SmallRng::from_entropy(),
      immediate_wake: false,
    };
    session.set_probe_interval(config.probe_interval);
    session
  }

  /// Points the session at `name` and starts connecting reliably: from
  /// now on, every failure is followed by a backed-off reconnect attempt.
  pub fn connect(&mut self, name: &str) {
    self.disconnect();
    self.set_name(name);
    self.reliable = true;
    self.start_connecting();
  }

  /// Adopts `vconn` as an unreliable connection to `name`: when it fails,
  /// the session parks itself instead of reconnecting.
  pub fn connect_unreliably(&mut self, name: &str, vconn: Box<dyn Vconn>) {
    self.disconnect();
    self.set_name(name);
    self.reliable = false;
    self.vconn = Some(vconn);
    self.last_connected = self.now();
    self.transition(State::Active);
  }

  /// If connected, drops the transport and lets the reconnect machinery
  /// take it from there.
  pub fn reconnect(&mut self) {
    if self.state.is_connected() {
      info!("{}: disconnecting", self.name);
      self.drop_connection();
    }
  }

  /// Drops everything and parks the session; it stays parked until
  /// pointed somewhere again.
  pub fn disconnect(&mut self) {
    if self.state != State::Void {
      if self.vconn.is_some() {
        self.vconn = None;
        self.flush_queue();
      }
      self.set_name(VOID_NAME);
      self.reliable = false;
      self.backoff = 0;
      self.backoff_deadline = 0;
      self.transition(State::Void);
    }
  }

  /// Makes whatever progress the current state allows: reconnecting if
  /// disconnected, draining the send queue if connected. Loops until the
  /// state stops changing, so one call rides out a whole cascade (say
  /// BACKOFF through CONNECTING into ACTIVE after a long sleep).
  pub fn run(&mut self) {
    loop {
      let entered = self.state;
      match self.state {
        State::Void => {}
        State::Backoff => self.run_backoff(),
        State::Connecting => self.run_connecting(),
        State::Active => self.run_active(),
        State::Idle => self.run_idle(),
      }
      if self.state == entered {
        break;
      }
    }
  }

  /// Registers the wake-ups under which [`run`](Session::run) next needs
  /// to be called.
  pub fn run_wait(&mut self, scheduler: &mut dyn Scheduler) {
    if self.immediate_wake {
      self.immediate_wake = false;
      scheduler.wake_now();
    }
    let timeout = self.timeout();
    if timeout != u64::MAX {
      let expires = self.state_entered.saturating_add(timeout);
      scheduler.wake_after(expires.saturating_sub(self.now()));
    }
    if self.state.is_connected() && !self.txq.is_empty() {
      if let Some(vconn) = self.vconn.as_mut() {
        vconn.wait_send(scheduler);
      }
    }
  }

  /// Registers a wake-up for inbound traffic.
  pub fn recv_wait(&mut self, scheduler: &mut dyn Scheduler) {
    if let Some(vconn) = self.vconn.as_mut() {
      vconn.wait_recv(scheduler);
    }
  }

  /// Hands `vconn` over as a monitor: a passive connection that receives
  /// a copy of every message sent or received from now on. Over capacity,
  /// the handle is closed on the spot.
  pub fn add_monitor(&mut self, vconn: Box<dyn Vconn>) {
    self.monitors.add(vconn);
  }

  fn run_backoff(&mut self) {
    if self.timed_out() {
      self.start_connecting();
    }
  }

  fn run_connecting(&mut self) {
    let progress = match self.vconn.as_mut() {
      Some(vconn) => vconn.connect(),
      None => return,
    };
    match progress {
      Ok(true) => {
        info!("{}: connected", self.name);
        self.successful_connections += 1;
        self.transition(State::Active);
        self.last_connected = self.state_entered;
      }
      Ok(false) => {
        if self.timed_out() {
          info!("{}: connection timed out", self.name);
          self.backoff_deadline = u64::MAX; // this failure escalates, never resets
          self.drop_connection();
        }
      }
      Err(e) => {
        info!("{}: connection failed ({e})", self.name);
        self.drop_connection();
      }
    }
  }

  fn run_active(&mut self) {
    if self.timed_out() {
      let base = self.last_received.max(self.state_entered);
      debug!(
        "{}: idle {} seconds, sending inactivity probe",
        self.name,
        self.now().saturating_sub(base)
      );

      // Ordering matters here: the send below may itself drop the
      // connection and land in BACKOFF, and IDLE must never be entered
      // on top of that, because IDLE has a transport by definition.
      self.transition(State::Idle);
      let xid = self.rng.gen();
      let _ = self.send(Message::echo_request(xid), None);
      return;
    }

    self.do_tx_work();
  }

  fn run_idle(&mut self) {
    if self.timed_out() {
      self.question_connectivity();
      error!(
        "{}: no response to inactivity probe after {} seconds, disconnecting",
        self.name,
        self.elapsed_in_state()
      );
      self.drop_connection();
    } else {
      self.do_tx_work();
    }
  }

  /// Opens a fresh transport toward the current target.
  fn start_connecting(&mut self) {
    info!("{}: connecting...", self.name);
    self.attempted_connections += 1;
    let result = match self.connector.as_mut() {
      Some(connector) => connector.open(&self.name),
      None => Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "session has no connector",
      )),
    };
    match result {
      Ok(vconn) => {
        self.local_ip = vconn.local_ip();
        self.remote_ip = vconn.remote_ip();
        self.remote_port = vconn.remote_port();
        self.vconn = Some(vconn);
        self.backoff_deadline = self.now().saturating_add(self.backoff);
        self.transition(State::Connecting);
      }
      Err(e) => {
        warn!("{}: connection failed ({e})", self.name);
        self.backoff_deadline = u64::MAX; // this failure escalates, never resets
        self.drop_connection();
      }
    }
  }

  /// Takes the connection down after a failure. Reliable sessions move to
  /// BACKOFF with an updated delay; unreliable ones park in VOID.
  fn drop_connection(&mut self) {
    if self.reliable {
      let now = self.now();
      if self.vconn.is_some() {
        self.vconn = None;
        self.flush_queue();
      }
      if now >= self.backoff_deadline {
        self.backoff = 1;
      } else {
        self.backoff = self.backoff.saturating_mul(2).clamp(1, self.max_backoff);
        info!(
          "{}: waiting {} seconds before reconnect",
          self.name, self.backoff
        );
      }
      self.backoff_deadline = now.saturating_add(self.backoff);
      self.transition(State::Backoff);
      if now.saturating_sub(self.last_connected) > QUESTION_INTERVAL {
        self.question_connectivity();
      }
    } else {
      self.disconnect();
    }
  }

  fn transition(&mut self, state: State) {
    if (self.state == State::Active) != (state == State::Active) {
      self.seqno += 1;
    }
    if state.is_connected() && !self.state.is_connected() {
      // a fresh connection starts with a blank admission record
      self.probably_admitted = false;
    }
    if self.state.is_connected() {
      self.total_time_connected += self.elapsed_in_state();
    }
    debug_assert_eq!(
      matches!(state, State::Connecting | State::Active | State::Idle),
      self.vconn.is_some(),
      "transport presence must match the state being entered"
    );
    debug!("{}: entering {}", self.name, state.name());
    self.state = state;
    self.state_entered = self.now();
  }

  /// Seconds until the current state gives up, measured from its entry;
  /// `u64::MAX` means it never does.
  fn timeout(&self) -> u64 {
    match self.state {
      State::Void => u64::MAX,
      State::Backoff => self.backoff,
      State::Connecting => self.backoff.max(1),
      State::Active => {
        if self.probe_interval == 0 {
          return u64::MAX;
        }
        let base = self.last_received.max(self.state_entered);
        base
          .saturating_add(self.probe_interval)
          .saturating_sub(self.state_entered)
      }
      State::Idle => self.probe_interval,
    }
  }

  fn timed_out(&self) -> bool {
    self.now() >= self.state_entered.saturating_add(self.timeout())
  }

  fn elapsed_in_state(&self) -> u64 {
    self.now().saturating_sub(self.state_entered)
  }

  fn set_name(&mut self, name: &str) {
    // a new target invalidates whatever endpoint info we had cached
    self.name = name.to_owned();
    self.local_ip = None;
    self.remote_ip = None;
    self.remote_port = None;
  }

  fn question_connectivity(&mut self) {
    let now = self.now();
    let spaced = match self.last_questioned {
      Some(last) => now.saturating_sub(last) > QUESTION_INTERVAL,
      None => true,
    };
    if spaced {
      self.questionable_connectivity = true;
      self.last_questioned = Some(now);
    }
  }

  fn report_error(&self, error: &io::Error) {
    if error.kind() == io::ErrorKind::UnexpectedEof {
      // an unreliable session is usually one we accepted; its peer
      // hanging up is unremarkable
      if self.reliable {
        info!("{}: connection closed by peer", self.name);
      } else {
        debug!("{}: connection closed by peer", self.name);
      }
    } else {
      warn!("{}: connection dropped ({error})", self.name);
    }
  }

  fn now(&self) -> u64 {
    self.clock.now()
  }

  /// The target address, or `"void"` while parked.
  pub fn name(&self) -> &str {
    &self.name
  }

  /// True unless the session is parked: connected, or at least working
  /// on it.
  pub fn is_alive(&self) -> bool {
    self.state != State::Void
  }

  pub fn is_connected(&self) -> bool {
    self.state.is_connected()
  }

  /// Whether the peer is believed to have accepted this connection for
  /// normal service (as opposed to merely speaking protocol at us).
  pub fn is_admitted(&self) -> bool {
    self.is_connected() && self.last_admitted >= self.last_connected
  }

  /// 0 while admitted, otherwise seconds since admission was last
  /// believed. Upper layers use this to decide when to fail open.
  pub fn failure_duration(&self) -> u64 {
    if self.is_admitted() {
      0
    } else {
      self.now().saturating_sub(self.last_admitted)
    }
  }

  /// Reports whether the network surroundings deserve a second look (the
  /// kind of repeated failure a topology change would produce), clearing
  /// the signal in the process.
  pub fn is_connectivity_questionable(&mut self) -> bool {
    std::mem::take(&mut self.questionable_connectivity)
  }

  /// IP this end connected from, surviving past the transport itself.
  pub fn local_ip(&self) -> Option<IpAddr> {
    self.local_ip
  }

  /// Local port of the live transport; gone as soon as the transport is.
  pub fn local_port(&self) -> Option<u16> {
    self.vconn.as_ref().and_then(|v| v.local_port())
  }

  /// Peer IP, surviving past the transport itself.
  pub fn remote_ip(&self) -> Option<IpAddr> {
    self.remote_ip
  }

  /// Peer port, surviving past the transport itself.
  pub fn remote_port(&self) -> Option<u16> {
    self.remote_port
  }

  /// Messages the transport has accepted, over the session's lifetime.
  /// Queued messages are not counted until then.
  pub fn packets_sent(&self) -> u64 {
    self.packets_sent
  }

  /// Messages received, over the session's lifetime.
  pub fn packets_received(&self) -> u64 {
    self.packets_received
  }

  /// Connection attempts made, including one still in progress.
  pub fn attempted_connections(&self) -> u64 {
    self.attempted_connections
  }

  pub fn successful_connections(&self) -> u64 {
    self.successful_connections
  }

  pub fn state_name(&self) -> &'static str {
    self.state.name()
  }

  /// Seconds spent in the current state so far.
  pub fn state_elapsed(&self) -> u64 {
    self.elapsed_in_state()
  }

  /// When the last successful connection was made.
  pub fn last_connected(&self) -> u64 {
    self.last_connected
  }

  /// When the last message arrived; creation time if none ever has.
  pub fn last_received(&self) -> u64 {
    self.last_received
  }

  pub fn creation_time(&self) -> u64 {
    self.creation_time
  }

  /// Total seconds spent connected, including the current stretch.
  pub fn total_time_connected(&self) -> u64 {
    self.total_time_connected
      + if self.is_connected() {
        self.elapsed_in_state()
      } else {
        0
      }
  }

  /// Current backoff delay: how long BACKOFF waits before reconnecting.
  pub fn backoff(&self) -> u64 {
    self.backoff
  }

  pub fn max_backoff(&self) -> u64 {
    self.max_backoff
  }

  /// Raises or lowers the backoff cap; a backoff already in progress
  /// shrinks to fit a lowered cap.
  pub fn set_max_backoff(&mut self, max_backoff: u64) {
    self.max_backoff = max_backoff.max(1);
    if self.state == State::Backoff && self.backoff > self.max_backoff {
      self.backoff = self.max_backoff;
      let deadline = self.now().saturating_add(self.max_backoff);
      if self.backoff_deadline > deadline {
        self.backoff_deadline = deadline;
      }
    }
  }

  pub fn probe_interval(&self) -> u64 {
    self.probe_interval
  }

  pub fn set_probe_interval(&mut self, probe_interval: u64) {
    self.probe_interval = if probe_interval == 0 {
      0
    } else {
      probe_interval.max(MIN_PROBE_INTERVAL)
    };
  }

  /// Connection sequence number; changes every time the session connects
  /// or disconnects.
  pub fn seqno(&self) -> u64 {
    self.seqno
  }

  /// The event-counter sink this session reports into.
  pub fn coverage(&self) -> Arc<Coverage> {
    Arc::clone(&self.coverage)
  }

  /// A point-in-time snapshot of the session, for telemetry export.
  pub fn status(&self) -> Status {
    Status {
      name: self.name.clone(),
      state: self.state.name(),
      state_elapsed: self.elapsed_in_state(),
      is_connected: self.is_connected(),
      is_admitted: self.is_admitted(),
      backoff: self.backoff,
      packets_sent: self.packets_sent,
      packets_received: self.packets_received,
      tx_backlog: self.txq.len(),
      attempted_connections: self.attempted_connections,
      successful_connections: self.successful_connections,
      total_time_connected: self.total_time_connected(),
      seqno: self.seqno,
      local_ip: self.local_ip,
      remote_ip: self.remote_ip,
      remote_port: self.remote_port,
    }
  }
}

impl Drop for Session {
  fn drop(&mut self) {
    // every queued message still owes its counter a decrement
    self.flush_queue();
  }
}

/// A point-in-time view of a [`Session`].
#[derive(Debug, Clone, Serialize)]
pub struct Status {
  pub name: String,
  pub state: &'static str,
  pub state_elapsed: u64,
  pub is_connected: bool,
  pub is_admitted: bool,
  pub backoff: u64,
  pub packets_sent: u64,
  pub packets_received: u64,
  /// Messages queued but not yet taken by the transport.
  pub tx_backlog: usize,
  pub attempted_connections: u64,
  pub successful_connections: u64,
  pub total_time_connected: u64,
  pub seqno: u64,
  pub local_ip: Option<IpAddr>,
  pub remote_ip: Option<IpAddr>,
  pub remote_port: Option<u16>,
}
