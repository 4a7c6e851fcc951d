use super::Session;
use crate::{
  counter::PacketCounter,
  error::{NotConnected, SendError},
  message::Message,
};
use std::sync::Arc;

impl Session {
  /// Queues `msg` for delivery. On success the session owns the message;
  /// when the session is not connected it comes back inside the error.
  ///
  /// A counter passed here is incremented now and decremented once the
  /// message is handed to the transport or discarded, so the caller can
  /// meter how much of its traffic is still in flight. Because of the
  /// inline send attempt below, the decrement may already have happened
  /// by the time this returns.
  pub fn send(
    &mut self,
    msg: Message,
    counter: Option<&Arc<PacketCounter>>,
  ) -> Result<(), NotConnected> {
    if !self.is_connected() {
      return Err(NotConnected(msg));
    }
    self.coverage.record_queued();
    self.monitors.broadcast(&msg);
    if let Some(counter) = counter {
      counter.inc();
    }
    let was_empty = self.txq.is_empty();
    self.txq.push(msg, counter.cloned());

    // If the queue was empty this might go straight out. If it was not,
    // the transport is backlogged and there is no point stuffing more at
    // it now; run() will get back to it.
    if was_empty {
      self.try_send();
    }
    Ok(())
  }

  /// Like [`send`](Session::send), but refuses when `counter` already has
  /// `limit` messages in flight. The message is consumed on every path.
  pub fn send_with_limit(
    &mut self,
    msg: Message,
    counter: &Arc<PacketCounter>,
    limit: usize,
  ) -> Result<(), SendError> {
    if counter.count() >= limit {
      self.coverage.record_overflow();
      return Err(SendError::QueueFull);
    }
    match self.send(msg, Some(counter)) {
      Ok(()) => Ok(()),
      Err(NotConnected(_)) => {
        self.coverage.record_overflow();
        Err(SendError::NotConnected)
      }
    }
  }

  /// Tries to push the queue head into the transport. Returns whether the
  /// caller may keep going: the head went out and the next may follow.
  pub(super) fn try_send(&mut self) -> bool {
    let result = match (self.vconn.as_mut(), self.txq.head()) {
      (Some(vconn), Some(queued)) => vconn.send(&queued.msg),
      _ => return false,
    };
    match result {
      Ok(true) => {
        self.coverage.record_sent();
        self.packets_sent += 1;
        if let Some(queued) = self.txq.pop() {
          if let Some(counter) = queued.counter {
            counter.dec();
          }
        }
        true
      }
      Ok(false) => false,
      Err(e) => {
        self.report_error(&e);
        self.drop_connection();
        false
      }
    }
  }

  /// Drains as much of the queue as the transport will take; if the queue
  /// runs dry, asks for an immediate re-wake so the caller can refill it.
  pub(super) fn do_tx_work(&mut self) {
    if self.txq.is_empty() {
      return;
    }
    while !self.txq.is_empty() {
      if !self.try_send() {
        break;
      }
    }
    if self.txq.is_empty() {
      self.immediate_wake = true;
    }
  }

  /// Drops every queued message, settling its counter.
  pub(super) fn flush_queue(&mut self) {
    if self.txq.is_empty() {
      return;
    }
    while let Some(queued) = self.txq.pop() {
      if let Some(counter) = queued.counter {
        counter.dec();
      }
      self.coverage.record_discarded();
    }
    self.immediate_wake = true;
  }
}
