use super::{Session, State, ADMISSION_GRACE};
use crate::message::Message;

impl Session {
  /// Pulls one inbound message, if the transport has one ready.
  ///
  /// Any transport failure is absorbed here: the session disconnects (and
  /// reconnects, if reliable) and the caller simply sees no message.
  pub fn recv(&mut self) -> Option<Message> {
    if !self.is_connected() {
      return None;
    }
    let result = match self.vconn.as_mut() {
      Some(vconn) => vconn.recv(),
      None => return None,
    };
    match result {
      Ok(Some(msg)) => {
        self.monitors.broadcast(&msg);
        self.note_admission_evidence(&msg);
        self.last_received = self.now();
        self.packets_received += 1;
        if self.state == State::Idle {
          // the peer spoke; the outstanding probe is answered as far as
          // we care
          self.transition(State::Active);
        }
        Some(msg)
      }
      Ok(None) => None,
      Err(e) => {
        self.report_error(&e);
        self.drop_connection();
        None
      }
    }
  }

  /// The admission heuristic: control chatter proves nothing, real
  /// traffic does, and a peer that has tolerated us for a while is
  /// assumed to have let us in.
  fn note_admission_evidence(&mut self, msg: &Message) {
    let now = self.now();
    if self.probably_admitted
      || msg.evidences_admission()
      || now.saturating_sub(self.last_connected) >= ADMISSION_GRACE
    {
      self.probably_admitted = true;
      self.last_admitted = now;
    }
  }
}
