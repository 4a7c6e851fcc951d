use crate::message::Message;
use thiserror::Error;

/// Rejection from `Session::send`: the session is not connected, and the
/// message comes back to the caller untouched.
#[derive(Debug, Error)]
#[error("session is not connected")]
pub struct NotConnected(pub Message);

/// Rejection from `Session::send_with_limit`. Unlike [`NotConnected`],
/// the message is consumed no matter which way the call went.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SendError {
  #[error("session is not connected")]
  NotConnected,
  #[error("packet counter is at its queue limit")]
  QueueFull,
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::message::kind;
  use pretty_assertions::assert_eq;

  #[test]
  fn rejection_hands_the_message_back() {
    let msg = Message::build(kind::HELLO, 3, &[]);
    let err = NotConnected(msg.clone());
    assert_eq!(err.to_string(), "session is not connected");
    assert_eq!(err.0, msg);
  }
}
