use crate::codec::{Decode, Encode, Header, HEADER_LEN};

/// OpenFlow protocol version stamped on locally built frames.
pub const VERSION: u8 = 0x01;

/// Message-type opcodes, as carried in the fixed header.
pub mod kind {
  pub const HELLO: u8 = 0;
  pub const ERROR: u8 = 1;
  pub const ECHO_REQUEST: u8 = 2;
  pub const ECHO_REPLY: u8 = 3;
  pub const VENDOR: u8 = 4;
  pub const FEATURES_REQUEST: u8 = 5;
  pub const FEATURES_REPLY: u8 = 6;
  pub const GET_CONFIG_REQUEST: u8 = 7;
  pub const GET_CONFIG_REPLY: u8 = 8;
  pub const SET_CONFIG: u8 = 9;
  pub const PACKET_IN: u8 = 10;
  pub const FLOW_MOD: u8 = 14;
}

/// A single OpenFlow frame, owned.
///
/// The supervisor treats the payload as opaque; the only thing it ever
/// looks at is the fixed header, and of that mostly the message type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
  data: Vec<u8>,
}

impl Message {
  /// Wraps an already-encoded frame.
  pub fn from_vec(data: Vec<u8>) -> Self {
    Self { data }
  }

  /// Builds a frame from header fields and a body.
  ///
  /// # Panics
  /// If the frame would not fit the 64 KiB the length field can express.
  pub fn build(kind: u8, xid: u32, body: &[u8]) -> Self {
    let length = HEADER_LEN + body.len();
    if length > u16::MAX as usize {
      panic!("frame is too large");
    }
    let mut data = Vec::with_capacity(length);
    Header { version: VERSION, kind, length: length as u16, xid }.encode(&mut data);
    data.extend_from_slice(body);
    Self { data }
  }

  /// An inactivity probe: an echo request with an empty body.
  pub fn echo_request(xid: u32) -> Self {
    Self::build(kind::ECHO_REQUEST, xid, &[])
  }

  /// The fixed header, if the frame is long enough to carry one.
  pub fn header(&self) -> Option<Header> {
    Header::decode(&mut &self.data[..]).ok()
  }

  /// The message-type opcode, if the frame is long enough to carry one.
  pub fn kind(&self) -> Option<u8> {
    self.header().map(|h| h.kind)
  }

  #[inline]
  pub fn as_bytes(&self) -> &[u8] {
    &self.data
  }

  #[inline]
  pub fn len(&self) -> usize {
    self.data.len()
  }

  #[inline]
  pub fn is_empty(&self) -> bool {
    self.data.is_empty()
  }

  /// Whether receiving this message is evidence that the peer has admitted
  /// the connection for normal service.
  ///
  /// Control chatter every connection gets regardless (hello, errors,
  /// echoes, vendor extensions, the feature and config exchanges) proves
  /// nothing. Anything else only flows once the peer has decided to talk
  /// to us, including every opcode from 32 up.
  pub fn evidences_admission(&self) -> bool {
    const CONTROL_CHATTER: u32 = 1 << kind::HELLO
      | 1 << kind::ERROR
      | 1 << kind::ECHO_REQUEST
      | 1 << kind::ECHO_REPLY
      | 1 << kind::VENDOR
      | 1 << kind::FEATURES_REQUEST
      | 1 << kind::FEATURES_REPLY
      | 1 << kind::GET_CONFIG_REQUEST
      | 1 << kind::GET_CONFIG_REPLY
      | 1 << kind::SET_CONFIG;
    match self.kind() {
      Some(k) if (k as u32) < 32 => CONTROL_CHATTER & (1u32 << k) == 0,
      Some(_) => true,
      // too mangled to carry a header; proves nothing
      None => false,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use pretty_assertions::assert_eq;

  #[test]
  fn echo_request_is_well_formed() {
    let msg = Message::echo_request(42);
    let header = msg.header().unwrap();
    assert_eq!(header.version, VERSION);
    assert_eq!(header.kind, kind::ECHO_REQUEST);
    assert_eq!(header.length as usize, HEADER_LEN);
    assert_eq!(header.xid, 42);
    assert_eq!(msg.len(), HEADER_LEN);
  }

  #[test]
  fn control_chatter_is_not_admission_evidence() {
    for k in [
      kind::HELLO,
      kind::ERROR,
      kind::ECHO_REQUEST,
      kind::ECHO_REPLY,
      kind::VENDOR,
      kind::FEATURES_REQUEST,
      kind::FEATURES_REPLY,
      kind::GET_CONFIG_REQUEST,
      kind::GET_CONFIG_REPLY,
      kind::SET_CONFIG,
    ] {
      assert!(!Message::build(k, 0, &[]).evidences_admission(), "kind {k}");
    }
  }

  #[test]
  fn real_traffic_is_admission_evidence() {
    assert!(Message::build(kind::PACKET_IN, 0, &[]).evidences_admission());
    assert!(Message::build(kind::FLOW_MOD, 0, &[]).evidences_admission());
    // everything from 32 up counts, whatever it is
    assert!(Message::build(32, 0, &[]).evidences_admission());
    assert!(Message::build(200, 0, &[]).evidences_admission());
  }

  #[test]
  fn truncated_frame_proves_nothing() {
    let msg = Message::from_vec(vec![1, 2, 3]);
    assert_eq!(msg.kind(), None);
    assert!(!msg.evidences_admission());
  }
}
