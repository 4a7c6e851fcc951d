use {
  bytes::{Buf, BufMut},
  thiserror::Error,
};

#[derive(Debug, Clone, Error)]
pub enum Error {
  #[error("unexpected end of input")]
  UnexpectedEof,
  #[error("declared frame length {0} is shorter than the fixed header")]
  BadLength(u16),
}

pub type Result<T> = std::result::Result<T, Error>;

pub trait Encode: Sized {
  /// Encode a value of `Self` into `buf`.
  fn encode<B: BufMut>(&self, buf: &mut B);
}

pub trait Decode: Sized {
  /// Decode a value of `Self` from `buf`.
  fn decode<B: Buf>(buf: &mut B) -> Result<Self>;
}

/// Size of the fixed header in bytes.
pub const HEADER_LEN: usize = 8;

/// The fixed header every OpenFlow frame starts with.
///
/// `length` covers the whole frame, header included, which is also how
/// frames are delimited on a stream transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
  pub version: u8,
  pub kind: u8,
  pub length: u16,
  pub xid: u32,
}

impl Encode for Header {
  fn encode<B: BufMut>(&self, buf: &mut B) {
    buf.put_u8(self.version);
    buf.put_u8(self.kind);
    buf.put_u16(self.length);
    buf.put_u32(self.xid);
  }
}

impl Decode for Header {
  fn decode<B: Buf>(buf: &mut B) -> Result<Self> {
    if buf.remaining() < HEADER_LEN {
      return Err(Error::UnexpectedEof);
    }
    let version = buf.get_u8();
    let kind = buf.get_u8();
    let length = buf.get_u16();
    let xid = buf.get_u32();
    if (length as usize) < HEADER_LEN {
      return Err(Error::BadLength(length));
    }
    Ok(Self { version, kind, length, xid })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use pretty_assertions::assert_eq;

  #[test]
  fn header_round_trip() {
    let header = Header { version: 1, kind: 10, length: 24, xid: 0xdeadbeef };
    let mut buf = Vec::new();
    header.encode(&mut buf);
    assert_eq!(buf.len(), HEADER_LEN);
    assert_eq!(Header::decode(&mut &buf[..]).unwrap(), header);
  }

  #[test]
  fn short_input() {
    let buf = [1u8, 2, 0];
    assert!(matches!(
      Header::decode(&mut &buf[..]),
      Err(Error::UnexpectedEof)
    ));
  }

  #[test]
  fn length_must_cover_the_header() {
    // a frame can never be shorter than its own header
    let buf = [1u8, 2, 0, 7, 0, 0, 0, 0];
    assert!(matches!(
      Header::decode(&mut &buf[..]),
      Err(Error::BadLength(7))
    ));
  }
}
