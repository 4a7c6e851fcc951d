use crate::{
  clock::Scheduler,
  codec::{Decode, Error as CodecError, Header, HEADER_LEN},
  message::Message,
  vconn::{Connector, Vconn},
};
use bytes::{Buf, BytesMut};
use log::trace;
use mio::{net::TcpStream, Interest, Registry, Token};
use std::{
  io::{self, Read, Write},
  net::{IpAddr, SocketAddr},
};

/// Default OpenFlow controller port, used when the target name omits one.
pub const DEFAULT_PORT: u16 = 6633;

const READ_CHUNK: usize = 4096;

/// Opens `tcp:` transports.
///
/// When built with a mio registry, every stream is registered for
/// readiness before being handed out, so the embedding poll loop hears
/// about I/O on it; [`Vconn::wait_send`] / [`Vconn::wait_recv`] are then
/// no-ops on these transports.
pub struct TcpConnector {
  registry: Option<Registry>,
  next_token: usize,
}

impl TcpConnector {
  pub fn new() -> Self {
    Self { registry: None, next_token: 0 }
  }

  /// Readiness events for opened streams will be delivered through
  /// `registry`'s poll, with tokens counting up from `first_token`.
  pub fn with_registry(registry: Registry, first_token: usize) -> Self {
    Self { registry: Some(registry), next_token: first_token }
  }
}

impl Default for TcpConnector {
  fn default() -> Self {
    Self::new()
  }
}

impl Connector for TcpConnector {
  fn open(&mut self, name: &str) -> io::Result<Box<dyn Vconn>> {
    let addr = parse_name(name)?;
    let mut stream = TcpStream::connect(addr)?;
    if let Some(registry) = &self.registry {
      let token = Token(self.next_token);
      self.next_token += 1;
      registry.register(&mut stream, token, Interest::READABLE | Interest::WRITABLE)?;
    }
    Ok(Box::new(TcpVconn {
      name: name.to_owned(),
      addr,
      stream,
      connected: false,
      peer_closed: false,
      rx: BytesMut::with_capacity(READ_CHUNK),
      tx: BytesMut::new(),
    }))
  }
}

fn parse_name(name: &str) -> io::Result<SocketAddr> {
  let rest = name.strip_prefix("tcp:").ok_or_else(|| {
    io::Error::new(
      io::ErrorKind::InvalidInput,
      format!("unsupported transport name: {name}"),
    )
  })?;
  if let Ok(addr) = rest.parse() {
    return Ok(addr);
  }
  let ip: IpAddr = rest.parse().map_err(|_| {
    io::Error::new(io::ErrorKind::InvalidInput, format!("bad address: {name}"))
  })?;
  Ok(SocketAddr::new(ip, DEFAULT_PORT))
}

/// An OpenFlow connection over non-blocking TCP, framed by the length
/// field of the fixed header.
pub struct TcpVconn {
  name: String,
  addr: SocketAddr,
  stream: TcpStream,
  connected: bool,
  peer_closed: bool,
  rx: BytesMut,
  tx: BytesMut,
}

impl TcpVconn {
  /// Writes as much of the backlog as the socket will take right now.
  fn flush_tx(&mut self) -> io::Result<()> {
    while !self.tx.is_empty() {
      match self.stream.write(&self.tx) {
        Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
        Ok(n) => self.tx.advance(n),
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
        Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
        Err(e) => return Err(e),
      }
    }
    Ok(())
  }

  /// Reads everything the socket has for us into the receive buffer.
  fn fill_rx(&mut self) -> io::Result<()> {
    let mut chunk = [0u8; READ_CHUNK];
    loop {
      match self.stream.read(&mut chunk) {
        Ok(0) => {
          self.peer_closed = true;
          break;
        }
        Ok(n) => self.rx.extend_from_slice(&chunk[..n]),
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
        Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
        Err(e) => return Err(e),
      }
    }
    Ok(())
  }

  /// Splits one complete frame off the receive buffer, if one is in there.
  fn take_frame(&mut self) -> io::Result<Option<Message>> {
    if self.rx.len() < HEADER_LEN {
      return Ok(None);
    }
    let header = match Header::decode(&mut &self.rx[..]) {
      Ok(header) => header,
      Err(CodecError::UnexpectedEof) => return Ok(None),
      Err(e) => return Err(io::Error::new(io::ErrorKind::InvalidData, e)),
    };
    let frame_len = header.length as usize;
    if self.rx.len() < frame_len {
      return Ok(None);
    }
    let frame = self.rx.split_to(frame_len);
    trace!("{}: received {} byte frame", self.name, frame_len);
    Ok(Some(Message::from_vec(frame.to_vec())))
  }
}

impl Vconn for TcpVconn {
  fn name(&self) -> &str {
    &self.name
  }

  fn connect(&mut self) -> io::Result<bool> {
    if self.connected {
      return Ok(true);
    }
    if let Some(e) = self.stream.take_error()? {
      return Err(e);
    }
    match self.stream.peer_addr() {
      Ok(_) => {
        self.connected = true;
        Ok(true)
      }
      Err(e)
        if e.kind() == io::ErrorKind::NotConnected
          || e.kind() == io::ErrorKind::WouldBlock =>
      {
        Ok(false)
      }
      Err(e) => Err(e),
    }
  }

  fn send(&mut self, msg: &Message) -> io::Result<bool> {
    self.flush_tx()?;
    if !self.tx.is_empty() {
      // a previous frame is still stuck in the pipe
      return Ok(false);
    }
    self.tx.extend_from_slice(msg.as_bytes());
    self.flush_tx()?;
    Ok(true)
  }

  fn recv(&mut self) -> io::Result<Option<Message>> {
    if let Some(msg) = self.take_frame()? {
      return Ok(Some(msg));
    }
    self.fill_rx()?;
    if let Some(msg) = self.take_frame()? {
      return Ok(Some(msg));
    }
    if self.peer_closed {
      return Err(io::ErrorKind::UnexpectedEof.into());
    }
    Ok(None)
  }

  fn wait_send(&mut self, _scheduler: &mut dyn Scheduler) {
    // readiness arrives through the registry the stream was opened with
  }

  fn wait_recv(&mut self, _scheduler: &mut dyn Scheduler) {
    // readiness arrives through the registry the stream was opened with
  }

  fn local_ip(&self) -> Option<IpAddr> {
    self.stream.local_addr().ok().map(|a| a.ip())
  }

  fn local_port(&self) -> Option<u16> {
    self.stream.local_addr().ok().map(|a| a.port())
  }

  fn remote_ip(&self) -> Option<IpAddr> {
    Some(self.addr.ip())
  }

  fn remote_port(&self) -> Option<u16> {
    Some(self.addr.port())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::message::kind;
  use pretty_assertions::assert_eq;
  use std::{net::TcpListener, thread::sleep, time::Duration};

  fn wait_until_connected(vconn: &mut Box<dyn Vconn>) {
    for _ in 0..500 {
      if vconn.connect().unwrap() {
        return;
      }
      sleep(Duration::from_millis(10));
    }
    panic!("transport never became ready");
  }

  #[test]
  fn parse_names() {
    assert_eq!(
      parse_name("tcp:127.0.0.1:6633").unwrap(),
      "127.0.0.1:6633".parse().unwrap()
    );
    // the default controller port fills in
    assert_eq!(
      parse_name("tcp:10.0.0.1").unwrap(),
      "10.0.0.1:6633".parse().unwrap()
    );
    assert!(parse_name("unix:/tmp/sock").is_err());
    assert!(parse_name("tcp:not-an-ip").is_err());
  }

  #[test]
  fn frames_cross_a_loopback_connection() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let mut connector = TcpConnector::new();
    let mut vconn = connector.open(&format!("tcp:{addr}")).unwrap();
    let (mut peer, _) = listener.accept().unwrap();
    wait_until_connected(&mut vconn);

    assert_eq!(vconn.remote_port(), Some(addr.port()));
    assert!(vconn.local_port().is_some());

    // outbound: one echo request, verifiable byte for byte on the far side
    assert!(vconn.send(&Message::echo_request(7)).unwrap());
    let mut buf = [0u8; HEADER_LEN];
    peer.read_exact(&mut buf).unwrap();
    assert_eq!(&buf[..], Message::echo_request(7).as_bytes());

    // inbound: a hello split across two writes still frames correctly
    let hello = Message::build(kind::HELLO, 1, &[0xab; 4]);
    peer.write_all(&hello.as_bytes()[..5]).unwrap();
    peer.flush().unwrap();
    sleep(Duration::from_millis(20));
    assert!(vconn.recv().unwrap().is_none());
    peer.write_all(&hello.as_bytes()[5..]).unwrap();
    peer.flush().unwrap();

    let got = loop {
      if let Some(msg) = vconn.recv().unwrap() {
        break msg;
      }
      sleep(Duration::from_millis(10));
    };
    assert_eq!(got, hello);

    // the peer hanging up surfaces as a clean close
    drop(peer);
    let err = loop {
      match vconn.recv() {
        Ok(None) => sleep(Duration::from_millis(10)),
        Ok(Some(_)) => panic!("no more frames expected"),
        Err(e) => break e,
      }
    };
    assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
  }
}
