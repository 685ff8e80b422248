//! Minimal length-prefixed TCP message transport.
//!
//! The reference bus for running the two processes against each other:
//! each message is a 4-byte little-endian length followed by the payload.
//! Point-to-point; anything fancier (fan-out, reconnects) belongs to an
//! external transport.

use std::io::{ErrorKind, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::time::Duration;

use tracing::info;

use crate::error::{ProtoError, ProtoResult};
use crate::transport::{MessageSink, MessageSource};

/// Upper bound on a single message (a 4K BGR frame is ~24 MB).
const MAX_MESSAGE_SIZE: usize = 64 * 1024 * 1024;

/// Turn a `tcp://host:port` endpoint into a socket address string.
pub fn parse_endpoint(endpoint: &str) -> ProtoResult<String> {
    let addr = endpoint.strip_prefix("tcp://").unwrap_or(endpoint);
    let addr = addr.replace('*', "0.0.0.0");
    if addr.is_empty() {
        return Err(ProtoError::Io(std::io::Error::new(
            ErrorKind::InvalidInput,
            format!("invalid endpoint: {endpoint}"),
        )));
    }
    Ok(addr)
}

/// Sending half of the TCP bus.
pub struct TcpMessageSender {
    stream: TcpStream,
}

impl TcpMessageSender {
    /// Connect to a listening peer.
    pub fn connect(endpoint: &str) -> ProtoResult<Self> {
        let addr = parse_endpoint(endpoint)?;
        let stream = TcpStream::connect(&addr)?;
        stream.set_nodelay(true)?;
        info!(%addr, "Bus sender connected");
        Ok(Self { stream })
    }

    pub fn from_stream(stream: TcpStream) -> ProtoResult<Self> {
        stream.set_nodelay(true)?;
        Ok(Self { stream })
    }
}

impl MessageSink for TcpMessageSender {
    fn send(&mut self, payload: &[u8]) -> ProtoResult<()> {
        let len = payload.len() as u32;
        self.stream.write_all(&len.to_le_bytes())?;
        self.stream.write_all(payload)?;
        Ok(())
    }

    fn close(&mut self) {
        let _ = self.stream.shutdown(std::net::Shutdown::Write);
    }
}

/// Listener that accepts one bus peer at a time.
pub struct TcpMessageListener {
    listener: TcpListener,
}

impl TcpMessageListener {
    pub fn bind(endpoint: &str) -> ProtoResult<Self> {
        let addr = parse_endpoint(endpoint)?;
        let listener = TcpListener::bind(&addr)?;
        info!(addr = %listener.local_addr()?, "Bus listener bound");
        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> ProtoResult<std::net::SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Block until a peer connects, then receive from it.
    pub fn accept(&self) -> ProtoResult<TcpMessageReceiver> {
        let (stream, peer) = self.listener.accept()?;
        stream.set_nodelay(true)?;
        info!(%peer, "Bus peer connected");
        Ok(TcpMessageReceiver::new(stream))
    }

    /// Block until a peer connects, then send to it.
    pub fn accept_sender(&self) -> ProtoResult<TcpMessageSender> {
        let (stream, peer) = self.listener.accept()?;
        info!(%peer, "Bus peer connected");
        TcpMessageSender::from_stream(stream)
    }
}

/// Receiving half of the TCP bus.
///
/// Keeps partial-read state across timeouts so a slow sender never
/// desynchronizes the framing.
pub struct TcpMessageReceiver {
    stream: TcpStream,
    header: [u8; 4],
    header_filled: usize,
    payload: Vec<u8>,
    payload_filled: usize,
}

impl TcpMessageReceiver {
    pub fn new(stream: TcpStream) -> Self {
        Self {
            stream,
            header: [0; 4],
            header_filled: 0,
            payload: Vec::new(),
            payload_filled: 0,
        }
    }

    /// Connect to a listening peer and receive from it.
    pub fn connect(endpoint: &str) -> ProtoResult<Self> {
        let addr = parse_endpoint(endpoint)?;
        let stream = TcpStream::connect(&addr)?;
        stream.set_nodelay(true)?;
        info!(%addr, "Bus receiver connected");
        Ok(Self::new(stream))
    }

    fn fill(&mut self, target_is_header: bool) -> ProtoResult<Option<usize>> {
        let (buffer, filled) = if target_is_header {
            (&mut self.header[..], self.header_filled)
        } else {
            (&mut self.payload[..], self.payload_filled)
        };

        match self.stream.read(&mut buffer[filled..]) {
            Ok(0) => Err(ProtoError::Closed),
            Ok(n) => Ok(Some(n)),
            Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => {
                Ok(None)
            }
            Err(e) => Err(ProtoError::Io(e)),
        }
    }
}

impl MessageSource for TcpMessageReceiver {
    fn recv_timeout(&mut self, timeout: Duration) -> ProtoResult<Option<Vec<u8>>> {
        // A zero Duration would mean "no timeout" to the OS.
        self.stream
            .set_read_timeout(Some(timeout.max(Duration::from_millis(1))))?;

        loop {
            if self.header_filled < 4 {
                match self.fill(true)? {
                    Some(n) => {
                        self.header_filled += n;
                        if self.header_filled == 4 {
                            let len = u32::from_le_bytes(self.header) as usize;
                            if len > MAX_MESSAGE_SIZE {
                                return Err(ProtoError::Io(std::io::Error::new(
                                    ErrorKind::InvalidData,
                                    format!("message of {len} bytes exceeds limit"),
                                )));
                            }
                            self.payload = vec![0; len];
                            self.payload_filled = 0;
                        }
                    }
                    None => return Ok(None),
                }
                continue;
            }

            if self.payload_filled < self.payload.len() {
                match self.fill(false)? {
                    Some(n) => self.payload_filled += n,
                    None => return Ok(None),
                }
                continue;
            }

            let message = std::mem::take(&mut self.payload);
            self.header_filled = 0;
            self.payload_filled = 0;
            return Ok(Some(message));
        }
    }
}
