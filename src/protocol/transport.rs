use std::{
    io::{self, ErrorKind, Read, Write},
    net::{Shutdown, TcpStream, ToSocketAddrs},
    time::Duration,
};

use log::{debug, info};
use thiserror::Error;

use super::framing;

const READ_CHUNK: usize = 8 * 1024;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to encode frame prefix: {0}")]
    Serialize(#[from] bincode::error::EncodeError),
    #[error("failed to decode frame prefix: {0}")]
    Deserialize(#[from] bincode::error::DecodeError),
    #[error("frame of {0} bytes exceeds the 4-byte length prefix")]
    Oversized(usize),
    #[error("read timed out after {received} of {expected} bytes")]
    Timeout { received: usize, expected: usize },
    #[error("connection closed after {received} of {expected} bytes")]
    Closed { received: usize, expected: usize },
    #[error("Transport IO Error: {0}")]
    Io(#[from] io::Error),
}

/// Blocking byte transport over a bidirectional stream.
pub struct ProtocolTransport<T: Read + Write> {
    stream: T,
}

impl ProtocolTransport<TcpStream> {
    /// Open a TCP connection, applying `timeout` to the connect itself and to
    /// every later read and write.
    pub fn connect(host: &str, port: u16, timeout: Duration) -> io::Result<Self> {
        info!("Connecting to {host}:{port}");
        let mut last_err = None;
        for addr in (host, port).to_socket_addrs()? {
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(stream) => {
                    stream.set_read_timeout(Some(timeout))?;
                    stream.set_write_timeout(Some(timeout))?;
                    return Ok(Self::new(stream));
                }
                Err(e) => {
                    debug!("connect to {addr} failed: {e}");
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| {
            io::Error::new(ErrorKind::NotFound, format!("no addresses for {host}"))
        }))
    }

    pub fn close(self) -> io::Result<()> {
        self.stream.shutdown(Shutdown::Both)
    }
}

impl<T: Read + Write> ProtocolTransport<T> {
    pub fn new(stream: T) -> Self {
        Self { stream }
    }

    pub fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.stream.write_all(bytes)?;
        self.stream.flush()?;
        Ok(())
    }

    pub fn write_frame(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        let framed = framing::encode(payload)?;
        self.send(&framed)
    }

    /// Read exactly `n` bytes. A single read may return fewer bytes than
    /// asked for, so keep reading until satisfied. The buffer grows with the
    /// bytes actually received, never with the announced length.
    pub fn receive_exact(&mut self, n: usize) -> Result<Vec<u8>, TransportError> {
        let mut buf = Vec::with_capacity(n.min(READ_CHUNK));
        let mut chunk = [0u8; READ_CHUNK];
        while buf.len() < n {
            let want = (n - buf.len()).min(READ_CHUNK);
            match self.stream.read(&mut chunk[..want]) {
                Ok(0) => {
                    return Err(TransportError::Closed {
                        received: buf.len(),
                        expected: n,
                    });
                }
                Ok(read) => buf.extend_from_slice(&chunk[..read]),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    return Err(TransportError::Timeout {
                        received: buf.len(),
                        expected: n,
                    });
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(buf)
    }

    pub fn read_prefix(&mut self) -> Result<u32, TransportError> {
        let bytes = self.receive_exact(framing::PREFIX_LEN)?;
        let mut prefix = [0u8; framing::PREFIX_LEN];
        prefix.copy_from_slice(&bytes);
        framing::decode_length(prefix)
    }
}
