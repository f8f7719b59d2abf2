// client: line-protocol client library for tools and integration tests
use aesd_core::{encode_seek, SeekTo, DELIMITER};
use aesd_transport::{TcpTransport, Transport};
use std::io::{Error, ErrorKind, Result};
use std::net::SocketAddr;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 9000;

pub struct AesdClient {
    transport: TcpTransport,
    buffer: Vec<u8>,
}

impl AesdClient {
    pub fn connect(host: &str, port: u16) -> Result<Self> {
        Self::connect_to(&format!("{}:{}", host, port))
    }

    pub fn connect_addr(addr: SocketAddr) -> Result<Self> {
        Self::connect_to(&addr.to_string())
    }

    fn connect_to(address: &str) -> Result<Self> {
        let mut transport = TcpTransport::new(address);
        transport.connect()?;

        Ok(AesdClient {
            transport,
            buffer: vec![0u8; 4096],
        })
    }

    /// Send one line, adding the delimiter if missing.
    pub fn send_line(&mut self, line: &str) -> Result<()> {
        let mut bytes = line.as_bytes().to_vec();
        if bytes.last() != Some(&DELIMITER) {
            bytes.push(DELIMITER);
        }
        self.transport.send_all(&bytes)
    }

    pub fn send_raw(&mut self, bytes: &[u8]) -> Result<()> {
        self.transport.send_all(bytes)
    }

    pub fn seek_to(&mut self, seek: SeekTo) -> Result<()> {
        self.transport.send_all(&encode_seek(seek))
    }

    /// Close our sending side; the server sees end-of-input.
    pub fn finish(&mut self) -> Result<()> {
        self.transport.finish_sending()
    }

    pub fn set_timeout(&mut self, timeout: Option<Duration>) -> Result<()> {
        self.transport.set_read_timeout(timeout)
    }

    /// Read exactly `len` response bytes.
    pub fn receive_exact(&mut self, len: usize) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(len);
        while out.len() < len {
            let want = (len - out.len()).min(self.buffer.len());
            match self.transport.receive(&mut self.buffer[..want]) {
                Ok(0) => {
                    return Err(Error::new(
                        ErrorKind::UnexpectedEof,
                        format!("connection closed after {} of {} bytes", out.len(), len),
                    ))
                }
                Ok(n) => out.extend_from_slice(&self.buffer[..n]),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(out)
    }

    /// Read until the server goes quiet for `idle` or closes the connection.
    pub fn receive_until_idle(&mut self, idle: Duration) -> Result<Vec<u8>> {
        self.transport.set_read_timeout(Some(idle))?;
        let mut out = Vec::new();
        loop {
            match self.transport.receive(&mut self.buffer) {
                Ok(0) => break,
                Ok(n) => out.extend_from_slice(&self.buffer[..n]),
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(out)
    }

    /// True once the server has closed the connection.
    pub fn is_closed(&mut self, wait: Duration) -> Result<bool> {
        self.transport.set_read_timeout(Some(wait))?;
        let mut probe = [0u8; 1];
        match self.transport.receive(&mut probe) {
            Ok(0) => Ok(true),
            Ok(_) => Ok(false),
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => Ok(false),
            Err(e) if matches!(e.kind(), ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted) => Ok(true),
            Err(e) => Err(e),
        }
    }

    pub fn disconnect(&mut self) -> Result<()> {
        self.transport.disconnect()
    }
}
