// TCP transport implementation
use crate::traits::{Transport, TransportListener};
use nix::sys::socket::{shutdown as shutdown_socket, Shutdown as SocketShutdown};
use std::io::{Error, ErrorKind, Read, Result, Write};
use std::net::{Ipv4Addr, Shutdown, SocketAddr, TcpListener, TcpStream};
use std::os::unix::io::AsRawFd;
use std::time::Duration;
use tracing::debug;

fn not_connected() -> Error {
    Error::new(ErrorKind::NotConnected, "Not connected")
}

pub struct TcpTransport {
    address: String,
    stream: Option<TcpStream>,
}

impl TcpTransport {
    pub fn new(address: &str) -> Self {
        TcpTransport {
            address: address.to_string(),
            stream: None,
        }
    }

    /// Wrap an accepted connection.
    pub fn from_stream(stream: TcpStream) -> Self {
        let address = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        TcpTransport {
            address,
            stream: Some(stream),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn peer_addr(&self) -> Result<SocketAddr> {
        self.stream.as_ref().ok_or_else(not_connected)?.peer_addr()
    }

    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.stream.as_ref().ok_or_else(not_connected)?.set_read_timeout(timeout)
    }

    /// Signal end of our sending side; the peer sees end-of-input.
    pub fn finish_sending(&self) -> Result<()> {
        self.stream.as_ref().ok_or_else(not_connected)?.shutdown(Shutdown::Write)
    }

    /// Handle that can unblock a pending `receive` from another thread.
    pub fn interrupter(&self) -> Result<Interrupter> {
        let stream = self.stream.as_ref().ok_or_else(not_connected)?.try_clone()?;
        Ok(Interrupter { stream })
    }
}

impl Transport for TcpTransport {
    fn send(&mut self, data: &[u8]) -> Result<usize> {
        if let Some(ref mut stream) = self.stream {
            stream.write(data)
        } else {
            Err(not_connected())
        }
    }

    fn receive(&mut self, buf: &mut [u8]) -> Result<usize> {
        if let Some(ref mut stream) = self.stream {
            stream.read(buf)
        } else {
            Err(not_connected())
        }
    }

    fn connect(&mut self) -> Result<()> {
        let stream = TcpStream::connect(&self.address)?;
        self.stream = Some(stream);
        Ok(())
    }

    fn disconnect(&mut self) -> Result<()> {
        if let Some(stream) = self.stream.take() {
            // already-reset peers report NotConnected, nothing left to do
            match stream.shutdown(Shutdown::Both) {
                Err(e) if e.kind() != ErrorKind::NotConnected => return Err(e),
                _ => {}
            }
        }
        Ok(())
    }
}

/// Cloned socket handle used to force a blocked receive to return.
pub struct Interrupter {
    stream: TcpStream,
}

impl Interrupter {
    pub fn interrupt(&self) {
        if let Err(e) = self.stream.shutdown(Shutdown::Both) {
            debug!("interrupt on closed socket: {}", e);
        }
    }
}

pub struct TcpServer {
    address: String,
    listener: Option<TcpListener>,
}

impl TcpServer {
    pub fn new(address: &str) -> Self {
        TcpServer {
            address: address.to_string(),
            listener: None,
        }
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener.as_ref().ok_or_else(not_connected)?.local_addr()
    }

    /// Handle that can unblock a pending `accept` from another thread.
    pub fn waker(&self) -> Result<ListenerWaker> {
        let listener = self.listener.as_ref().ok_or_else(not_connected)?.try_clone()?;
        Ok(ListenerWaker { listener })
    }
}

impl TransportListener for TcpServer {
    type Connection = TcpTransport;

    fn bind(&mut self) -> Result<()> {
        let listener = TcpListener::bind(&self.address)?;
        self.listener = Some(listener);
        Ok(())
    }

    fn accept(&mut self) -> Result<TcpTransport> {
        let listener = self.listener.as_ref().ok_or_else(not_connected)?;
        let (stream, _) = listener.accept()?;
        Ok(TcpTransport::from_stream(stream))
    }
}

pub struct ListenerWaker {
    listener: TcpListener,
}

impl ListenerWaker {
    /// Make a blocked `accept` return. Shutting down the listening socket
    /// wakes it on Linux; elsewhere fall back to a loopback connection.
    pub fn wake(&self) {
        if shutdown_socket(self.listener.as_raw_fd(), SocketShutdown::Both).is_ok() {
            return;
        }
        if let Ok(addr) = self.listener.local_addr() {
            let target = SocketAddr::new(Ipv4Addr::LOCALHOST.into(), addr.port());
            let _ = TcpStream::connect_timeout(&target, Duration::from_millis(200));
        }
    }
}
