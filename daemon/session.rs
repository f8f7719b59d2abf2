// Connection session: frames one client's bytes into records and answers per response mode
use crate::error::SessionError;
use aesd_buffer::{RecordAssembler, SharedStore};
use aesd_core::{parse_line, Line, LogicalPosition, Record, ResponseMode};
use aesd_transport::Transport;
use std::fmt;
use std::io::ErrorKind;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Receiving,
    /// Chunk buffered, no delimiter yet
    AwaitingMore,
    /// A complete line was taken from the assembler
    Flushed,
    Responding,
    Closed,
}

pub struct ConnectionSession<T: Transport> {
    id: SessionId,
    peer: String,
    transport: T,
    store: Arc<SharedStore>,
    mode: ResponseMode,
    shutdown: Arc<AtomicBool>,
    // per-connection assembly context
    assembler: RecordAssembler,
    cursor: LogicalPosition,
    recv_chunk: usize,
    state: SessionState,
}

impl<T: Transport> ConnectionSession<T> {
    pub fn new(
        id: SessionId,
        peer: &str,
        transport: T,
        store: Arc<SharedStore>,
        mode: ResponseMode,
        shutdown: Arc<AtomicBool>,
        recv_chunk: usize,
    ) -> Self {
        ConnectionSession {
            id,
            peer: peer.to_string(),
            transport,
            store,
            mode,
            shutdown,
            assembler: RecordAssembler::new(),
            cursor: 0,
            recv_chunk,
            state: SessionState::Idle,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Serve the connection until end-of-input, a fault or shutdown.
    /// The socket is released on every path.
    pub fn run(&mut self) -> Result<(), SessionError> {
        let result = self.serve();

        let dropped = self.assembler.discard();
        if dropped > 0 {
            debug!(session = %self.id, dropped, "discarding unterminated input");
        }
        if let Err(e) = self.transport.disconnect() {
            debug!(session = %self.id, "disconnect: {}", e);
        }
        self.state = SessionState::Closed;
        result
    }

    fn serve(&mut self) -> Result<(), SessionError> {
        let mut buf = vec![0u8; self.recv_chunk];
        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                return Ok(());
            }

            self.state = SessionState::Receiving;
            let n = match self.transport.receive(&mut buf) {
                Ok(0) => return Ok(()),
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                // a forced wake during shutdown is not a fault
                Err(_) if self.shutdown.load(Ordering::SeqCst) => return Ok(()),
                Err(e) => return Err(e.into()),
            };

            self.handle_chunk(&buf[..n])?;
        }
    }

    /// Feed one inbound chunk; at most one line completes per chunk.
    pub fn handle_chunk(&mut self, chunk: &[u8]) -> Result<(), SessionError> {
        match self.assembler.feed(chunk)? {
            Some(line) => {
                self.state = SessionState::Flushed;
                self.handle_line(line)
            }
            None => {
                self.state = SessionState::AwaitingMore;
                Ok(())
            }
        }
    }

    fn handle_line(&mut self, line: Record) -> Result<(), SessionError> {
        match self.mode {
            ResponseMode::FullEcho => {
                self.store.commit(line)?;
                self.respond(0)
            }
            ResponseMode::Positioned => {
                let seek = match parse_line(line.as_bytes()) {
                    Ok(Line::Seek(seek)) => Some(seek),
                    Ok(Line::Data(_)) => None,
                    Err(e) => {
                        warn!(session = %self.id, "{}", e);
                        return Err(e.into());
                    }
                };

                match seek {
                    Some(seek) => {
                        self.cursor = self.store.seek(seek)?;
                        debug!(session = %self.id, %seek, cursor = self.cursor, "cursor moved");
                    }
                    None => {
                        self.store.commit(line)?;
                    }
                }
                self.respond(self.cursor)
            }
        }
    }

    fn respond(&mut self, from: LogicalPosition) -> Result<(), SessionError> {
        self.state = SessionState::Responding;
        // copy under the lock, send without it
        let bytes = self.store.snapshot(from);
        self.transport.send_all(&bytes)?;
        self.state = SessionState::Idle;
        Ok(())
    }
}
