// Service loop: accept, track and reap sessions; drive heartbeat and graceful shutdown
use crate::config::ServerConfig;
use crate::error::ServiceError;
use crate::heartbeat::Heartbeat;
use crate::session::{ConnectionSession, SessionId};
use aesd_buffer::SharedStore;
use aesd_transport::{Interrupter, ListenerWaker, TcpServer, TcpTransport, TransportListener};
use crossbeam::channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{error, info, warn};

const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Requests a graceful stop from any thread (signal watcher, tests).
#[derive(Clone)]
pub struct ShutdownHandle {
    flag: Arc<AtomicBool>,
    waker: Arc<ListenerWaker>,
}

impl ShutdownHandle {
    pub fn trigger(&self) {
        if !self.flag.swap(true, Ordering::SeqCst) {
            self.waker.wake();
        }
    }

    pub fn is_triggered(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

struct SessionHandle {
    peer: String,
    interrupter: Interrupter,
    thread: JoinHandle<()>,
}

// Tracked sessions; locked independently of the store, never while holding it
type SessionRegistry = Arc<Mutex<HashMap<SessionId, SessionHandle>>>;

pub struct Server {
    config: ServerConfig,
    listener: TcpServer,
    local_addr: SocketAddr,
    store: Arc<SharedStore>,
    shutdown: ShutdownHandle,
}

impl Server {
    /// Set up listener and store. Any failure here is fatal.
    pub fn bind(config: ServerConfig) -> Result<Self, ServiceError> {
        config.validate()?;

        let address = config.address();
        let setup = |source| ServiceError::Setup { address: address.clone(), source };

        let mut listener = TcpServer::new(&address);
        listener.bind().map_err(setup)?;
        let local_addr = listener.local_addr().map_err(setup)?;
        let waker = listener.waker().map_err(setup)?;

        let store = match config.data_file {
            Some(ref path) => SharedStore::with_backing_file(config.capacity, path)?,
            None => SharedStore::with_capacity(config.capacity),
        };

        info!(%local_addr, mode = %config.mode, capacity = config.capacity, "listening");

        Ok(Server {
            config,
            listener,
            local_addr,
            store: Arc::new(store),
            shutdown: ShutdownHandle {
                flag: Arc::new(AtomicBool::new(false)),
                waker: Arc::new(waker),
            },
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn store(&self) -> Arc<SharedStore> {
        Arc::clone(&self.store)
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Accept until shutdown is triggered, then drain sessions, stop the
    /// heartbeat and release the store.
    pub fn run(mut self) -> Result<(), ServiceError> {
        let heartbeat = match self.config.heartbeat {
            Some(period) => match Heartbeat::spawn(Arc::clone(&self.store), period) {
                Ok(heartbeat) => Some(heartbeat),
                Err(e) => return Err(self.abort_startup(None, e.into())),
            },
            None => None,
        };

        let sessions: SessionRegistry = Arc::new(Mutex::new(HashMap::new()));
        let (done_tx, done_rx) = unbounded();
        let reaper = match Self::spawn_reaper(Arc::clone(&sessions), done_rx) {
            Ok(reaper) => reaper,
            Err(e) => return Err(self.abort_startup(heartbeat, e.into())),
        };

        let mut next_id = 0u64;
        while !self.shutdown.is_triggered() {
            let conn = match self.listener.accept() {
                Ok(conn) => conn,
                Err(_) if self.shutdown.is_triggered() => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!("Accept failed: {}", e);
                    thread::sleep(ACCEPT_RETRY_DELAY);
                    continue;
                }
            };
            if self.shutdown.is_triggered() {
                break;
            }

            next_id += 1;
            self.spawn_session(SessionId(next_id), conn, &sessions, &done_tx);
        }

        self.drain_sessions(&sessions);
        drop(done_tx);
        if reaper.join().is_err() {
            error!("session reaper panicked");
        }

        if let Some(heartbeat) = heartbeat {
            heartbeat.stop();
        }
        self.store.close()?;
        info!("shutdown complete");
        Ok(())
    }

    /// Undo a partial start: stop the heartbeat if it runs and release the
    /// store, then hand back the fault.
    fn abort_startup(&self, heartbeat: Option<Heartbeat>, cause: ServiceError) -> ServiceError {
        error!("startup failed: {}", cause);
        if let Some(heartbeat) = heartbeat {
            heartbeat.stop();
        }
        if let Err(e) = self.store.close() {
            error!("failed to release store: {}", e);
        }
        cause
    }

    fn spawn_session(
        &self,
        id: SessionId,
        conn: TcpTransport,
        sessions: &SessionRegistry,
        done_tx: &Sender<SessionId>,
    ) {
        let peer = conn
            .peer_addr()
            .map(|a| a.ip().to_string())
            .unwrap_or_else(|_| conn.address().to_string());
        let interrupter = match conn.interrupter() {
            Ok(i) => i,
            Err(e) => {
                warn!(%peer, "dropping connection: {}", e);
                return;
            }
        };
        info!("Accepted connection from {}", peer);

        let mut session = ConnectionSession::new(
            id,
            &peer,
            conn,
            Arc::clone(&self.store),
            self.config.mode,
            Arc::clone(&self.shutdown.flag),
            self.config.recv_chunk,
        );
        let done = done_tx.clone();

        // registered before the thread can report completion
        let mut registry = sessions.lock();
        let spawned = thread::Builder::new()
            .name(format!("aesd-session-{}", id.0))
            .spawn(move || {
                if let Err(e) = session.run() {
                    warn!(session = %session.id(), peer = session.peer(), "session aborted: {}", e);
                }
                info!("Closed connection from {}", session.peer());
                let _ = done.send(session.id());
            });

        match spawned {
            Ok(thread) => {
                registry.insert(id, SessionHandle { peer, interrupter, thread });
            }
            Err(e) => error!(%peer, "failed to spawn session: {}", e),
        }
    }

    fn spawn_reaper(sessions: SessionRegistry, done_rx: Receiver<SessionId>) -> std::io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("aesd-reaper".to_string())
            .spawn(move || {
                for id in done_rx.iter() {
                    let handle = sessions.lock().remove(&id);
                    if let Some(handle) = handle {
                        if handle.thread.join().is_err() {
                            error!(session = %id, peer = %handle.peer, "session thread panicked");
                        }
                    }
                }
            })
    }

    fn drain_sessions(&self, sessions: &SessionRegistry) {
        let remaining: Vec<(SessionId, SessionHandle)> = sessions.lock().drain().collect();
        if !remaining.is_empty() {
            info!(count = remaining.len(), "interrupting active sessions");
        }

        for (_, handle) in &remaining {
            handle.interrupter.interrupt();
        }
        for (id, handle) in remaining {
            if handle.thread.join().is_err() {
                error!(session = %id, peer = %handle.peer, "session thread panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn aborted_startup_stops_heartbeat_and_deletes_backing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("aesdsocketdata");
        let server = Server::bind(ServerConfig {
            bind: "127.0.0.1".to_string(),
            port: 0,
            heartbeat: None,
            data_file: Some(path.clone()),
            ..ServerConfig::default()
        })
        .unwrap();
        assert!(path.exists());

        let heartbeat = Heartbeat::spawn(server.store(), Duration::from_secs(3600)).unwrap();
        let cause = io::Error::new(io::ErrorKind::Other, "thread spawn failed");
        let err = server.abort_startup(Some(heartbeat), cause.into());

        assert!(matches!(err, ServiceError::Io(_)));
        assert!(!path.exists());
        // heartbeat thread has exited and released its store handle
        assert_eq!(Arc::strong_count(&server.store), 1);
    }
}
