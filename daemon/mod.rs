// daemon: line-retention service over the shared circular store
pub mod config;
pub mod error;
pub mod heartbeat;
pub mod session;
pub mod service;
pub mod system;

pub use config::ServerConfig;
pub use error::{ServiceError, SessionError};
pub use heartbeat::Heartbeat;
pub use session::{ConnectionSession, SessionId, SessionState};
pub use service::{Server, ShutdownHandle};
