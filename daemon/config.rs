// Server configuration: defaults, then environment, then command line
use crate::error::ServiceError;
use aesd_core::{ResponseMode, DEFAULT_CAPACITY};
use std::env;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

// Environment variables for configuration
// AESD_BIND: Listen address (default: 0.0.0.0)
// AESD_PORT: TCP port (default: 9000)
// AESD_CAPACITY: Number of retained records (default: 10)
// AESD_MODE: echo | positioned (default: positioned)
// AESD_HEARTBEAT_SECS: Timestamp period in seconds, 0 disables (default: 10)
// AESD_DATA_FILE: Ephemeral backing file (default: none)

pub const DEFAULT_BIND: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 9000;
pub const DEFAULT_HEARTBEAT_SECS: u64 = 10;
pub const DEFAULT_DATA_FILE: &str = "/var/tmp/aesdsocketdata";
pub const DEFAULT_RECV_CHUNK: usize = 1024;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    pub capacity: usize,
    pub mode: ResponseMode,
    /// `None` disables the heartbeat writer
    pub heartbeat: Option<Duration>,
    pub data_file: Option<PathBuf>,
    pub recv_chunk: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind: DEFAULT_BIND.to_string(),
            port: DEFAULT_PORT,
            capacity: DEFAULT_CAPACITY,
            mode: ResponseMode::default(),
            heartbeat: Some(Duration::from_secs(DEFAULT_HEARTBEAT_SECS)),
            data_file: None,
            recv_chunk: DEFAULT_RECV_CHUNK,
        }
    }
}

fn heartbeat_from_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

/// Parse `name` if set. A value that does not parse is reported and ignored.
fn env_parse<T>(name: &str) -> Option<T>
where
    T: FromStr,
    T::Err: Display,
{
    let raw = env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("Ignoring {}={:?}: {}", name, raw, e);
            None
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let defaults = ServerConfig::default();

        let bind = env::var("AESD_BIND").unwrap_or(defaults.bind);

        let port = env_parse("AESD_PORT").unwrap_or(defaults.port);

        let capacity = env_parse("AESD_CAPACITY").unwrap_or(defaults.capacity);

        let mode = env_parse("AESD_MODE").unwrap_or(defaults.mode);

        let heartbeat = env_parse("AESD_HEARTBEAT_SECS")
            .map(heartbeat_from_secs)
            .unwrap_or(defaults.heartbeat);

        let data_file = env::var_os("AESD_DATA_FILE").map(PathBuf::from);

        ServerConfig {
            bind,
            port,
            capacity,
            mode,
            heartbeat,
            data_file,
            recv_chunk: defaults.recv_chunk,
        }
    }

    pub fn with_heartbeat_secs(mut self, secs: u64) -> Self {
        self.heartbeat = heartbeat_from_secs(secs);
        self
    }

    /// Full-echo is the file-backed deployment: give it its data file.
    pub fn with_deployment_defaults(mut self) -> Self {
        if self.mode == ResponseMode::FullEcho && self.data_file.is_none() {
            self.data_file = Some(PathBuf::from(DEFAULT_DATA_FILE));
        }
        self
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    pub fn validate(&self) -> Result<(), ServiceError> {
        if self.capacity == 0 {
            return Err(ServiceError::Config("capacity must be at least 1".to_string()));
        }
        if self.recv_chunk == 0 {
            return Err(ServiceError::Config("receive chunk must be at least 1 byte".to_string()));
        }
        if self.heartbeat == Some(Duration::ZERO) {
            return Err(ServiceError::Config("heartbeat period must be non-zero".to_string()));
        }
        Ok(())
    }
}
