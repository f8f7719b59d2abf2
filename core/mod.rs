// Core module: Record types and line protocol (NO I/O dependencies)
pub mod types;
pub mod protocol;

pub use types::*;
pub use protocol::*;
