// Buffer module: record assembly, circular retention and the locked shared store
pub mod error;
pub mod assembler;
pub mod circular;
pub mod store;
pub mod device;

pub use error::*;
pub use assembler::RecordAssembler;
pub use circular::CircularLog;
pub use store::{Commit, SharedStore, StreamView};
pub use device::DeviceHandle;
