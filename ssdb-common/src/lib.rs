// ssdb-common - Wire values and frame codec for the SSDB protocol
//
// This crate is pure: it turns argument lists into wire bytes and wire bytes
// back into response blocks, without touching a socket.

pub mod protocol;
pub mod response;
pub mod value;

// Re-export for convenience
pub use protocol::*;
pub use response::*;
pub use value::*;
