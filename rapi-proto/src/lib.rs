//! Wire protocol for RAPI (Remote API) desktop↔device communication.
//!
//! A request is a [`Buffer`] holding a 4-byte opcode followed by the
//! call-specific arguments. Buffers travel as `[u32 little-endian length]
//! [bytes]` frames over any reliable byte stream (TCP, Unix socket, or a
//! descriptor handed over by a connection broker).
//!
//! Two incompatible reply dialects exist: v1 wraps every reply in a status
//! envelope, v2 carries the bare payload. This crate only encodes and
//! decodes bytes; envelope handling lives in the `rapi` crate.

mod buffer;
mod codec;
mod command;
mod error;
pub mod password;
pub mod status;

pub use buffer::Buffer;
pub use codec::{MAX_FRAME, recv, send};
pub use command::{Command, MAX_PATH, RAPI_PORT};
pub use error::{Error, Result};
