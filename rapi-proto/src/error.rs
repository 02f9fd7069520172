//! Error types for wire encoding and decoding.

use std::io;

/// Alias for `Result<T, rapi_proto::Error>`.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while encoding, decoding or framing RAPI buffers.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// A read needed more bytes than the buffer still holds.
    #[error("truncated buffer: needed {needed} bytes, {available} available")]
    Truncated {
        /// Bytes the field required.
        needed: usize,
        /// Bytes left after the read cursor.
        available: usize,
    },

    /// Growing the buffer failed; nothing was appended.
    #[error("failed to allocate {requested} bytes for wire buffer")]
    Alloc {
        /// Additional capacity that was requested.
        requested: usize,
    },

    /// A string field did not hold valid UTF-16.
    #[error("string field is not valid UTF-16")]
    InvalidUtf16,

    /// A string is too long for its length prefix.
    #[error("string of {units} UTF-16 units does not fit its length prefix")]
    StringTooLong {
        /// Length of the string in UTF-16 code units.
        units: usize,
    },

    /// An optional field announced more bytes than the caller accepts.
    #[error("field of {size} bytes exceeds the {max} byte limit")]
    FieldTooLarge {
        /// Size announced on the wire.
        size: usize,
        /// Largest size the caller accepts.
        max: usize,
    },

    /// A frame header announced more bytes than the configured limit.
    #[error("frame of {len} bytes exceeds the {max} byte limit")]
    FrameTooLarge {
        /// Length announced by the frame header.
        len: u32,
        /// Configured frame limit.
        max: u32,
    },

    /// The underlying stream failed.
    #[error(transparent)]
    Io(#[from] io::Error),
}
