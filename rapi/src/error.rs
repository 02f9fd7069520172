//! Error types for RAPI operations.

use std::io;

use rapi_proto::status::{
    CERAPI_E_ALREADYINITIALIZED, E_ACCESSDENIED, E_FAIL, E_INVALIDARG, E_OUTOFMEMORY,
    ERROR_FILENAME_EXCED_RANGE, ERROR_NO_MORE_DEVICES, ERROR_NOT_CONNECTED, hresult_from_win32,
};

/// Alias for `Result<T, rapi::Error>`.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by connection, call and handle operations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// A call was attempted on a context that is not connected.
    #[error("not connected to a device")]
    NotConnected,

    /// `connect` was called on a context that is already connected.
    #[error("context is already connected")]
    AlreadyConnected,

    /// The device rejected the password, or the challenge could not complete.
    #[error("access denied by device")]
    AccessDenied,

    /// The socket failed to connect, send or receive.
    #[error("transport: {0}")]
    Transport(#[source] io::Error),

    /// A v1 reply carried a nonzero status code.
    #[error("device returned protocol status {0:#010x}")]
    Protocol(u32),

    /// A reply could not be decoded or a request could not be encoded.
    #[error("wire: {0}")]
    Wire(#[source] rapi_proto::Error),

    /// Device information could not be obtained.
    #[error("device info unavailable: {0}")]
    Resolution(String),

    /// The connection broker did not hand over a descriptor.
    #[error("broker: {0}")]
    Broker(String),

    /// The remote call ran but the device reported a Win32 error.
    #[error("remote call failed with error {0}")]
    Remote(u32),

    /// An enumeration or lookup found no (more) devices.
    #[error("no more devices")]
    NoMoreDevices,

    /// A path was longer than the device accepts.
    #[error("path of {len} characters exceeds the {max} character limit")]
    PathTooLong {
        /// Length of the rejected path in UTF-16 units.
        len: usize,
        /// Largest accepted length.
        max: usize,
    },

    /// An argument was rejected before any I/O.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// A configuration or device info file could not be parsed.
    #[error("parse: {0}")]
    Parse(#[from] serde_json::Error),

    /// A local file operation failed.
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    /// Legacy HRESULT equivalent, as recorded on the protocol error channel.
    pub fn hresult(&self) -> u32 {
        match self {
            Self::NotConnected => hresult_from_win32(ERROR_NOT_CONNECTED),
            Self::AlreadyConnected => CERAPI_E_ALREADYINITIALIZED,
            Self::AccessDenied => E_ACCESSDENIED,
            Self::Protocol(code) => *code,
            Self::Remote(code) => hresult_from_win32(*code),
            Self::NoMoreDevices => hresult_from_win32(ERROR_NO_MORE_DEVICES),
            Self::PathTooLong { .. } => hresult_from_win32(ERROR_FILENAME_EXCED_RANGE),
            Self::InvalidArgument(_) => E_INVALIDARG,
            Self::Wire(rapi_proto::Error::Alloc { .. }) => E_OUTOFMEMORY,
            Self::Transport(_)
            | Self::Wire(_)
            | Self::Resolution(_)
            | Self::Broker(_)
            | Self::Parse(_)
            | Self::Io(_) => E_FAIL,
        }
    }
}

impl From<rapi_proto::Error> for Error {
    fn from(e: rapi_proto::Error) -> Self {
        match e {
            rapi_proto::Error::Io(io) => Self::Transport(io),
            other => Self::Wire(other),
        }
    }
}
