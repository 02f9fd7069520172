//! The two reply dialects.
//!
//! v1 wraps every reply in a status envelope:
//!
//! ```text
//! [u32 result_1][result_1 == 1 ? u32 result_2][payload]
//! ```
//!
//! v2 sends the payload bare. The dialect is chosen once per connection
//! from the device OS version and also decides the opcode table and the
//! string encoding used by call wrappers.

use rapi_proto::{Buffer, Command};
use tracing::{debug, error, trace};

use crate::context::Link;
use crate::{Error, Result};

/// Wire dialect spoken by a connected device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Dialect {
    /// Status envelope on every reply; used by direct connections and by
    /// devices older than OS 5.1.
    V1,
    /// Bare replies; used by brokered and proxied devices running OS 5.1
    /// or later.
    V2,
}

impl Dialect {
    /// Selects the dialect for a brokered or proxied device.
    ///
    /// v2 needs both `major > 4` and `minor > 0`, so 5.0 and 6.0 stay on v1.
    pub const fn for_os_version(major: u32, minor: u32) -> Self {
        if major > 4 && minor > 0 {
            Self::V2
        } else {
            Self::V1
        }
    }

    /// Opcode for `command` in this dialect.
    pub const fn opcode(self, command: Command) -> u32 {
        match self {
            Self::V1 => command.opcode_v1(),
            Self::V2 => command.opcode_v2(),
        }
    }

    /// Writes a string argument in this dialect's encoding.
    pub fn write_string(self, buf: &mut Buffer, text: &str) -> rapi_proto::Result<()> {
        match self {
            Self::V1 => buf.write_string(text),
            Self::V2 => buf.write_terminated_string(text),
        }
    }

    /// Writes a presence flag, then the string if present.
    pub fn write_optional_string(
        self,
        buf: &mut Buffer,
        text: Option<&str>,
    ) -> rapi_proto::Result<()> {
        match (self, text) {
            (Self::V1, _) => buf.write_optional_string(text),
            (Self::V2, None) => buf.write_u32(0),
            (Self::V2, Some(text)) => {
                buf.write_u32(1)?;
                buf.write_terminated_string(text)
            }
        }
    }

    /// Reads a string result in this dialect's encoding.
    pub fn read_string(self, buf: &mut Buffer) -> rapi_proto::Result<String> {
        match self {
            Self::V1 => buf.read_string(),
            Self::V2 => buf.read_terminated_string(),
        }
    }

    /// Sends the pending request and receives the reply, unwrapping the
    /// status envelope if this dialect has one.
    ///
    /// On return the reply buffer's cursor sits at the start of the
    /// call-specific payload.
    pub(crate) fn execute_call(self, link: &mut Link) -> Result<()> {
        link.exchange()?;
        match self {
            Self::V1 => unwrap_status(link.reply_mut()),
            Self::V2 => Ok(()),
        }
    }
}

/// Consumes the v1 status envelope.
///
/// Only `result_1 == 1` announces a status word. Any other value is taken
/// as success with no status to check, leaving the payload to speak for
/// itself.
fn unwrap_status(reply: &mut Buffer) -> Result<()> {
    let result_1 = reply.read_u32()?;
    trace!(result_1 = format_args!("{result_1:#010x}"), "reply envelope");
    if result_1 != 1 {
        return Ok(());
    }
    let result_2 = reply.read_u32()?;
    if result_2 != 0 {
        error!(result_2 = format_args!("{result_2:#010x}"), "device reported failure");
        return Err(Error::Protocol(result_2));
    }
    debug!("device reported success");
    Ok(())
}
