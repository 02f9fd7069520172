//! Registry calls.

use rapi_proto::{Buffer, Command};

use crate::context::CallContext;
use crate::{Error, Result};

/// Predefined root key.
pub const HKEY_CLASSES_ROOT: u32 = 0x8000_0000;
/// Predefined root key.
pub const HKEY_CURRENT_USER: u32 = 0x8000_0001;
/// Predefined root key.
pub const HKEY_LOCAL_MACHINE: u32 = 0x8000_0002;
/// Predefined root key.
pub const HKEY_USERS: u32 = 0x8000_0003;

/// NUL-terminated UTF-16 string value.
pub const REG_SZ: u32 = 1;
/// Raw binary value.
pub const REG_BINARY: u32 = 3;
/// Little-endian 32-bit value.
pub const REG_DWORD: u32 = 4;

/// A registry value as stored on the device.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct RegValue {
    /// Value type, e.g. [`REG_SZ`].
    pub kind: u32,
    /// Raw value bytes.
    pub data: Vec<u8>,
}

impl RegValue {
    /// Decodes a [`REG_SZ`] value.
    pub fn as_string(&self) -> Option<String> {
        if self.kind != REG_SZ || self.data.len() % 2 != 0 {
            return None;
        }
        let units: Vec<u16> = self
            .data
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .take_while(|&u| u != 0)
            .collect();
        String::from_utf16(&units).ok()
    }

    /// Decodes a [`REG_DWORD`] value.
    pub fn as_u32(&self) -> Option<u32> {
        if self.kind != REG_DWORD {
            return None;
        }
        let bytes: [u8; 4] = self.data.get(..4)?.try_into().ok()?;
        Some(u32::from_le_bytes(bytes))
    }
}

/// Reads a Win32 status word; nonzero is the call's failure.
fn read_status(reply: &mut Buffer) -> Result<()> {
    match reply.read_u32()? {
        0 => Ok(()),
        code => Err(Error::Remote(code)),
    }
}

impl CallContext {
    /// Opens `sub_key` below `key` and returns the new key handle.
    pub fn reg_open_key_ex(&mut self, key: u32, sub_key: &str) -> Result<u32> {
        self.invoke(
            Command::RegOpenKeyEx,
            |dialect, req| {
                req.write_u32(key)?;
                dialect.write_string(req, sub_key)
            },
            |_, reply, _| {
                read_status(reply)?;
                Ok(reply.read_u32()?)
            },
        )
    }

    /// Closes a key handle.
    pub fn reg_close_key(&mut self, key: u32) -> Result<()> {
        self.invoke(
            Command::RegCloseKey,
            |_, req| req.write_u32(key),
            |_, reply, _| read_status(reply),
        )
    }

    /// Reads a value of `key`. `None` reads the key's default value.
    ///
    /// At most `max_len` bytes of data are accepted.
    pub fn reg_query_value_ex(
        &mut self,
        key: u32,
        name: Option<&str>,
        max_len: u32,
    ) -> Result<RegValue> {
        self.invoke(
            Command::RegQueryValueEx,
            |dialect, req| {
                req.write_u32(key)?;
                dialect.write_optional_string(req, name)?;
                req.write_optional_out(Some(max_len))
            },
            |_, reply, _| {
                read_status(reply)?;
                let kind = reply.read_u32()?;
                let data = reply.read_optional(max_len as usize)?.unwrap_or_default();
                Ok(RegValue { kind, data })
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_value_stops_at_nul() {
        let value = RegValue {
            kind: REG_SZ,
            data: vec![b'o', 0, b'k', 0, 0, 0, b'x', 0],
        };
        assert_eq!(value.as_string().as_deref(), Some("ok"));
        assert_eq!(value.as_u32(), None);
    }

    #[test]
    fn dword_value() {
        let value = RegValue {
            kind: REG_DWORD,
            data: 0x0102_0304u32.to_le_bytes().to_vec(),
        };
        assert_eq!(value.as_u32(), Some(0x0102_0304));
        assert_eq!(value.as_string(), None);

        let short = RegValue {
            kind: REG_DWORD,
            data: vec![1],
        };
        assert_eq!(short.as_u32(), None);
    }

    #[test]
    fn status_word() {
        let mut reply = Buffer::from(vec![0, 0, 0, 0, 2, 0, 0, 0]);
        read_status(&mut reply).unwrap();
        assert!(matches!(read_status(&mut reply), Err(Error::Remote(2))));
    }
}
