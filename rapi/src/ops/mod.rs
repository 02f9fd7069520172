//! Remote call wrappers.
//!
//! Each wrapper is a method on [`CallContext`](crate::CallContext):
//! it checks the connection, writes the dialect's opcode and the
//! arguments, runs the call, and decodes the reply. Reply payloads start
//! with the device's last error, followed by the call's own fields.

mod file;
mod registry;
mod system;

pub use file::{
    CREATE_ALWAYS, CREATE_NEW, FILE_ATTRIBUTE_DIRECTORY, FILE_ATTRIBUTE_NORMAL, GENERIC_READ,
    GENERIC_WRITE, INVALID_FILE_ATTRIBUTES, OPEN_ALWAYS, OPEN_EXISTING, SeekFrom, TRUNCATE_EXISTING,
};
pub use registry::{
    HKEY_CLASSES_ROOT, HKEY_CURRENT_USER, HKEY_LOCAL_MACHINE, HKEY_USERS, REG_BINARY, REG_DWORD,
    REG_SZ, RegValue,
};
pub use system::{OsVersion, ProcessInfo, StoreInfo};

use rapi_proto::{Buffer, MAX_PATH};

use crate::{CallContext, Error, Result};

impl CallContext {
    /// Requires a connection, then rejects paths the device cannot hold.
    fn check_paths(&mut self, paths: &[&str]) -> Result<()> {
        self.ensure_connected()?;
        for path in paths {
            let len = path.encode_utf16().count();
            if len > MAX_PATH {
                return Err(self.record(Error::PathTooLong { len, max: MAX_PATH }));
            }
        }
        Ok(())
    }
}

/// Reads a `u32` boolean and turns `false` into the device's error.
fn read_success(reply: &mut Buffer, last_error: u32) -> Result<()> {
    if reply.read_u32()? == 0 {
        return Err(Error::Remote(last_error));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_flag() {
        let mut reply = Buffer::from(vec![1, 0, 0, 0, 0, 0, 0, 0]);
        read_success(&mut reply, 5).unwrap();
        assert!(matches!(
            read_success(&mut reply, 5),
            Err(Error::Remote(5))
        ));
    }
}
