//! File and directory calls.

use rapi_proto::Command;
use rapi_proto::status::INVALID_HANDLE_VALUE;

use super::read_success;
use crate::context::CallContext;
use crate::{Error, Result};

/// Read access.
pub const GENERIC_READ: u32 = 0x8000_0000;
/// Write access.
pub const GENERIC_WRITE: u32 = 0x4000_0000;

/// Create; fail if the file exists.
pub const CREATE_NEW: u32 = 1;
/// Create, truncating any existing file.
pub const CREATE_ALWAYS: u32 = 2;
/// Open; fail if the file is missing.
pub const OPEN_EXISTING: u32 = 3;
/// Open, creating the file if missing.
pub const OPEN_ALWAYS: u32 = 4;
/// Open and truncate; fail if the file is missing.
pub const TRUNCATE_EXISTING: u32 = 5;

/// Attribute bit for directories.
pub const FILE_ATTRIBUTE_DIRECTORY: u32 = 0x10;
/// Attribute value for a plain file.
pub const FILE_ATTRIBUTE_NORMAL: u32 = 0x80;
/// Attribute value returned for a failed lookup.
pub const INVALID_FILE_ATTRIBUTES: u32 = 0xFFFF_FFFF;

/// Origin for [`CallContext::set_file_pointer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum SeekFrom {
    /// From the start of the file.
    Begin,
    /// From the current position.
    Current,
    /// From the end of the file.
    End,
}

impl SeekFrom {
    /// Wire value of the move method.
    const fn code(self) -> u32 {
        match self {
            Self::Begin => 0,
            Self::Current => 1,
            Self::End => 2,
        }
    }
}

impl CallContext {
    /// Opens or creates a file and returns its handle.
    pub fn create_file(
        &mut self,
        path: &str,
        access: u32,
        share_mode: u32,
        disposition: u32,
        flags: u32,
    ) -> Result<u32> {
        self.check_paths(&[path])?;
        self.invoke(
            Command::CreateFile,
            |dialect, req| {
                dialect.write_string(req, path)?;
                req.write_u32(access)?;
                req.write_u32(share_mode)?;
                req.write_u32(disposition)?;
                req.write_u32(flags)
            },
            |_, reply, last_error| {
                let handle = reply.read_u32()?;
                if handle == INVALID_HANDLE_VALUE {
                    return Err(Error::Remote(last_error));
                }
                Ok(handle)
            },
        )
    }

    /// Reads up to `len` bytes from `handle`. An empty result means end of
    /// file.
    pub fn read_file(&mut self, handle: u32, len: u32) -> Result<Vec<u8>> {
        self.invoke(
            Command::ReadFile,
            |_, req| {
                req.write_u32(handle)?;
                req.write_optional_out(Some(len))
            },
            |_, reply, last_error| {
                read_success(reply, last_error)?;
                Ok(reply.read_optional(len as usize)?.unwrap_or_default())
            },
        )
    }

    /// Writes `data` to `handle` and returns the number of bytes written.
    pub fn write_file(&mut self, handle: u32, data: &[u8]) -> Result<u32> {
        self.invoke(
            Command::WriteFile,
            |_, req| {
                req.write_u32(handle)?;
                req.write_optional_in(Some(data))
            },
            |_, reply, last_error| {
                read_success(reply, last_error)?;
                Ok(reply.read_u32()?)
            },
        )
    }

    /// Moves the file pointer and returns the new position.
    pub fn set_file_pointer(&mut self, handle: u32, distance: i32, from: SeekFrom) -> Result<u32> {
        self.invoke(
            Command::SetFilePointer,
            |_, req| {
                req.write_u32(handle)?;
                req.write_i32(distance)?;
                req.write_u32(from.code())
            },
            |_, reply, last_error| {
                let position = reply.read_u32()?;
                if position == u32::MAX && last_error != 0 {
                    return Err(Error::Remote(last_error));
                }
                Ok(position)
            },
        )
    }

    /// Closes a file or process handle.
    pub fn close_handle(&mut self, handle: u32) -> Result<()> {
        self.invoke(
            Command::CloseHandle,
            |_, req| req.write_u32(handle),
            |_, reply, last_error| read_success(reply, last_error),
        )
    }

    /// Returns the attribute bits of `path`.
    pub fn get_file_attributes(&mut self, path: &str) -> Result<u32> {
        self.check_paths(&[path])?;
        self.invoke(
            Command::GetFileAttributes,
            |dialect, req| dialect.write_string(req, path),
            |_, reply, last_error| {
                let attributes = reply.read_u32()?;
                if attributes == INVALID_FILE_ATTRIBUTES {
                    return Err(Error::Remote(last_error));
                }
                Ok(attributes)
            },
        )
    }

    /// Deletes a file.
    pub fn delete_file(&mut self, path: &str) -> Result<()> {
        self.path_call(Command::DeleteFile, path)
    }

    /// Creates a directory.
    pub fn create_directory(&mut self, path: &str) -> Result<()> {
        self.path_call(Command::CreateDirectory, path)
    }

    /// Removes an empty directory.
    pub fn remove_directory(&mut self, path: &str) -> Result<()> {
        self.path_call(Command::RemoveDirectory, path)
    }

    /// Renames or moves a file.
    pub fn move_file(&mut self, from: &str, to: &str) -> Result<()> {
        self.check_paths(&[from, to])?;
        self.invoke(
            Command::MoveFile,
            |dialect, req| {
                dialect.write_string(req, from)?;
                dialect.write_string(req, to)
            },
            |_, reply, last_error| read_success(reply, last_error),
        )
    }

    /// Single-path call answered with a success flag.
    fn path_call(&mut self, command: Command, path: &str) -> Result<()> {
        self.check_paths(&[path])?;
        self.invoke(
            command,
            |dialect, req| dialect.write_string(req, path),
            |_, reply, last_error| read_success(reply, last_error),
        )
    }
}
