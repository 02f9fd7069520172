//! Remote command identifiers and per-dialect opcode tables.

/// Well-known TCP port the device listens on for legacy connections.
pub const RAPI_PORT: u16 = 990;

/// Longest path, in UTF-16 units, the device accepts.
pub const MAX_PATH: usize = 260;

/// A remote operation, independent of dialect.
///
/// The opcode written at the start of a request differs between the v1
/// and v2 dialects; [`Command::opcode_v1`] and [`Command::opcode_v2`] hold
/// the two tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Command {
    /// Open or create a file.
    CreateFile,
    /// Read from an open file handle.
    ReadFile,
    /// Write to an open file handle.
    WriteFile,
    /// Close any handle.
    CloseHandle,
    /// Move a file pointer.
    SetFilePointer,
    /// Fetch file attributes.
    GetFileAttributes,
    /// Delete a file.
    DeleteFile,
    /// Rename or move a file.
    MoveFile,
    /// Create a directory.
    CreateDirectory,
    /// Remove an empty directory.
    RemoveDirectory,
    /// Open a registry key.
    RegOpenKeyEx,
    /// Close a registry key.
    RegCloseKey,
    /// Read a registry value.
    RegQueryValueEx,
    /// Query the device OS version.
    GetVersionEx,
    /// Query object store usage.
    GetStoreInformation,
    /// Launch a process.
    CreateProcess,
}

impl Command {
    /// Opcode used by devices speaking the v1 dialect.
    pub const fn opcode_v1(self) -> u32 {
        match self {
            Self::CreateFile => 0x05,
            Self::ReadFile => 0x06,
            Self::WriteFile => 0x07,
            Self::CloseHandle => 0x08,
            Self::SetFilePointer => 0x09,
            Self::CreateDirectory => 0x0F,
            Self::RemoveDirectory => 0x10,
            Self::MoveFile => 0x11,
            Self::DeleteFile => 0x13,
            Self::GetFileAttributes => 0x14,
            Self::RegOpenKeyEx => 0x1E,
            Self::RegCloseKey => 0x20,
            Self::RegQueryValueEx => 0x22,
            Self::CreateProcess => 0x3B,
            Self::GetVersionEx => 0x3C,
            Self::GetStoreInformation => 0x41,
        }
    }

    /// Opcode used by devices speaking the v2 dialect.
    pub const fn opcode_v2(self) -> u32 {
        match self {
            Self::GetFileAttributes => 0x01,
            Self::GetVersionEx => 0x02,
            Self::CreateFile => 0x03,
            Self::ReadFile => 0x04,
            Self::WriteFile => 0x05,
            Self::CloseHandle => 0x06,
            Self::SetFilePointer => 0x07,
            Self::CreateDirectory => 0x08,
            Self::RemoveDirectory => 0x09,
            Self::MoveFile => 0x0A,
            Self::DeleteFile => 0x0B,
            Self::RegOpenKeyEx => 0x12,
            Self::RegCloseKey => 0x13,
            Self::RegQueryValueEx => 0x15,
            Self::GetStoreInformation => 0x1C,
            Self::CreateProcess => 0x24,
        }
    }
}
