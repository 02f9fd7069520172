//! System information and process calls.

use rapi_proto::Command;
use serde::Serialize;

use super::read_success;
use crate::context::CallContext;
use crate::Result;

/// Size of the fixed part of the OS version record.
const OS_VERSION_SIZE: u32 = 276;

/// Device OS version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[non_exhaustive]
pub struct OsVersion {
    /// Major version.
    pub major: u32,
    /// Minor version.
    pub minor: u32,
    /// Build number.
    pub build: u32,
    /// Platform identifier.
    pub platform_id: u32,
    /// Service pack or other extra version text.
    pub csd_version: String,
}

/// Object store usage, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[non_exhaustive]
pub struct StoreInfo {
    /// Total store size.
    pub store_size: u32,
    /// Free space.
    pub free_size: u32,
}

/// Handles and IDs of a launched process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[non_exhaustive]
pub struct ProcessInfo {
    /// Process handle; close with [`CallContext::close_handle`].
    pub process: u32,
    /// Primary thread handle; close with [`CallContext::close_handle`].
    pub thread: u32,
    /// Process ID.
    pub process_id: u32,
    /// Primary thread ID.
    pub thread_id: u32,
}

impl CallContext {
    /// Queries the device OS version.
    pub fn get_version_ex(&mut self) -> Result<OsVersion> {
        self.invoke(
            Command::GetVersionEx,
            |_, req| req.write_optional_out(Some(OS_VERSION_SIZE)),
            |dialect, reply, last_error| {
                read_success(reply, last_error)?;
                Ok(OsVersion {
                    major: reply.read_u32()?,
                    minor: reply.read_u32()?,
                    build: reply.read_u32()?,
                    platform_id: reply.read_u32()?,
                    csd_version: dialect.read_string(reply)?,
                })
            },
        )
    }

    /// Queries object store usage.
    pub fn get_store_information(&mut self) -> Result<StoreInfo> {
        self.invoke(
            Command::GetStoreInformation,
            |_, _| Ok(()),
            |_, reply, last_error| {
                read_success(reply, last_error)?;
                Ok(StoreInfo {
                    store_size: reply.read_u32()?,
                    free_size: reply.read_u32()?,
                })
            },
        )
    }

    /// Launches `application` with optional command-line `arguments`.
    pub fn create_process(
        &mut self,
        application: &str,
        arguments: Option<&str>,
    ) -> Result<ProcessInfo> {
        self.check_paths(&[application])?;
        self.invoke(
            Command::CreateProcess,
            |dialect, req| {
                dialect.write_string(req, application)?;
                dialect.write_optional_string(req, arguments)?;
                req.write_u32(0)
            },
            |_, reply, last_error| {
                read_success(reply, last_error)?;
                Ok(ProcessInfo {
                    process: reply.read_u32()?,
                    thread: reply.read_u32()?,
                    process_id: reply.read_u32()?,
                    thread_id: reply.read_u32()?,
                })
            },
        )
    }
}
