//! HRESULT and Win32 status codes carried on the two error channels.
//!
//! The protocol channel holds an HRESULT, the system channel a Win32
//! error code as reported by the device.

/// Success.
pub const S_OK: u32 = 0;

/// Unspecified failure.
pub const E_FAIL: u32 = 0x8000_4005;

/// Catastrophic or not-yet-determined failure. Initial value of the
/// protocol channel.
pub const E_UNEXPECTED: u32 = 0x8000_FFFF;

/// Access denied. Reported when the password challenge fails.
pub const E_ACCESSDENIED: u32 = 0x8007_0005;

/// Out of memory.
pub const E_OUTOFMEMORY: u32 = 0x8007_000E;

/// Invalid argument.
pub const E_INVALIDARG: u32 = 0x8007_0057;

/// `connect` called on a context that is already connected.
pub const CERAPI_E_ALREADYINITIALIZED: u32 = 0x8004_1001;

/// The password did not match.
pub const ERROR_INVALID_PASSWORD: u32 = 86;

/// A path exceeded the device's length limit.
pub const ERROR_FILENAME_EXCED_RANGE: u32 = 206;

/// Enumeration is exhausted.
pub const ERROR_NO_MORE_DEVICES: u32 = 1248;

/// The call was attempted without a connection.
pub const ERROR_NOT_CONNECTED: u32 = 2250;

/// Handle value returned by the device for a failed open.
pub const INVALID_HANDLE_VALUE: u32 = 0xFFFF_FFFF;

/// Wraps a Win32 error code in an HRESULT.
pub const fn hresult_from_win32(code: u32) -> u32 {
    if code == 0 {
        S_OK
    } else {
        0x8007_0000 | (code & 0xFFFF)
    }
}
