//! Length-prefixed frame codec over any `Read`/`Write` stream.
//!
//! Each frame is: `[u32 little-endian length][buffer bytes]`.

use std::io::{Read, Write};

use crate::buffer::Buffer;
use crate::error::{Error, Result};

/// Default maximum frame payload (16 MiB).
pub const MAX_FRAME: u32 = 16 * 1024 * 1024;

/// Writes the whole of `buf` to `w` as one frame.
pub fn send<W: Write>(w: &mut W, buf: &Buffer) -> Result<()> {
    let len = u32::try_from(buf.len()).map_err(|_| Error::FrameTooLarge {
        len: u32::MAX,
        max: u32::MAX,
    })?;
    w.write_all(&len.to_le_bytes())?;
    w.write_all(buf.as_bytes())?;
    w.flush()?;
    Ok(())
}

/// Reads one frame from `r` into `buf`, replacing its contents.
///
/// Frames announcing more than `max` bytes are rejected before any payload
/// is read.
pub fn recv<R: Read>(r: &mut R, buf: &mut Buffer, max: u32) -> Result<()> {
    let mut header = [0u8; 4];
    r.read_exact(&mut header)?;
    let len = u32::from_le_bytes(header);
    if len > max {
        return Err(Error::FrameTooLarge { len, max });
    }
    buf.fill_from(r, len as usize)
}
