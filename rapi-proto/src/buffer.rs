//! Growable little-endian wire buffer with a read cursor.
//!
//! All integers are little-endian. Strings are UTF-16LE with a 4-byte
//! length prefix. Optional fields carry a 4-byte presence flag (`1` or
//! `0`) so the receiver can tell an empty value from an absent one.
//!
//! A failed write never leaves a half-encoded field behind, and a failed
//! read never moves the cursor.

use std::io::Read;

use crate::error::{Error, Result};

/// Presence flag written before an optional field that carries a value.
const PRESENT: u32 = 1;

/// Presence flag written before an optional field that is absent.
const ABSENT: u32 = 0;

/// Bytes used by one UTF-16 code unit on the wire.
const UNIT: usize = 2;

/// Ordered byte sequence plus a read cursor.
///
/// The same buffer is reused for a request and its reply: the caller
/// [`reset`](Self::reset)s it, writes the request, then the transport
/// replaces the contents with the reply via [`fill_from`](Self::fill_from).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Buffer {
    /// Encoded bytes.
    data: Vec<u8>,
    /// Read cursor into `data`.
    pos: usize,
}

impl Buffer {
    /// Creates an empty buffer.
    pub const fn new() -> Self {
        Self {
            data: Vec::new(),
            pos: 0,
        }
    }

    /// Creates an empty buffer that can hold `capacity` bytes without growing.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            pos: 0,
        }
    }

    /// Discards the contents and rewinds the cursor. Capacity is kept.
    pub fn reset(&mut self) {
        self.data.clear();
        self.pos = 0;
    }

    /// Number of bytes written.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Bytes between the read cursor and the end of the data.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Current read cursor offset.
    pub const fn position(&self) -> usize {
        self.pos
    }

    /// Raw encoded bytes, independent of the read cursor.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Replaces the contents with exactly `len` bytes read from `r`.
    ///
    /// The cursor is rewound to the start. On a short read the buffer is
    /// left empty.
    pub fn fill_from<R: Read>(&mut self, r: &mut R, len: usize) -> Result<()> {
        self.reset();
        self.grow(len)?;
        self.data.resize(len, 0);
        if let Err(e) = r.read_exact(&mut self.data) {
            self.reset();
            return Err(e.into());
        }
        Ok(())
    }

    /// Reserves room for `additional` bytes, reporting allocation failure.
    fn grow(&mut self, additional: usize) -> Result<()> {
        self.data
            .try_reserve(additional)
            .map_err(|_| Error::Alloc {
                requested: additional,
            })
    }

    // ---- writes ----

    /// Appends raw bytes.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.grow(bytes.len())?;
        self.data.extend_from_slice(bytes);
        Ok(())
    }

    /// Appends a little-endian `u16`.
    pub fn write_u16(&mut self, value: u16) -> Result<()> {
        self.write_bytes(&value.to_le_bytes())
    }

    /// Appends a little-endian `u32`.
    pub fn write_u32(&mut self, value: u32) -> Result<()> {
        self.write_bytes(&value.to_le_bytes())
    }

    /// Appends a little-endian `i32`.
    pub fn write_i32(&mut self, value: i32) -> Result<()> {
        self.write_bytes(&value.to_le_bytes())
    }

    /// Appends `[u32 unit count][UTF-16LE units]` with no terminator.
    pub fn write_string(&mut self, text: &str) -> Result<()> {
        let units: Vec<u16> = text.encode_utf16().collect();
        let count = u32::try_from(units.len()).map_err(|_| Error::StringTooLong {
            units: units.len(),
        })?;
        self.write_prefixed_units(count, &units)
    }

    /// Appends `[u32 byte length][UTF-16LE units][0u16]`.
    ///
    /// The length counts the terminator.
    pub fn write_terminated_string(&mut self, text: &str) -> Result<()> {
        let mut units: Vec<u16> = text.encode_utf16().collect();
        units.push(0);
        let bytes = units
            .len()
            .checked_mul(UNIT)
            .and_then(|n| u32::try_from(n).ok())
            .ok_or(Error::StringTooLong { units: units.len() })?;
        self.write_prefixed_units(bytes, &units)
    }

    /// Appends a length prefix followed by `units`, all or nothing.
    fn write_prefixed_units(&mut self, prefix: u32, units: &[u16]) -> Result<()> {
        self.grow(4 + units.len() * UNIT)?;
        self.data.extend_from_slice(&prefix.to_le_bytes());
        for unit in units {
            self.data.extend_from_slice(&unit.to_le_bytes());
        }
        Ok(())
    }

    /// Appends a presence flag, then the string if present.
    pub fn write_optional_string(&mut self, text: Option<&str>) -> Result<()> {
        match text {
            Some(text) => {
                let start = self.data.len();
                self.write_u32(PRESENT)?;
                self.write_string(text).inspect_err(|_| self.data.truncate(start))
            }
            None => self.write_u32(ABSENT),
        }
    }

    /// Appends a presence flag, then the value if present.
    pub fn write_optional_u32(&mut self, value: Option<u32>) -> Result<()> {
        match value {
            Some(value) => {
                let mut field = [0u8; 8];
                field[..4].copy_from_slice(&PRESENT.to_le_bytes());
                field[4..].copy_from_slice(&value.to_le_bytes());
                self.write_bytes(&field)
            }
            None => self.write_u32(ABSENT),
        }
    }

    /// Appends an input parameter: presence flag, then `[u32 size][bytes]`.
    pub fn write_optional_in(&mut self, data: Option<&[u8]>) -> Result<()> {
        match data {
            Some(data) => {
                let size = u32::try_from(data.len()).map_err(|_| Error::FieldTooLarge {
                    size: data.len(),
                    max: u32::MAX as usize,
                })?;
                self.grow(8 + data.len())?;
                self.data.extend_from_slice(&PRESENT.to_le_bytes());
                self.data.extend_from_slice(&size.to_le_bytes());
                self.data.extend_from_slice(data);
                Ok(())
            }
            None => self.write_u32(ABSENT),
        }
    }

    /// Appends an output parameter: presence flag, then the size the
    /// remote side may fill. No data bytes are sent.
    pub fn write_optional_out(&mut self, size: Option<u32>) -> Result<()> {
        self.write_optional_u32(size)
    }

    // ---- reads ----

    /// Consumes `n` bytes, or fails without moving the cursor.
    fn take(&mut self, n: usize) -> Result<&[u8]> {
        let available = self.remaining();
        if n > available {
            return Err(Error::Truncated {
                needed: n,
                available,
            });
        }
        let start = self.pos;
        self.pos += n;
        Ok(&self.data[start..self.pos])
    }

    /// Consumes a fixed-size array.
    fn take_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    /// Runs `f`, rewinding the cursor if it fails.
    fn atomic<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let start = self.pos;
        f(self).inspect_err(|_| self.pos = start)
    }

    /// Consumes `n` raw bytes.
    pub fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>> {
        Ok(self.take(n)?.to_vec())
    }

    /// Consumes a little-endian `u16`.
    pub fn read_u16(&mut self) -> Result<u16> {
        self.take_array().map(u16::from_le_bytes)
    }

    /// Consumes a little-endian `u32`.
    pub fn read_u32(&mut self) -> Result<u32> {
        self.take_array().map(u32::from_le_bytes)
    }

    /// Consumes a little-endian `i32`.
    pub fn read_i32(&mut self) -> Result<i32> {
        self.take_array().map(i32::from_le_bytes)
    }

    /// Consumes `[u32 unit count][UTF-16LE units]`.
    ///
    /// Trailing NUL units are stripped.
    pub fn read_string(&mut self) -> Result<String> {
        self.atomic(|buf| {
            let count = buf.read_u32()? as usize;
            let bytes = count.checked_mul(UNIT).ok_or(Error::Truncated {
                needed: usize::MAX,
                available: buf.remaining(),
            })?;
            decode_utf16(buf.take(bytes)?)
        })
    }

    /// Consumes `[u32 byte length][UTF-16LE units]`, stripping trailing NULs.
    pub fn read_terminated_string(&mut self) -> Result<String> {
        self.atomic(|buf| {
            let bytes = buf.read_u32()? as usize;
            decode_utf16(buf.take(bytes)?)
        })
    }

    /// Consumes a presence flag and, if set, a string.
    pub fn read_optional_string(&mut self) -> Result<Option<String>> {
        self.atomic(|buf| {
            if buf.read_u32()? == ABSENT {
                return Ok(None);
            }
            buf.read_string().map(Some)
        })
    }

    /// Consumes a presence flag and, if set, a `u32`.
    pub fn read_optional_u32(&mut self) -> Result<Option<u32>> {
        self.atomic(|buf| {
            if buf.read_u32()? == ABSENT {
                return Ok(None);
            }
            buf.read_u32().map(Some)
        })
    }

    /// Consumes a presence flag and, if set, `[u32 size][bytes]`.
    ///
    /// Fails with [`Error::FieldTooLarge`] if the announced size is above
    /// `max`.
    pub fn read_optional(&mut self, max: usize) -> Result<Option<Vec<u8>>> {
        self.atomic(|buf| {
            if buf.read_u32()? == ABSENT {
                return Ok(None);
            }
            let size = buf.read_u32()? as usize;
            if size > max {
                return Err(Error::FieldTooLarge { size, max });
            }
            buf.read_bytes(size).map(Some)
        })
    }
}

impl From<Vec<u8>> for Buffer {
    fn from(data: Vec<u8>) -> Self {
        Self { data, pos: 0 }
    }
}

/// Decodes UTF-16LE bytes, dropping trailing NUL units.
fn decode_utf16(bytes: &[u8]) -> Result<String> {
    if bytes.len() % UNIT != 0 {
        return Err(Error::InvalidUtf16);
    }
    let mut units: Vec<u16> = bytes
        .chunks_exact(UNIT)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    while units.last() == Some(&0) {
        units.pop();
    }
    String::from_utf16(&units).map_err(|_| Error::InvalidUtf16)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integers_are_little_endian() {
        let mut buf = Buffer::new();
        buf.write_u32(42).unwrap();
        buf.write_u16(0x0102).unwrap();
        buf.write_i32(-1).unwrap();
        assert_eq!(
            buf.as_bytes(),
            &[0x2A, 0, 0, 0, 0x02, 0x01, 0xFF, 0xFF, 0xFF, 0xFF]
        );
        assert_eq!(buf.read_u32().unwrap(), 42);
        assert_eq!(buf.read_u16().unwrap(), 0x0102);
        assert_eq!(buf.read_i32().unwrap(), -1);
        assert_eq!(buf.remaining(), 0);
    }

    #[test]
    fn string_layout() {
        let mut buf = Buffer::new();
        buf.write_string("Hi").unwrap();
        assert_eq!(buf.as_bytes(), &[2, 0, 0, 0, b'H', 0, b'i', 0]);
    }

    #[test]
    fn terminated_string_counts_nul_in_bytes() {
        let mut buf = Buffer::new();
        buf.write_terminated_string("Hi").unwrap();
        assert_eq!(buf.as_bytes(), &[6, 0, 0, 0, b'H', 0, b'i', 0, 0, 0]);
        assert_eq!(buf.read_terminated_string().unwrap(), "Hi");
    }

    #[test]
    fn read_string_strips_trailing_nuls() {
        let mut buf = Buffer::from(vec![3, 0, 0, 0, b'o', 0, b'k', 0, 0, 0]);
        assert_eq!(buf.read_string().unwrap(), "ok");
    }

    #[test]
    fn non_bmp_string_survives() {
        let mut buf = Buffer::new();
        buf.write_string("\\Temp\\😀.txt").unwrap();
        assert_eq!(buf.read_string().unwrap(), "\\Temp\\😀.txt");
    }

    #[test]
    fn truncated_read_keeps_cursor() {
        let mut buf = Buffer::from(vec![1, 2, 3]);
        let err = buf.read_u32().unwrap_err();
        assert!(matches!(
            err,
            Error::Truncated {
                needed: 4,
                available: 3
            }
        ));
        assert_eq!(buf.position(), 0);
        assert_eq!(buf.read_u16().unwrap(), 0x0201);
    }

    #[test]
    fn truncated_string_body_rewinds_prefix() {
        // Announces 4 units but carries only one.
        let mut buf = Buffer::from(vec![4, 0, 0, 0, b'a', 0]);
        assert!(matches!(buf.read_string(), Err(Error::Truncated { .. })));
        assert_eq!(buf.position(), 0);
    }

    #[test]
    fn unpaired_surrogate_is_rejected() {
        let mut buf = Buffer::from(vec![1, 0, 0, 0, 0x00, 0xD8]);
        assert!(matches!(buf.read_string(), Err(Error::InvalidUtf16)));
    }

    #[test]
    fn optional_fields_distinguish_absent_and_empty() {
        let mut buf = Buffer::new();
        buf.write_optional_in(None).unwrap();
        buf.write_optional_in(Some(&[])).unwrap();
        buf.write_optional_in(Some(b"abc")).unwrap();
        buf.write_optional_out(Some(512)).unwrap();
        buf.write_optional_u32(None).unwrap();

        assert_eq!(
            &buf.as_bytes()[..12],
            &[0, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0]
        );
        assert_eq!(buf.read_optional(16).unwrap(), None);
        assert_eq!(buf.read_optional(16).unwrap(), Some(Vec::new()));
        assert_eq!(buf.read_optional(16).unwrap(), Some(b"abc".to_vec()));
        assert_eq!(buf.read_optional_u32().unwrap(), Some(512));
        assert_eq!(buf.read_optional_u32().unwrap(), None);
        assert_eq!(buf.remaining(), 0);
    }

    #[test]
    fn optional_string_roundtrip() {
        let mut buf = Buffer::new();
        buf.write_optional_string(Some("cmd")).unwrap();
        buf.write_optional_string(None).unwrap();
        assert_eq!(buf.read_optional_string().unwrap().as_deref(), Some("cmd"));
        assert_eq!(buf.read_optional_string().unwrap(), None);
    }

    /// Writes one field of every kind, including empty strings.
    fn mixed_record() -> Buffer {
        let mut buf = Buffer::new();
        buf.write_u16(0xBEEF).unwrap();
        buf.write_u32(0xDEAD_BEEF).unwrap();
        buf.write_string("").unwrap();
        buf.write_string(r"\Temp\😀.txt").unwrap();
        buf.write_terminated_string("").unwrap();
        buf.write_terminated_string("Ident").unwrap();
        buf.write_optional_string(Some("")).unwrap();
        buf.write_optional_string(Some("cmd /c")).unwrap();
        buf.write_optional_in(Some(b"xyz")).unwrap();
        buf.write_optional_u32(Some(7)).unwrap();
        buf
    }

    /// Reads back what [`mixed_record`] wrote.
    fn read_mixed(buf: &mut Buffer) -> Result<()> {
        assert_eq!(buf.read_u16()?, 0xBEEF);
        assert_eq!(buf.read_u32()?, 0xDEAD_BEEF);
        assert_eq!(buf.read_string()?, "");
        assert_eq!(buf.read_string()?, r"\Temp\😀.txt");
        assert_eq!(buf.read_terminated_string()?, "");
        assert_eq!(buf.read_terminated_string()?, "Ident");
        assert_eq!(buf.read_optional_string()?.as_deref(), Some(""));
        assert_eq!(buf.read_optional_string()?.as_deref(), Some("cmd /c"));
        assert_eq!(buf.read_optional(16)?, Some(b"xyz".to_vec()));
        assert_eq!(buf.read_optional_u32()?, Some(7));
        Ok(())
    }

    #[test]
    fn mixed_record_roundtrip() {
        let mut buf = mixed_record();
        assert_eq!(&buf.as_bytes()[6..10], &[0, 0, 0, 0]);
        read_mixed(&mut buf).unwrap();
        assert_eq!(buf.remaining(), 0);
    }

    #[test]
    fn every_truncation_point_is_reported() {
        let bytes = mixed_record().as_bytes().to_vec();
        for cut in 0..bytes.len() {
            let mut buf = Buffer::from(bytes[..cut].to_vec());
            let result = read_mixed(&mut buf);
            assert!(
                matches!(result, Err(Error::Truncated { .. })),
                "cut at {cut}: {result:?}"
            );
        }
    }

    #[test]
    fn oversized_optional_is_rejected() {
        let mut buf = Buffer::new();
        buf.write_optional_in(Some(&[0u8; 32])).unwrap();
        assert!(matches!(
            buf.read_optional(8),
            Err(Error::FieldTooLarge { size: 32, max: 8 })
        ));
        assert_eq!(buf.position(), 0);
    }

    #[test]
    fn reset_keeps_capacity() {
        let mut buf = Buffer::with_capacity(64);
        buf.write_bytes(&[1; 40]).unwrap();
        let cap = buf.data.capacity();
        buf.reset();
        assert!(buf.is_empty());
        assert_eq!(buf.position(), 0);
        assert_eq!(buf.data.capacity(), cap);
    }

    #[test]
    fn fill_from_replaces_contents() {
        let mut buf = Buffer::new();
        buf.write_u32(7).unwrap();
        let mut src: &[u8] = &[9, 0, 0, 0, 0xAA];
        buf.fill_from(&mut src, 4).unwrap();
        assert_eq!(buf.read_u32().unwrap(), 9);
        assert_eq!(src, &[0xAA]);
    }

    #[test]
    fn fill_from_short_stream_leaves_buffer_empty() {
        let mut buf = Buffer::new();
        let mut src: &[u8] = &[1, 2];
        assert!(matches!(buf.fill_from(&mut src, 4), Err(Error::Io(_))));
        assert!(buf.is_empty());
    }
}
