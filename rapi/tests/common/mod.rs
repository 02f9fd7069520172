//! In-process fake device for integration tests.

#![allow(dead_code, clippy::unwrap_used, clippy::missing_panics_doc)]

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread::{self, JoinHandle};

use rapi::{Config, DeviceInfo};

/// Fake device listening on a loopback port.
pub struct FakeDevice {
    /// Port to point `Config::rapi_port` at.
    pub port: u16,
    /// Device-side thread; join to surface its assertion failures.
    pub thread: JoinHandle<()>,
}

/// Accepts one connection and hands it to `script`.
pub fn serve(script: impl FnOnce(TcpStream) + Send + 'static) -> FakeDevice {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let thread = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        script(stream);
    });
    FakeDevice { port, thread }
}

/// Config pointing direct connections at `port`.
pub fn config(port: u16) -> Config {
    let mut config = Config::default();
    config.rapi_port = port;
    config.io_timeout_ms = Some(5_000);
    config
}

/// Info for a direct (legacy) device on loopback.
pub fn legacy_info() -> DeviceInfo {
    let mut info = DeviceInfo::new("pocket_pc");
    info.transport = Some("ppp".into());
    info.device_ip = Some("127.0.0.1".into());
    info.dccm_pid = Some(std::process::id());
    info.os_major = 4;
    info.os_minor = 20;
    info
}

/// Reads one `[u32 LE len][bytes]` frame.
pub fn read_frame(stream: &mut impl Read) -> Vec<u8> {
    let mut len = [0u8; 4];
    stream.read_exact(&mut len).unwrap();
    let mut body = vec![0u8; u32::from_le_bytes(len) as usize];
    stream.read_exact(&mut body).unwrap();
    body
}

/// Writes one `[u32 LE len][bytes]` frame.
pub fn write_frame(stream: &mut impl Write, body: &[u8]) {
    let len = u32::try_from(body.len()).unwrap();
    stream.write_all(&len.to_le_bytes()).unwrap();
    stream.write_all(body).unwrap();
    stream.flush().unwrap();
}

/// Concatenates little-endian words.
pub fn words(values: &[u32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Opcode at the start of a request.
pub fn opcode(request: &[u8]) -> u32 {
    u32::from_le_bytes(request[..4].try_into().unwrap())
}

/// `[u32 unit count][UTF-16LE]`, the v1 string form.
pub fn counted(text: &str) -> Vec<u8> {
    let units: Vec<u16> = text.encode_utf16().collect();
    let mut out = u32::try_from(units.len()).unwrap().to_le_bytes().to_vec();
    out.extend(units.iter().flat_map(|u| u.to_le_bytes()));
    out
}

/// `[u32 byte length][UTF-16LE][0u16]`, the v2 string form.
pub fn terminated(text: &str) -> Vec<u8> {
    let mut units: Vec<u16> = text.encode_utf16().collect();
    units.push(0);
    let mut out = u32::try_from(units.len() * 2).unwrap().to_le_bytes().to_vec();
    out.extend(units.iter().flat_map(|u| u.to_le_bytes()));
    out
}

/// Waits for the peer to close; panics if it sends anything.
pub fn expect_eof(stream: &mut impl Read) {
    let mut byte = [0u8; 1];
    assert_eq!(stream.read(&mut byte).unwrap(), 0, "expected the peer to close");
}
