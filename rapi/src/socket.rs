//! Duplex byte stream to a device.
//!
//! A [`Socket`] is either a direct TCP connection, a Unix-domain connection
//! to a local proxy, or a descriptor adopted from a connection broker. All
//! three look the same to the call layer: frames go out with
//! [`Socket::send`] and come back with [`Socket::recv`].

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd};
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use nix::sys::socket::{AddressFamily, SockaddrLike, SockaddrStorage, getsockname};
use rapi_proto::Buffer;
use tracing::debug;

use crate::{Error, Result};

/// Concrete stream behind a [`Socket`].
#[derive(Debug)]
enum Stream {
    /// TCP, either dialled directly or adopted from a broker.
    Tcp(TcpStream),
    /// Unix-domain, to a proxy or adopted from a broker.
    Unix(UnixStream),
}

impl Stream {
    /// Duplicates the underlying descriptor.
    fn try_clone(&self) -> io::Result<Self> {
        Ok(match self {
            Self::Tcp(s) => Self::Tcp(s.try_clone()?),
            Self::Unix(s) => Self::Unix(s.try_clone()?),
        })
    }

    /// Shuts down both directions, waking any blocked reader or writer.
    fn shutdown(&self) -> io::Result<()> {
        match self {
            Self::Tcp(s) => s.shutdown(Shutdown::Both),
            Self::Unix(s) => s.shutdown(Shutdown::Both),
        }
    }

    /// Applies the same deadline to reads and writes.
    fn set_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        match self {
            Self::Tcp(s) => {
                s.set_read_timeout(timeout)?;
                s.set_write_timeout(timeout)
            }
            Self::Unix(s) => {
                s.set_read_timeout(timeout)?;
                s.set_write_timeout(timeout)
            }
        }
    }
}

impl Read for Stream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Tcp(s) => s.read(buf),
            Self::Unix(s) => s.read(buf),
        }
    }
}

impl Write for Stream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Tcp(s) => s.write(buf),
            Self::Unix(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Tcp(s) => s.flush(),
            Self::Unix(s) => s.flush(),
        }
    }
}

/// Connection to a device. Starts closed.
#[derive(Debug, Default)]
pub struct Socket {
    /// Open stream, or `None` when closed.
    stream: Option<Stream>,
}

impl Socket {
    /// Creates a closed socket.
    pub const fn new() -> Self {
        Self { stream: None }
    }

    /// Returns `true` if a stream is attached.
    pub const fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    /// Dials `host:port` over TCP, trying each resolved address in turn.
    ///
    /// Any previously open stream is closed first.
    pub fn connect(&mut self, host: &str, port: u16, timeout: Option<Duration>) -> Result<()> {
        self.close();
        let mut last = None;
        for addr in (host, port).to_socket_addrs().map_err(Error::Transport)? {
            let attempt = match timeout {
                Some(t) => TcpStream::connect_timeout(&addr, t),
                None => TcpStream::connect(addr),
            };
            match attempt {
                Ok(stream) => {
                    stream.set_nodelay(true).map_err(Error::Transport)?;
                    debug!(%addr, "connected");
                    self.stream = Some(Stream::Tcp(stream));
                    return Ok(());
                }
                Err(e) => {
                    debug!(%addr, error = %e, "connect attempt failed");
                    last = Some(e);
                }
            }
        }
        Err(Error::Transport(last.unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("no address for {host}"))
        })))
    }

    /// Connects to the proxy socket `<dir>/<identifier>.sock`.
    pub fn connect_proxy(&mut self, dir: &Path, identifier: &str) -> Result<()> {
        self.close();
        if identifier.is_empty() || identifier.contains('/') {
            return Err(Error::InvalidArgument("proxy identifier"));
        }
        let path = dir.join(format!("{identifier}.sock"));
        let stream = UnixStream::connect(&path).map_err(Error::Transport)?;
        debug!(path = %path.display(), "connected to proxy");
        self.stream = Some(Stream::Unix(stream));
        Ok(())
    }

    /// Adopts an already-connected descriptor. The socket takes ownership.
    pub fn take_descriptor(&mut self, fd: OwnedFd) -> Result<()> {
        self.close();
        let stream = match socket_family(fd.as_fd()).map_err(Error::Transport)? {
            Some(AddressFamily::Inet | AddressFamily::Inet6) => Stream::Tcp(TcpStream::from(fd)),
            Some(AddressFamily::Unix) => Stream::Unix(UnixStream::from(fd)),
            family => {
                return Err(Error::Transport(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("unsupported socket family {family:?}"),
                )));
            }
        };
        self.stream = Some(stream);
        Ok(())
    }

    /// Sets the send/receive deadline. `None` blocks indefinitely.
    pub fn set_io_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.stream()?.set_timeout(timeout).map_err(Error::Transport)
    }

    /// Sends the whole buffer as one frame.
    pub fn send(&mut self, buf: &Buffer) -> Result<()> {
        rapi_proto::send(self.stream_mut()?, buf)?;
        Ok(())
    }

    /// Receives one frame into `buf`.
    pub fn recv(&mut self, buf: &mut Buffer, max_frame: u32) -> Result<()> {
        rapi_proto::recv(self.stream_mut()?, buf, max_frame)?;
        Ok(())
    }

    /// Writes raw bytes, retrying partial writes.
    pub fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        let stream = self.stream_mut()?;
        stream.write_all(bytes).and_then(|()| stream.flush()).map_err(Error::Transport)
    }

    /// Fills `bytes` exactly, retrying partial reads.
    pub fn read_exact(&mut self, bytes: &mut [u8]) -> Result<()> {
        self.stream_mut()?.read_exact(bytes).map_err(Error::Transport)
    }

    /// Closes the stream. Closing a closed socket does nothing.
    pub fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(e) = stream.shutdown() {
                debug!(error = %e, "shutdown on close failed");
            }
        }
    }

    /// Returns a handle that can shut this socket down from another thread.
    pub fn interrupt_handle(&self) -> Result<InterruptHandle> {
        let stream = self.stream()?.try_clone().map_err(Error::Transport)?;
        Ok(InterruptHandle {
            stream: Arc::new(stream),
        })
    }

    /// Open stream, or `NotConnected`.
    fn stream(&self) -> Result<&Stream> {
        self.stream.as_ref().ok_or(Error::NotConnected)
    }

    /// Open stream, or `NotConnected`.
    fn stream_mut(&mut self) -> Result<&mut Stream> {
        self.stream.as_mut().ok_or(Error::NotConnected)
    }
}

impl Drop for Socket {
    fn drop(&mut self) {
        self.close();
    }
}

/// Aborts blocked I/O on a [`Socket`] from another thread.
///
/// After [`interrupt`](Self::interrupt), a call blocked in send or receive
/// fails with [`Error::Transport`].
#[derive(Debug, Clone)]
pub struct InterruptHandle {
    /// Duplicate of the socket's descriptor.
    stream: Arc<Stream>,
}

impl InterruptHandle {
    /// Shuts the connection down in both directions.
    pub fn interrupt(&self) {
        match self.stream.shutdown() {
            Ok(()) => debug!("socket interrupted"),
            Err(e) if e.kind() == io::ErrorKind::NotConnected => {}
            Err(e) => debug!(error = %e, "interrupt failed"),
        }
    }
}

/// Address family of a socket descriptor.
fn socket_family(fd: BorrowedFd<'_>) -> io::Result<Option<AddressFamily>> {
    let addr: SockaddrStorage = getsockname(fd.as_raw_fd())?;
    Ok(addr.family())
}

#[cfg(test)]
mod tests {
    use std::net::TcpListener;
    use std::thread;

    use super::*;

    #[test]
    fn operations_on_closed_socket_fail() {
        let mut socket = Socket::new();
        let mut buf = Buffer::new();
        assert!(matches!(socket.send(&buf), Err(Error::NotConnected)));
        assert!(matches!(
            socket.recv(&mut buf, 64),
            Err(Error::NotConnected)
        ));
        assert!(socket.interrupt_handle().is_err());
    }

    #[test]
    fn close_is_idempotent() {
        let (a, _b) = UnixStream::pair().unwrap();
        let mut socket = Socket::new();
        socket.take_descriptor(OwnedFd::from(a)).unwrap();
        assert!(socket.is_open());
        socket.close();
        socket.close();
        assert!(!socket.is_open());
    }

    #[test]
    fn frames_over_adopted_unix_descriptor() {
        let (a, mut b) = UnixStream::pair().unwrap();
        let mut socket = Socket::new();
        socket.take_descriptor(OwnedFd::from(a)).unwrap();
        assert!(matches!(socket.stream, Some(Stream::Unix(_))));

        let mut buf = Buffer::new();
        buf.write_u32(7).unwrap();
        socket.send(&buf).unwrap();

        let mut wire = [0u8; 8];
        b.read_exact(&mut wire).unwrap();
        assert_eq!(wire, [4, 0, 0, 0, 7, 0, 0, 0]);

        b.write_all(&[2, 0, 0, 0, 0x34, 0x12]).unwrap();
        socket.recv(&mut buf, 64).unwrap();
        assert_eq!(buf.read_u16().unwrap(), 0x1234);
    }

    #[test]
    fn adopts_tcp_descriptor() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let _server = listener.accept().unwrap();

        let mut socket = Socket::new();
        socket.take_descriptor(OwnedFd::from(client)).unwrap();
        assert!(matches!(socket.stream, Some(Stream::Tcp(_))));
    }

    #[test]
    fn rejects_non_socket_descriptor() {
        let file = tempfile::tempfile().unwrap();
        let mut socket = Socket::new();
        assert!(matches!(
            socket.take_descriptor(OwnedFd::from(file)),
            Err(Error::Transport(_))
        ));
        assert!(!socket.is_open());
    }

    #[test]
    fn peer_close_is_transport_error() {
        let (a, b) = UnixStream::pair().unwrap();
        let mut socket = Socket::new();
        socket.take_descriptor(OwnedFd::from(a)).unwrap();
        drop(b);
        let mut buf = Buffer::new();
        assert!(matches!(
            socket.recv(&mut buf, 64),
            Err(Error::Transport(_))
        ));
    }

    #[test]
    fn connect_reaches_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = thread::spawn(move || {
            let (mut conn, _) = listener.accept().unwrap();
            let mut byte = [0u8; 1];
            conn.read_exact(&mut byte).unwrap();
            byte[0]
        });

        let mut socket = Socket::new();
        socket.connect("127.0.0.1", port, None).unwrap();
        socket.write_all(&[0x5A]).unwrap();
        assert_eq!(server.join().unwrap(), 0x5A);
    }

    #[test]
    fn connect_proxy_uses_identifier_socket() {
        let dir = tempfile::tempdir().unwrap();
        let _listener =
            std::os::unix::net::UnixListener::bind(dir.path().join("dev1.sock")).unwrap();
        let mut socket = Socket::new();
        socket.connect_proxy(dir.path(), "dev1").unwrap();
        assert!(matches!(socket.stream, Some(Stream::Unix(_))));
        assert!(matches!(
            socket.connect_proxy(dir.path(), "../x"),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn interrupt_unblocks_reader() {
        let (a, _b) = UnixStream::pair().unwrap();
        let mut socket = Socket::new();
        socket.take_descriptor(OwnedFd::from(a)).unwrap();
        let handle = socket.interrupt_handle().unwrap();

        let reader = thread::spawn(move || {
            let mut buf = Buffer::new();
            socket.recv(&mut buf, 64)
        });
        thread::sleep(Duration::from_millis(50));
        handle.interrupt();
        assert!(matches!(
            reader.join().unwrap(),
            Err(Error::Transport(_))
        ));
    }
}
