//! Descriptor handoff from a connection broker.
//!
//! A broker is a long-running process that owns the physical link to a
//! device. It listens on a Unix-domain socket; a client connects, and the
//! broker answers with exactly one connected descriptor in an `SCM_RIGHTS`
//! control message.

use std::fmt;
use std::io::{self, IoSlice, IoSliceMut};
use std::os::fd::{AsRawFd, BorrowedFd, FromRawFd, OwnedFd, RawFd};
use std::os::unix::net::UnixStream;

use nix::errno::Errno;
use nix::sys::signal;
use nix::sys::socket::{ControlMessage, ControlMessageOwned, MsgFlags, recvmsg, sendmsg};
use nix::unistd::Pid;
use tracing::{debug, warn};

use crate::info::DeviceInfo;
use crate::{Error, Result};

/// Supplies a connected descriptor for a device.
pub trait Broker: Send + Sync + fmt::Debug {
    /// Requests a connection to the device described by `info`.
    fn request_connection(&self, info: &DeviceInfo) -> Result<OwnedFd>;
}

/// Broker reached through the Unix socket recorded in
/// [`DeviceInfo::broker_socket`].
#[derive(Debug, Default, Clone, Copy)]
#[non_exhaustive]
pub struct UnixBroker;

impl UnixBroker {
    /// Creates a broker client.
    pub const fn new() -> Self {
        Self
    }
}

impl Broker for UnixBroker {
    fn request_connection(&self, info: &DeviceInfo) -> Result<OwnedFd> {
        let path = info
            .broker_socket
            .as_deref()
            .ok_or_else(|| Error::Broker(format!("no broker socket recorded for {}", info.name)))?;
        debug!(path = %path.display(), device = %info.name, "requesting connection from broker");
        let stream = UnixStream::connect(path)
            .map_err(|e| Error::Broker(format!("{}: {e}", path.display())))?;
        recv_descriptor(&stream)
    }
}

/// Receives exactly one descriptor from `stream`.
///
/// Fails if the peer closes without sending one, or sends more than one.
/// Extra descriptors are closed.
pub fn recv_descriptor(stream: &UnixStream) -> Result<OwnedFd> {
    let mut fds = recv_fds(stream).map_err(|e| Error::Broker(e.to_string()))?;
    match fds.len() {
        1 => fds.pop().ok_or_else(|| Error::Broker("descriptor vanished".into())),
        0 => Err(Error::Broker("broker closed without a descriptor".into())),
        n => {
            warn!(count = n, "broker sent more than one descriptor");
            Err(Error::Broker(format!("expected one descriptor, got {n}")))
        }
    }
}

/// Sends `fd` over `stream` with a one-byte payload.
///
/// This is the broker side of the handoff.
pub fn send_descriptor(stream: &UnixStream, fd: BorrowedFd<'_>) -> io::Result<()> {
    let fds = [fd.as_raw_fd()];
    let payload = [0u8; 1];
    let iov = [IoSlice::new(&payload)];
    let cmsg = [ControlMessage::ScmRights(&fds)];
    sendmsg::<()>(stream.as_raw_fd(), &iov, &cmsg, MsgFlags::empty(), None)?;
    Ok(())
}

/// Reads one message and collects every descriptor it carried.
fn recv_fds(stream: &UnixStream) -> nix::Result<Vec<OwnedFd>> {
    let mut payload = [0u8; 16];
    let mut iov = [IoSliceMut::new(&mut payload)];
    let mut control = nix::cmsg_space!([RawFd; 4]);

    loop {
        let received = recvmsg::<()>(
            stream.as_raw_fd(),
            &mut iov,
            Some(&mut control),
            cmsg_cloexec(),
        );
        let msg = match received {
            Ok(msg) => msg,
            Err(Errno::EINTR) => continue,
            Err(e) => return Err(e),
        };

        let mut fds = Vec::new();
        for cmsg in msg.cmsgs()? {
            if let ControlMessageOwned::ScmRights(raw) = cmsg {
                fds.extend(raw.into_iter().map(adopt));
            }
        }
        if msg.bytes == 0 && fds.is_empty() {
            debug!("broker closed the handoff socket");
        }
        return Ok(fds);
    }
}

/// Takes ownership of a descriptor received over `SCM_RIGHTS`.
#[allow(unsafe_code)]
fn adopt(raw: RawFd) -> OwnedFd {
    // SAFETY: the kernel installed `raw` in this process for this message
    // and nothing else holds it.
    unsafe { OwnedFd::from_raw_fd(raw) }
}

/// Flags that mark received descriptors close-on-exec where supported.
#[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]
const fn cmsg_cloexec() -> MsgFlags {
    MsgFlags::MSG_CMSG_CLOEXEC
}

/// Flags that mark received descriptors close-on-exec where supported.
#[cfg(not(any(target_os = "linux", target_os = "android", target_os = "freebsd")))]
const fn cmsg_cloexec() -> MsgFlags {
    MsgFlags::empty()
}

/// Checks whether a process exists via `kill(pid, 0)`.
///
/// A permission error means the process exists but belongs to someone
/// else, so it counts as alive.
pub fn is_process_alive(pid: u32) -> bool {
    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    if raw <= 0 {
        return false;
    }
    match signal::kill(Pid::from_raw(raw), None) {
        Ok(()) | Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::os::fd::AsFd;
    use std::os::unix::net::UnixListener;
    use std::path::PathBuf;
    use std::thread;

    use super::*;

    #[test]
    fn descriptor_survives_handoff() {
        let (client, broker) = UnixStream::pair().unwrap();
        let (device_end, mut far_end) = UnixStream::pair().unwrap();

        send_descriptor(&broker, device_end.as_fd()).unwrap();
        drop(device_end);

        let fd = recv_descriptor(&client).unwrap();
        let mut adopted = UnixStream::from(fd);
        adopted.write_all(b"ping").unwrap();
        let mut got = [0u8; 4];
        far_end.read_exact(&mut got).unwrap();
        assert_eq!(&got, b"ping");
    }

    #[test]
    fn close_without_descriptor_fails() {
        let (client, broker) = UnixStream::pair().unwrap();
        drop(broker);
        assert!(matches!(recv_descriptor(&client), Err(Error::Broker(_))));
    }

    #[test]
    fn two_descriptors_are_rejected() {
        let (client, broker) = UnixStream::pair().unwrap();
        let (first, _far_first) = UnixStream::pair().unwrap();
        let (second, _far_second) = UnixStream::pair().unwrap();
        let fds = [first.as_raw_fd(), second.as_raw_fd()];
        sendmsg::<()>(
            broker.as_raw_fd(),
            &[IoSlice::new(&[0])],
            &[ControlMessage::ScmRights(&fds)],
            MsgFlags::empty(),
            None,
        )
        .unwrap();

        assert!(matches!(recv_descriptor(&client), Err(Error::Broker(_))));
    }

    #[test]
    fn plain_bytes_without_descriptor_fail() {
        let (client, mut broker) = UnixStream::pair().unwrap();
        broker.write_all(b"x").unwrap();
        assert!(matches!(recv_descriptor(&client), Err(Error::Broker(_))));
    }

    #[test]
    fn unix_broker_uses_recorded_socket() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broker.sock");
        let listener = UnixListener::bind(&path).unwrap();
        let server = thread::spawn(move || {
            let (conn, _) = listener.accept().unwrap();
            let (device_end, mut far_end) = UnixStream::pair().unwrap();
            send_descriptor(&conn, device_end.as_fd()).unwrap();
            let mut got = [0u8; 2];
            far_end.read_exact(&mut got).unwrap();
            got
        });

        let mut info = DeviceInfo::new("pda");
        info.broker_socket = Some(path);
        let fd = UnixBroker::new().request_connection(&info).unwrap();
        UnixStream::from(fd).write_all(b"ok").unwrap();
        assert_eq!(&server.join().unwrap(), b"ok");
    }

    #[test]
    fn missing_broker_socket_fails() {
        let info = DeviceInfo::new("pda");
        assert!(matches!(
            UnixBroker::new().request_connection(&info),
            Err(Error::Broker(_))
        ));

        let mut info = DeviceInfo::new("pda");
        info.broker_socket = Some(PathBuf::from("/nonexistent/broker.sock"));
        assert!(matches!(
            UnixBroker::new().request_connection(&info),
            Err(Error::Broker(_))
        ));
    }

    #[test]
    fn own_process_is_alive() {
        assert!(is_process_alive(std::process::id()));
        assert!(!is_process_alive(0));
        assert!(!is_process_alive(u32::MAX));
    }
}
