//! Per-connection call context.
//!
//! A [`CallContext`] owns one socket and one request/reply buffer pair and
//! moves between two states:
//!
//! ```text
//! Disconnected --connect()--> Connected --disconnect()--> Disconnected
//! ```
//!
//! The dialect is recorded only while connected, so "has a dialect" and
//! "is initialized" are the same thing. Every call checks it first and
//! fails with [`Error::NotConnected`] without touching the socket.

use std::sync::Arc;

use rapi_proto::status::{
    E_FAIL, E_UNEXPECTED, ERROR_FILENAME_EXCED_RANGE, ERROR_NOT_CONNECTED, S_OK,
};
use rapi_proto::{Buffer, Command, password};
use tracing::{debug, error, warn};

use crate::broker::{self, Broker, UnixBroker};
use crate::config::Config;
use crate::dialect::Dialect;
use crate::info::{DeviceInfo, TransportKind};
use crate::resolver::{FileResolver, Resolver, Selector};
use crate::socket::{InterruptHandle, Socket};
use crate::{Error, Result};

/// Socket plus the request/reply buffer pair it services.
#[derive(Debug)]
pub(crate) struct Link {
    /// Connection to the device.
    socket: Socket,
    /// Outgoing request.
    request: Buffer,
    /// Incoming reply.
    reply: Buffer,
    /// Largest reply frame accepted.
    max_frame: u32,
}

impl Link {
    /// Sends the request and replaces the reply buffer with the answer.
    pub(crate) fn exchange(&mut self) -> Result<()> {
        self.socket.send(&self.request).inspect_err(|e| {
            error!(error = %e, "send failed");
        })?;
        self.socket
            .recv(&mut self.reply, self.max_frame)
            .inspect_err(|e| error!(error = %e, "receive failed"))
    }

    /// Reply buffer.
    pub(crate) const fn reply_mut(&mut self) -> &mut Buffer {
        &mut self.reply
    }
}

/// One device connection and its call state.
///
/// Not meant for concurrent use: a context serves one call at a time. Use
/// [`interrupt_handle`](Self::interrupt_handle) to abort a blocked call
/// from another thread.
#[derive(Debug)]
pub struct CallContext {
    /// Transport settings.
    config: Config,
    /// Source of device info when none is supplied.
    resolver: Arc<dyn Resolver>,
    /// Source of descriptors for brokered transports.
    broker: Arc<dyn Broker>,
    /// Device to resolve when none is supplied.
    selector: Selector,
    /// Device info, either supplied or resolved by `connect`.
    info: Option<Arc<DeviceInfo>>,
    /// Whether `info` was resolved by this context and goes away on
    /// disconnect.
    owns_info: bool,
    /// Socket and buffers.
    link: Link,
    /// Selected dialect; `Some` exactly while connected.
    dialect: Option<Dialect>,
    /// Protocol error channel (HRESULT).
    rapi_error: u32,
    /// System error channel (Win32 code reported by the device).
    last_error: u32,
}

impl CallContext {
    /// Creates a disconnected context.
    ///
    /// Device info is resolved from `config.info_dir` unless supplied with
    /// [`with_info`](Self::with_info) or a different resolver.
    pub fn new(config: Config) -> Self {
        let resolver = Arc::new(FileResolver::new(&config.info_dir));
        let max_frame = config.max_frame;
        Self {
            config,
            resolver,
            broker: Arc::new(UnixBroker::new()),
            selector: Selector::Default,
            info: None,
            owns_info: false,
            link: Link {
                socket: Socket::new(),
                request: Buffer::new(),
                reply: Buffer::new(),
                max_frame,
            },
            dialect: None,
            rapi_error: E_UNEXPECTED,
            last_error: 0,
        }
    }

    /// Uses `resolver` to look up device info on connect.
    #[must_use]
    pub fn with_resolver(mut self, resolver: Arc<dyn Resolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Uses `broker` for brokered transports.
    #[must_use]
    pub fn with_broker(mut self, broker: Arc<dyn Broker>) -> Self {
        self.broker = broker;
        self
    }

    /// Resolves this device instead of the default one.
    #[must_use]
    pub fn with_selector(mut self, selector: Selector) -> Self {
        self.selector = selector;
        self
    }

    /// Borrows device info from a longer-lived owner. It is kept across
    /// disconnects.
    #[must_use]
    pub fn with_info(mut self, info: Arc<DeviceInfo>) -> Self {
        self.info = Some(info);
        self.owns_info = false;
        self
    }

    /// Returns `true` while connected.
    pub const fn is_initialized(&self) -> bool {
        self.dialect.is_some()
    }

    /// Dialect selected at connect time.
    pub const fn dialect(&self) -> Option<Dialect> {
        self.dialect
    }

    /// Device info in use, if any.
    pub const fn info(&self) -> Option<&Arc<DeviceInfo>> {
        self.info.as_ref()
    }

    /// Returns `true` if the info was resolved by this context.
    pub const fn owns_info(&self) -> bool {
        self.owns_info
    }

    /// Transport settings.
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Last protocol-level status (HRESULT).
    pub const fn rapi_error(&self) -> u32 {
        self.rapi_error
    }

    /// Last system-level error (Win32 code).
    pub const fn last_error(&self) -> u32 {
        self.last_error
    }

    /// Connects to the device and selects the dialect.
    ///
    /// On failure the context stays disconnected, the socket is closed and
    /// any info resolved here is dropped.
    pub fn connect(&mut self) -> Result<()> {
        if self.is_initialized() {
            warn!("connect on a connected context");
            return Err(Error::AlreadyConnected);
        }

        let (info, resolved) = match &self.info {
            Some(info) => (Arc::clone(info), false),
            None => {
                let info = self.resolver.resolve(&self.selector).inspect_err(|e| {
                    error!(selector = %self.selector, error = %e, "failed to get connection info");
                })?;
                (Arc::new(info), true)
            }
        };

        match self.establish(&info) {
            Ok(dialect) => {
                debug!(device = %info.name, ?dialect, "connected");
                if resolved {
                    self.info = Some(info);
                    self.owns_info = true;
                }
                self.dialect = Some(dialect);
                Ok(())
            }
            Err(e) => {
                error!(device = %info.name, error = %e, "connect failed");
                self.link.socket.close();
                self.rapi_error = e.hresult();
                Err(e)
            }
        }
    }

    /// Opens the transport for `info` and returns the dialect to use.
    fn establish(&mut self, info: &DeviceInfo) -> Result<Dialect> {
        let kind = info.transport_kind();
        if kind != TransportKind::Broker {
            check_connection_manager(info)?;
        }

        let dialect = match kind {
            TransportKind::Legacy => {
                let ip = device_ip(info)?;
                self.link
                    .socket
                    .connect(ip, self.config.rapi_port, self.config.connect_timeout())?;
                self.link.socket.set_io_timeout(self.config.io_timeout())?;
                if let Some(password) = info.password.as_deref().filter(|p| !p.is_empty()) {
                    self.challenge(password, info.key)?;
                }
                Dialect::V1
            }
            TransportKind::Broker => {
                let fd = self.broker.request_connection(info)?;
                self.link.socket.take_descriptor(fd)?;
                self.link.socket.set_io_timeout(self.config.io_timeout())?;
                Dialect::for_os_version(info.os_major, info.os_minor)
            }
            TransportKind::Proxy => {
                let ip = device_ip(info)?;
                self.link.socket.connect_proxy(&self.config.proxy_dir, ip)?;
                self.link.socket.set_io_timeout(self.config.io_timeout())?;
                Dialect::for_os_version(info.os_major, info.os_minor)
            }
        };
        Ok(dialect)
    }

    /// Runs the password exchange. Every failure is access denied.
    fn challenge(&mut self, password: &str, key: u8) -> Result<()> {
        let frame = password::encode(password, key).map_err(|e| {
            error!(error = %e, "failed to encode password");
            Error::AccessDenied
        })?;
        self.link.socket.write_all(&frame).map_err(|e| {
            error!(error = %e, "failed to send password");
            Error::AccessDenied
        })?;
        let mut reply = [0u8; 1];
        self.link.socket.read_exact(&mut reply).map_err(|e| {
            error!(error = %e, "failed to get password reply");
            Error::AccessDenied
        })?;
        if !password::accepted(reply[0]) {
            error!("invalid password");
            return Err(Error::AccessDenied);
        }
        Ok(())
    }

    /// Closes the connection.
    ///
    /// Fails with [`Error::NotConnected`] if already disconnected, leaving
    /// the context untouched.
    pub fn disconnect(&mut self) -> Result<()> {
        if self.dialect.take().is_none() {
            return Err(Error::NotConnected);
        }
        if self.owns_info {
            self.info = None;
            self.owns_info = false;
        }
        self.link.socket.close();
        debug!("disconnected");
        Ok(())
    }

    /// Starts a request: clears the request buffer and writes `opcode`.
    pub fn begin_command(&mut self, opcode: u32) -> Result<()> {
        self.ensure_connected()?;
        debug!(command = format_args!("{opcode:#04x}"), "begin command");
        self.link.request.reset();
        self.link.request.write_u32(opcode).map_err(|e| self.record(e.into()))
    }

    /// Request buffer, for marshalling arguments after
    /// [`begin_command`](Self::begin_command).
    pub const fn request_mut(&mut self) -> &mut Buffer {
        &mut self.link.request
    }

    /// Reply buffer, positioned at the payload after [`call`](Self::call).
    pub const fn reply_mut(&mut self) -> &mut Buffer {
        &mut self.link.reply
    }

    /// Sends the request and receives the reply using the selected dialect.
    ///
    /// A failed call leaves the context connected.
    pub fn call(&mut self) -> Result<()> {
        let dialect = self.ensure_connected()?;
        self.rapi_error = E_UNEXPECTED;
        match dialect.execute_call(&mut self.link) {
            Ok(()) => {
                self.rapi_error = S_OK;
                Ok(())
            }
            Err(e) => {
                self.rapi_error = match e {
                    Error::Protocol(code) => code,
                    _ => E_FAIL,
                };
                Err(e)
            }
        }
    }

    /// Runs one remote call.
    ///
    /// Every reply payload starts with the device's last error, which is
    /// recorded on the system channel and passed to `unmarshal`.
    pub(crate) fn invoke<T>(
        &mut self,
        command: Command,
        marshal: impl FnOnce(Dialect, &mut Buffer) -> rapi_proto::Result<()>,
        unmarshal: impl FnOnce(Dialect, &mut Buffer, u32) -> Result<T>,
    ) -> Result<T> {
        let dialect = self.ensure_connected()?;
        self.begin_command(dialect.opcode(command))?;
        marshal(dialect, &mut self.link.request).map_err(|e| self.record(e.into()))?;
        self.call()?;

        let last_error = self
            .link
            .reply
            .read_u32()
            .map_err(|e| self.record(e.into()))?;
        self.last_error = last_error;
        unmarshal(dialect, &mut self.link.reply, last_error).map_err(|e| self.record(e))
    }

    /// Returns a handle that aborts blocked I/O from another thread.
    pub fn interrupt_handle(&self) -> Result<InterruptHandle> {
        if !self.is_initialized() {
            return Err(Error::NotConnected);
        }
        self.link.socket.interrupt_handle()
    }

    /// Fails fast when disconnected, setting the error channels the way
    /// callers of the Win32-style API expect for "not connected".
    pub(crate) fn ensure_connected(&mut self) -> Result<Dialect> {
        match self.dialect {
            Some(dialect) => Ok(dialect),
            None => {
                self.rapi_error = S_OK;
                self.last_error = ERROR_NOT_CONNECTED;
                Err(Error::NotConnected)
            }
        }
    }

    /// Reflects a local failure on the error channels.
    pub(crate) fn record(&mut self, e: Error) -> Error {
        match &e {
            Error::Remote(code) => self.last_error = *code,
            Error::Wire(_) | Error::Transport(_) => self.rapi_error = E_FAIL,
            Error::PathTooLong { .. } => {
                self.rapi_error = S_OK;
                self.last_error = ERROR_FILENAME_EXCED_RANGE;
            }
            _ => {}
        }
        e
    }
}

/// Requires a live connection manager and a device IP.
fn check_connection_manager(info: &DeviceInfo) -> Result<()> {
    let pid = info
        .dccm_pid
        .ok_or_else(|| Error::Resolution("no connection manager pid recorded".into()))?;
    if !broker::is_process_alive(pid) {
        return Err(Error::Resolution(format!(
            "connection manager not running with pid {pid}"
        )));
    }
    device_ip(info).map(|_| ())
}

/// Device IP, or a resolution error.
fn device_ip(info: &DeviceInfo) -> Result<&str> {
    info.device_ip
        .as_deref()
        .ok_or_else(|| Error::Resolution("no device IP recorded".into()))
}
