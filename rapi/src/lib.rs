//! RAPI transport core for Windows Mobile devices.
//!
//! A [`CallContext`] owns one connection to a device. It resolves the
//! device's [`DeviceInfo`], picks a transport (direct TCP with a password
//! challenge, a descriptor from the connection broker, or a per-device
//! proxy socket), and selects the reply [`Dialect`] from the device OS
//! version. Remote calls are methods on the context.
//!
//! The handle layer wraps this for callers that track several devices:
//! a [`Desktop`] keeps the connected [`Device`]s and notifies [`Sink`]s,
//! and each device opens [`Session`]s.
//!
//! # Example
//!
//! ```no_run
//! use rapi::{CallContext, Config, Selector};
//!
//! let mut ctx = CallContext::new(Config::default())
//!     .with_selector(Selector::Name("pocket_pc".into()));
//! ctx.connect()?;
//! let version = ctx.get_version_ex()?;
//! println!("{}.{} build {}", version.major, version.minor, version.build);
//! ctx.disconnect()?;
//! # Ok::<(), rapi::Error>(())
//! ```

#[cfg(not(unix))]
compile_error!("rapi requires a Unix platform");

mod broker;
mod config;
mod context;
mod desktop;
mod device;
mod dialect;
mod enum_devices;
mod error;
mod info;
pub mod ops;
mod resolver;
mod session;
mod socket;

pub use broker::{Broker, UnixBroker, is_process_alive, recv_descriptor, send_descriptor};
pub use config::Config;
pub use context::CallContext;
pub use desktop::{BROKER_PATH_PREFIX, Desktop, DesktopBuilder, DiscoveryEvent, Sink};
pub use device::{ConnectionInfo, ConnectionType, Device, DeviceDescription, DeviceStatus};
pub use dialect::Dialect;
pub use enum_devices::EnumDevices;
pub use error::{Error, Result};
pub use info::{DeviceInfo, Guid, TransportKind};
pub use ops::{OsVersion, ProcessInfo, RegValue, SeekFrom, StoreInfo};
pub use resolver::{ChainResolver, FileResolver, Resolver, Selector, StaticResolver};
pub use session::Session;
pub use socket::{InterruptHandle, Socket};
