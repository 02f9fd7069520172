//! Process-wide device registry.
//!
//! A [`Desktop`] tracks connected devices and the sinks listening for
//! connect/disconnect events. It is constructed explicitly, shared as an
//! `Arc`, and torn down with [`Desktop::shutdown`]. The device list and
//! the sink table sit behind one lock; sinks are called after it is
//! released so they may call back into the desktop.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tracing::{debug, warn};

use crate::broker::{Broker, UnixBroker};
use crate::config::Config;
use crate::device::{Device, DeviceStatus};
use crate::enum_devices::EnumDevices;
use crate::info::{DeviceInfo, Guid};
use crate::resolver::{FileResolver, Resolver, Selector};
use crate::{Error, Result};

/// Object path prefix of devices announced by the connection broker.
pub const BROKER_PATH_PREFIX: &str = "/org/synce/dccm/";

/// Receives device connect/disconnect notifications.
///
/// Errors returned from a sink are logged and otherwise ignored.
pub trait Sink: Send + Sync {
    /// A device was connected.
    fn on_device_connected(&self, _device: &Arc<Device>) -> Result<()> {
        Ok(())
    }

    /// A device was disconnected.
    fn on_device_disconnected(&self, _device: &Arc<Device>) -> Result<()> {
        Ok(())
    }
}

/// Event from the discovery service.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum DiscoveryEvent {
    /// A device appeared at `object_path`.
    DeviceConnected {
        /// Discovery object path.
        object_path: String,
    },
    /// The device at `object_path` went away.
    DeviceDisconnected {
        /// Discovery object path.
        object_path: String,
    },
    /// The broker started; these devices are already connected.
    BrokerOnline {
        /// Object paths of the connected devices.
        object_paths: Vec<String>,
    },
    /// The broker stopped; its devices are gone.
    BrokerOffline,
}

/// State guarded by the desktop lock.
#[derive(Default)]
struct Registry {
    /// Connected devices, in arrival order.
    devices: Vec<Arc<Device>>,
    /// Sinks by cookie.
    sinks: BTreeMap<u32, Arc<dyn Sink>>,
    /// Most recently issued cookie.
    cookie: u32,
    /// Set by `shutdown`; later events are ignored.
    closed: bool,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("devices", &self.devices.len())
            .field("sinks", &self.sinks.keys().collect::<Vec<_>>())
            .field("closed", &self.closed)
            .finish()
    }
}

impl Registry {
    /// Returns `true` if a device with this object path is registered.
    fn contains(&self, object_path: &str) -> bool {
        self.devices
            .iter()
            .any(|d| d.object_path() == Some(object_path))
    }

    /// Snapshot of the sinks in cookie order.
    fn sinks(&self) -> Vec<Arc<dyn Sink>> {
        self.sinks.values().cloned().collect()
    }
}

/// Registry of connected devices and event sinks.
#[derive(Debug)]
pub struct Desktop {
    /// Settings handed to every device's sessions.
    config: Config,
    /// Device info source.
    resolver: Arc<dyn Resolver>,
    /// Broker handed to every device's sessions.
    broker: Arc<dyn Broker>,
    /// Devices and sinks.
    registry: Mutex<Registry>,
    /// Self-reference given to devices.
    this: Weak<Self>,
}

/// Builder for [`Desktop`].
#[derive(Debug)]
pub struct DesktopBuilder {
    /// Settings.
    config: Config,
    /// Device info source; defaults to the config's info directory.
    resolver: Option<Arc<dyn Resolver>>,
    /// Broker; defaults to [`UnixBroker`].
    broker: Option<Arc<dyn Broker>>,
}

impl DesktopBuilder {
    /// Sets the device info source.
    #[must_use]
    pub fn resolver(mut self, resolver: Arc<dyn Resolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Sets the broker used by sessions.
    #[must_use]
    pub fn broker(mut self, broker: Arc<dyn Broker>) -> Self {
        self.broker = Some(broker);
        self
    }

    /// Creates the desktop with an empty device list.
    pub fn build(self) -> Arc<Desktop> {
        let resolver = self
            .resolver
            .unwrap_or_else(|| Arc::new(FileResolver::new(&self.config.info_dir)));
        let broker = self.broker.unwrap_or_else(|| Arc::new(UnixBroker::new()));
        Arc::new_cyclic(|this| Desktop {
            config: self.config,
            resolver,
            broker,
            registry: Mutex::new(Registry::default()),
            this: this.clone(),
        })
    }
}

impl Desktop {
    /// Starts building a desktop.
    pub const fn builder(config: Config) -> DesktopBuilder {
        DesktopBuilder {
            config,
            resolver: None,
            broker: None,
        }
    }

    /// Settings shared by every session.
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Locks the registry, recovering from a panicked holder.
    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wraps resolved info in a device owned by this desktop.
    fn make_device(&self, info: DeviceInfo) -> Arc<Device> {
        Device::new(
            info,
            self.this.clone(),
            self.config.clone(),
            Arc::clone(&self.broker),
        )
    }

    /// Registers every device the resolver knows and returns how many were
    /// added. Already registered devices are skipped; sinks are not
    /// notified.
    pub fn discover(&self) -> Result<usize> {
        let found = self.resolver.devices()?;
        let mut registry = self.lock();
        if registry.closed {
            return Ok(0);
        }
        let mut added = 0;
        for info in found {
            let known = registry.devices.iter().any(|d| match &info.object_path {
                Some(path) => d.object_path() == Some(path.as_str()),
                None => d.name().eq_ignore_ascii_case(&info.name),
            });
            if !known {
                debug!(device = %info.name, "found device");
                registry.devices.push(self.make_device(info));
                added += 1;
            }
        }
        Ok(added)
    }

    /// Applies one discovery event.
    pub fn handle_event(&self, event: DiscoveryEvent) {
        match event {
            DiscoveryEvent::DeviceConnected { object_path } => self.device_connected(&object_path),
            DiscoveryEvent::DeviceDisconnected { object_path } => {
                self.device_disconnected(&object_path);
            }
            DiscoveryEvent::BrokerOnline { object_paths } => self.broker_online(&object_paths),
            DiscoveryEvent::BrokerOffline => self.broker_offline(),
        }
    }

    /// Resolves device info for an announced object path.
    fn resolve_path(&self, object_path: &str) -> Option<DeviceInfo> {
        match self
            .resolver
            .resolve(&Selector::ObjectPath(object_path.to_owned()))
        {
            Ok(info) => Some(info),
            Err(e) => {
                warn!(object_path, error = %e, "no device info for announced device");
                None
            }
        }
    }

    /// Adds a device and notifies sinks.
    fn device_connected(&self, object_path: &str) {
        debug!(object_path, "found device");
        let Some(info) = self.resolve_path(object_path) else {
            return;
        };
        let (device, sinks) = {
            let mut registry = self.lock();
            if registry.closed {
                return;
            }
            if registry.contains(object_path) {
                debug!(object_path, "device already registered");
                return;
            }
            let device = self.make_device(info);
            registry.devices.push(Arc::clone(&device));
            (device, registry.sinks())
        };
        for sink in sinks {
            if let Err(e) = sink.on_device_connected(&device) {
                debug!(error = %e, "error reported from connect sink");
            }
        }
    }

    /// Removes a device and notifies sinks.
    fn device_disconnected(&self, object_path: &str) {
        let (device, sinks) = {
            let mut registry = self.lock();
            let Some(index) = registry
                .devices
                .iter()
                .position(|d| d.object_path() == Some(object_path))
            else {
                warn!(object_path, "disconnect for unknown device");
                return;
            };
            debug!(object_path, "device disconnected");
            let device = registry.devices.remove(index);
            device.set_status(DeviceStatus::Disconnected);
            (device, registry.sinks())
        };
        for sink in sinks {
            if let Err(e) = sink.on_device_disconnected(&device) {
                debug!(error = %e, "error reported from disconnect sink");
            }
        }
    }

    /// Registers the broker's existing devices without notifying sinks.
    fn broker_online(&self, object_paths: &[String]) {
        let resolved: Vec<DeviceInfo> = object_paths
            .iter()
            .filter_map(|path| self.resolve_path(path))
            .collect();
        let mut registry = self.lock();
        if registry.closed {
            return;
        }
        for info in resolved {
            let path = info.object_path.clone().unwrap_or_default();
            if registry.contains(&path) {
                continue;
            }
            debug!(object_path = %path, "found device");
            registry.devices.push(self.make_device(info));
        }
    }

    /// Drops every broker-announced device without notifying sinks.
    fn broker_offline(&self) {
        let mut registry = self.lock();
        registry.devices.retain(|device| {
            let brokered = device
                .object_path()
                .is_some_and(|p| p.starts_with(BROKER_PATH_PREFIX));
            if brokered {
                debug!(device = %device.name(), "removing device");
                device.set_status(DeviceStatus::Disconnected);
            }
            !brokered
        });
    }

    /// Registers `sink` and returns its cookie.
    ///
    /// Cookies count up from 1, wrap before `0xFFFF_FFFF`, and skip values
    /// still in use.
    pub fn advise(&self, sink: Arc<dyn Sink>) -> u32 {
        let mut registry = self.lock();
        let mut cookie = registry.cookie;
        loop {
            if cookie == 0 || cookie == u32::MAX {
                cookie = 1;
            }
            if !registry.sinks.contains_key(&cookie) {
                break;
            }
            cookie += 1;
        }
        registry.cookie = cookie;
        registry.sinks.insert(cookie, sink);
        cookie
    }

    /// Unregisters the sink behind `cookie`. Unknown cookies are ignored.
    pub fn unadvise(&self, cookie: u32) {
        if self.lock().sinks.remove(&cookie).is_none() {
            warn!(cookie, "request to remove a sink that was not registered");
        }
    }

    /// Snapshot enumerator over the connected devices.
    pub fn enum_devices(&self) -> EnumDevices {
        EnumDevices::new(self.devices())
    }

    /// Connected devices, in arrival order.
    pub fn devices(&self) -> Vec<Arc<Device>> {
        self.lock().devices.clone()
    }

    /// Looks a device up by GUID.
    pub fn find_device(&self, id: &Guid) -> Result<Arc<Device>> {
        let wanted = id.to_string();
        self.lock()
            .devices
            .iter()
            .find(|d| {
                d.info()
                    .guid
                    .as_deref()
                    .is_some_and(|g| g.eq_ignore_ascii_case(&wanted))
            })
            .cloned()
            .ok_or(Error::NoMoreDevices)
    }

    /// Disconnects every device, drops every sink, and ignores later
    /// events.
    pub fn shutdown(&self) {
        let mut registry = self.lock();
        for device in registry.devices.drain(..) {
            device.set_status(DeviceStatus::Disconnected);
        }
        registry.sinks.clear();
        registry.closed = true;
        debug!("desktop shut down");
    }
}
