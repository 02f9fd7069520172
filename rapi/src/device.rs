//! A device known to a [`Desktop`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use serde::Serialize;

use crate::broker::Broker;
use crate::config::Config;
use crate::context::CallContext;
use crate::desktop::Desktop;
use crate::info::{DeviceInfo, Guid};
use crate::session::Session;
use crate::{Error, Result};

/// Whether a device is currently reachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum DeviceStatus {
    /// Reported connected by discovery.
    Connected,
    /// Reported gone, or the desktop shut down.
    Disconnected,
}

/// Physical link type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum ConnectionType {
    /// USB cable or cradle.
    Usb,
    /// Infrared.
    Ir,
    /// Serial cable.
    Serial,
    /// Network.
    Network,
}

/// Addresses of a device link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[non_exhaustive]
pub struct ConnectionInfo {
    /// Device IP address.
    pub device_ip: Option<String>,
    /// Host address of the interface facing the device.
    pub host_ip: Option<String>,
    /// Link type.
    pub connection_type: ConnectionType,
}

/// Identity summary of a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[non_exhaustive]
pub struct DeviceDescription {
    /// Device identifier.
    #[serde(serialize_with = "serialize_display")]
    pub id: Guid,
    /// OS major version.
    pub os_major: u32,
    /// OS minor version.
    pub os_minor: u32,
    /// Device name.
    pub name: String,
    /// Platform (OS) name.
    pub platform: Option<String>,
}

/// Serializes a value through its `Display` form.
fn serialize_display<S: serde::Serializer>(
    value: &impl std::fmt::Display,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}

/// A connected (or formerly connected) device.
///
/// Shared through `Arc`; sessions and enumerators keep it alive after it
/// leaves the desktop's list.
#[derive(Debug)]
pub struct Device {
    /// Resolved device info, shared with every session.
    info: Arc<DeviceInfo>,
    /// `true` while connected.
    connected: AtomicBool,
    /// Owning registry.
    desktop: Weak<Desktop>,
    /// Settings for sessions.
    config: Config,
    /// Broker for sessions.
    broker: Arc<dyn Broker>,
}

impl Device {
    /// Creates a connected device.
    pub(crate) fn new(
        info: DeviceInfo,
        desktop: Weak<Desktop>,
        config: Config,
        broker: Arc<dyn Broker>,
    ) -> Arc<Self> {
        Arc::new(Self {
            info: Arc::new(info),
            connected: AtomicBool::new(true),
            desktop,
            config,
            broker,
        })
    }

    /// Full device info.
    pub const fn info(&self) -> &Arc<DeviceInfo> {
        &self.info
    }

    /// Device name.
    pub fn name(&self) -> &str {
        &self.info.name
    }

    /// OS `(major, minor)` version.
    pub fn os_version(&self) -> (u32, u32) {
        (self.info.os_major, self.info.os_minor)
    }

    /// OS build number.
    pub fn build_number(&self) -> u32 {
        self.info.build_number
    }

    /// Processor architecture code.
    pub fn processor_type(&self) -> u32 {
        self.info.processor_type
    }

    /// OS name.
    pub fn os_name(&self) -> Option<&str> {
        self.info.os_name.as_deref()
    }

    /// Hardware model.
    pub fn model(&self) -> Option<&str> {
        self.info.model.as_deref()
    }

    /// Device IP address.
    pub fn device_ip(&self) -> Option<&str> {
        self.info.device_ip.as_deref()
    }

    /// Host address of the interface facing the device.
    pub fn local_ip(&self) -> Option<&str> {
        self.info.local_iface_ip.as_deref()
    }

    /// Discovery object path.
    pub fn object_path(&self) -> Option<&str> {
        self.info.object_path.as_deref()
    }

    /// Current connection status.
    pub fn status(&self) -> DeviceStatus {
        if self.connected.load(Ordering::Acquire) {
            DeviceStatus::Connected
        } else {
            DeviceStatus::Disconnected
        }
    }

    /// Records the connection status.
    pub(crate) fn set_status(&self, status: DeviceStatus) {
        self.connected
            .store(status == DeviceStatus::Connected, Ordering::Release);
    }

    /// The registry this device belongs to, if still alive.
    pub fn desktop(&self) -> Option<Arc<Desktop>> {
        self.desktop.upgrade()
    }

    /// Link addresses. The link type is always reported as USB.
    pub fn connection_info(&self) -> ConnectionInfo {
        ConnectionInfo {
            device_ip: self.info.device_ip.clone(),
            host_ip: self.info.local_iface_ip.clone(),
            connection_type: ConnectionType::Usb,
        }
    }

    /// Identity summary. Fails if the device has no valid GUID.
    pub fn device_info(&self) -> Result<DeviceDescription> {
        Ok(DeviceDescription {
            id: self.info.device_id()?,
            os_major: self.info.os_major,
            os_minor: self.info.os_minor,
            name: self.info.name.clone(),
            platform: self.info.os_name.clone(),
        })
    }

    /// Opens a session. The session is not connected until
    /// [`Session::rapi_init`].
    pub fn create_session(self: &Arc<Self>) -> Result<Session> {
        if self.status() == DeviceStatus::Disconnected {
            return Err(Error::NoMoreDevices);
        }
        let context = CallContext::new(self.config.clone())
            .with_broker(Arc::clone(&self.broker))
            .with_info(Arc::clone(&self.info));
        Ok(Session::new(context, Arc::clone(self)))
    }
}
