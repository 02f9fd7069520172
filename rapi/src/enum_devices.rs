//! Cursor over a snapshot of connected devices.

use std::sync::Arc;

use crate::device::Device;
use crate::{Error, Result};

/// Enumerator over the devices connected when it was created.
///
/// Later connects and disconnects do not change the snapshot.
#[derive(Debug)]
pub struct EnumDevices {
    /// Snapshot of the device list.
    devices: Vec<Arc<Device>>,
    /// Index of the next device to yield.
    cursor: usize,
}

impl EnumDevices {
    /// Creates an enumerator positioned at the first device.
    pub(crate) const fn new(devices: Vec<Arc<Device>>) -> Self {
        Self { devices, cursor: 0 }
    }

    /// Number of devices in the snapshot, regardless of the cursor.
    ///
    /// [`ExactSizeIterator::len`] counts the devices still to come.
    pub fn total(&self) -> usize {
        self.devices.len()
    }

    /// Returns `true` if the snapshot is empty.
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Moves the cursor back to the first device.
    pub const fn reset(&mut self) {
        self.cursor = 0;
    }

    /// Returns the next device, or [`Error::NoMoreDevices`] at the end.
    pub fn next_device(&mut self) -> Result<Arc<Device>> {
        self.next().ok_or(Error::NoMoreDevices)
    }

    /// Skips `count` devices.
    ///
    /// Running off the end leaves the cursor at the end and returns
    /// [`Error::NoMoreDevices`].
    pub fn skip_devices(&mut self, count: usize) -> Result<()> {
        for _ in 0..count {
            if self.cursor >= self.devices.len() {
                return Err(Error::NoMoreDevices);
            }
            self.cursor += 1;
        }
        Ok(())
    }
}

/// Clones the snapshot with the cursor reset to the start.
impl Clone for EnumDevices {
    fn clone(&self) -> Self {
        Self::new(self.devices.clone())
    }
}

impl Iterator for EnumDevices {
    type Item = Arc<Device>;

    fn next(&mut self) -> Option<Self::Item> {
        let device = self.devices.get(self.cursor)?;
        self.cursor += 1;
        Some(Arc::clone(device))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.devices.len().saturating_sub(self.cursor);
        (left, Some(left))
    }
}

impl ExactSizeIterator for EnumDevices {}

#[cfg(test)]
mod tests {
    use std::sync::Weak;

    use crate::broker::UnixBroker;
    use crate::config::Config;
    use crate::info::DeviceInfo;

    use super::*;

    fn snapshot(names: &[&str]) -> EnumDevices {
        let devices = names
            .iter()
            .map(|name| {
                Device::new(
                    DeviceInfo::new(*name),
                    Weak::new(),
                    Config::default(),
                    Arc::new(UnixBroker::new()),
                )
            })
            .collect();
        EnumDevices::new(devices)
    }

    #[test]
    fn walks_in_order_then_stops() {
        let mut devices = snapshot(&["a", "b"]);
        assert_eq!(devices.total(), 2);
        assert_eq!(devices.next_device().unwrap().name(), "a");
        assert_eq!(devices.len(), 1);
        assert_eq!(devices.total(), 2);
        assert_eq!(devices.next_device().unwrap().name(), "b");
        assert!(matches!(devices.next_device(), Err(Error::NoMoreDevices)));

        devices.reset();
        let names: Vec<_> = devices.map(|d| d.name().to_owned()).collect();
        assert_eq!(names, ["a", "b"]);
    }

    #[test]
    fn skip_past_end_is_partial() {
        let mut devices = snapshot(&["a", "b", "c"]);
        devices.skip_devices(1).unwrap();
        assert_eq!(devices.len(), 2);
        assert_eq!(devices.total(), 3);
        assert!(matches!(devices.skip_devices(5), Err(Error::NoMoreDevices)));
        assert!(devices.next().is_none());
    }

    #[test]
    fn clone_restarts() {
        let mut devices = snapshot(&["a", "b"]);
        devices.next_device().unwrap();
        let mut copy = devices.clone();
        assert_eq!(copy.next_device().unwrap().name(), "a");
        assert_eq!(devices.next_device().unwrap().name(), "b");
    }

    #[test]
    fn empty_snapshot() {
        let mut devices = snapshot(&[]);
        assert!(devices.is_empty());
        assert!(matches!(devices.next_device(), Err(Error::NoMoreDevices)));
        devices.skip_devices(0).unwrap();
    }
}
