//! Connection parameters for one device.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Everything needed to reach and identify a device.
///
/// Immutable once resolved; shared between contexts through an `Arc`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
#[non_exhaustive]
pub struct DeviceInfo {
    /// Device name as reported during partnership.
    pub name: String,
    /// Device identifier in `{XXXXXXXX-XXXX-XXXX-XXXX-XXXXXXXXXXXX}` form.
    pub guid: Option<String>,
    /// Discovery-daemon object path.
    pub object_path: Option<String>,
    /// OS major version.
    pub os_major: u32,
    /// OS minor version.
    pub os_minor: u32,
    /// OS build number.
    pub build_number: u32,
    /// Processor architecture code.
    pub processor_type: u32,
    /// OS name, e.g. `"Windows CE"`.
    pub os_name: Option<String>,
    /// Hardware model.
    pub model: Option<String>,
    /// First partnership identifier.
    pub partner_id_1: u32,
    /// Second partnership identifier.
    pub partner_id_2: u32,
    /// Device IP address.
    pub device_ip: Option<String>,
    /// Host address of the interface facing the device.
    pub local_iface_ip: Option<String>,
    /// Transport tag: unset or `ppp*` for direct, `udev`/`hal`/`odccm`/
    /// `broker` for broker handoff, anything else for the proxy path.
    pub transport: Option<String>,
    /// Password guarding the device, if any.
    pub password: Option<String>,
    /// One-byte key the password is XOR'd with.
    pub key: u8,
    /// Process ID of the desktop connection manager.
    pub dccm_pid: Option<u32>,
    /// Unix socket of the connection broker.
    pub broker_socket: Option<PathBuf>,
}

impl DeviceInfo {
    /// Creates info with only a name set.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Reads a JSON info file.
    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }

    /// Writes the info as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        let file = fs::File::create(path)?;
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }

    /// How the device is reached, derived from [`transport`](Self::transport).
    pub fn transport_kind(&self) -> TransportKind {
        TransportKind::from_tag(self.transport.as_deref())
    }

    /// Parsed [`guid`](Self::guid).
    pub fn device_id(&self) -> Result<Guid> {
        self.guid
            .as_deref()
            .ok_or(Error::InvalidArgument("device has no GUID"))?
            .parse()
    }
}

/// Connection path for a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum TransportKind {
    /// Direct TCP to the device IP, with optional password challenge.
    Legacy,
    /// Connected descriptor handed over by a broker.
    Broker,
    /// Unix socket to a local proxy.
    Proxy,
}

impl TransportKind {
    /// Classifies a transport tag.
    pub fn from_tag(tag: Option<&str>) -> Self {
        match tag {
            None => Self::Legacy,
            Some(t) if t.starts_with("ppp") => Self::Legacy,
            Some("udev" | "hal" | "odccm" | "broker") => Self::Broker,
            Some(_) => Self::Proxy,
        }
    }
}

/// 128-bit device identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[non_exhaustive]
pub struct Guid {
    /// First group, 8 hex digits.
    pub data1: u32,
    /// Second group, 4 hex digits.
    pub data2: u16,
    /// Third group, 4 hex digits.
    pub data3: u16,
    /// Remaining 8 bytes.
    pub data4: [u8; 8],
}

impl Guid {
    /// Builds a GUID from its parts.
    pub const fn new(data1: u32, data2: u16, data3: u16, data4: [u8; 8]) -> Self {
        Self {
            data1,
            data2,
            data3,
            data4,
        }
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let d = &self.data4;
        write!(
            f,
            "{{{:08X}-{:04X}-{:04X}-{:02X}{:02X}-{:02X}{:02X}{:02X}{:02X}{:02X}{:02X}}}",
            self.data1, self.data2, self.data3, d[0], d[1], d[2], d[3], d[4], d[5], d[6], d[7]
        )
    }
}

impl FromStr for Guid {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let bad = || Error::InvalidArgument("malformed GUID");
        let inner = s
            .strip_prefix('{')
            .and_then(|s| s.strip_suffix('}'))
            .ok_or_else(bad)?;
        let groups: Vec<&str> = inner.split('-').collect();
        let [g1, g2, g3, g4, g5] = groups.as_slice() else {
            return Err(bad());
        };
        if g1.len() != 8 || g2.len() != 4 || g3.len() != 4 || g4.len() != 4 || g5.len() != 12 {
            return Err(bad());
        }
        let hex = |s: &str| {
            if s.bytes().all(|b| b.is_ascii_hexdigit()) {
                u64::from_str_radix(s, 16).map_err(|_| bad())
            } else {
                Err(bad())
            }
        };
        let data1 = u32::try_from(hex(g1)?).map_err(|_| bad())?;
        let data2 = u16::try_from(hex(g2)?).map_err(|_| bad())?;
        let data3 = u16::try_from(hex(g3)?).map_err(|_| bad())?;
        let tail = (hex(g4)? << 48) | hex(g5)?;
        Ok(Self::new(data1, data2, data3, tail.to_be_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_classification() {
        assert_eq!(TransportKind::from_tag(None), TransportKind::Legacy);
        assert_eq!(TransportKind::from_tag(Some("ppp")), TransportKind::Legacy);
        assert_eq!(TransportKind::from_tag(Some("ppp0")), TransportKind::Legacy);
        assert_eq!(TransportKind::from_tag(Some("udev")), TransportKind::Broker);
        assert_eq!(TransportKind::from_tag(Some("broker")), TransportKind::Broker);
        assert_eq!(TransportKind::from_tag(Some("odccm")), TransportKind::Broker);
        assert_eq!(TransportKind::from_tag(Some("usbnet")), TransportKind::Proxy);
    }

    #[test]
    fn guid_text_form() {
        let guid = Guid::new(
            0x1234_ABCD,
            0x0001,
            0xBEEF,
            [0x80, 0x0A, 1, 2, 3, 4, 5, 0xFF],
        );
        let text = guid.to_string();
        assert_eq!(text, "{1234ABCD-0001-BEEF-800A-0102030405FF}");
        assert_eq!(text.parse::<Guid>().unwrap(), guid);
    }

    #[test]
    fn guid_parse_accepts_lowercase() {
        let guid: Guid = "{1234abcd-0001-beef-800a-0102030405ff}".parse().unwrap();
        assert_eq!(guid.data1, 0x1234_ABCD);
        assert_eq!(guid.data4[7], 0xFF);
    }

    #[test]
    fn guid_parse_rejects_malformed() {
        for bad in [
            "",
            "1234ABCD-0001-BEEF-800A-0102030405FF",
            "{1234ABCD-0001-BEEF-800A0102030405FF}",
            "{1234ABCD-0001-BEEF-800A-0102030405F}",
            "{+234ABCD-0001-BEEF-800A-0102030405FF}",
            "{1234ABCG-0001-BEEF-800A-0102030405FF}",
        ] {
            assert!(bad.parse::<Guid>().is_err(), "{bad}");
        }
    }

    #[test]
    fn json_fills_defaults() {
        let info: DeviceInfo =
            serde_json::from_str(r#"{ "name": "pda", "os_major": 5, "transport": "udev" }"#)
                .unwrap();
        assert_eq!(info.name, "pda");
        assert_eq!(info.os_minor, 0);
        assert_eq!(info.transport_kind(), TransportKind::Broker);
        assert!(info.password.is_none());
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pda.json");
        let mut info = DeviceInfo::new("pda");
        info.device_ip = Some("169.254.2.1".into());
        info.guid = Some("{00000001-0002-0003-0405-060708090A0B}".into());
        info.save(&path).unwrap();

        let loaded = DeviceInfo::load(&path).unwrap();
        assert_eq!(loaded, info);
        assert_eq!(loaded.device_id().unwrap().data1, 1);
    }
}
