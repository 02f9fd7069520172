//! Device info lookup.
//!
//! A [`Resolver`] turns a [`Selector`] into a [`DeviceInfo`]. Several
//! sources can be stacked in a [`ChainResolver`]; the first one that knows
//! the device wins.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::info::DeviceInfo;
use crate::{Error, Result};

/// Name of the file describing the currently active device.
const ACTIVE_CONNECTION: &str = "active_connection.json";

/// Which device to resolve.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[non_exhaustive]
pub enum Selector {
    /// The first available device.
    #[default]
    Default,
    /// Device with this name, compared case-insensitively.
    Name(String),
    /// Device with this object path, compared case-insensitively.
    ObjectPath(String),
}

impl Selector {
    /// Returns `true` if `info` is the device this selector names.
    pub fn matches(&self, info: &DeviceInfo) -> bool {
        match self {
            Self::Default => true,
            Self::Name(name) => info.name.eq_ignore_ascii_case(name),
            Self::ObjectPath(path) => info
                .object_path
                .as_deref()
                .is_some_and(|p| p.eq_ignore_ascii_case(path)),
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => f.write_str("default device"),
            Self::Name(name) => write!(f, "device named {name:?}"),
            Self::ObjectPath(path) => write!(f, "device at {path}"),
        }
    }
}

/// Source of device info.
///
/// Resolution is synchronous and returns the same answer for the same
/// selector while the device stays connected.
pub trait Resolver: Send + Sync + fmt::Debug {
    /// Looks up one device.
    fn resolve(&self, selector: &Selector) -> Result<DeviceInfo>;

    /// Lists every device this source knows about.
    fn devices(&self) -> Result<Vec<DeviceInfo>>;
}

/// Picks the first device in `devices` matching `selector`.
fn pick(devices: Vec<DeviceInfo>, selector: &Selector) -> Result<DeviceInfo> {
    devices
        .into_iter()
        .find(|info| selector.matches(info))
        .ok_or_else(|| Error::Resolution(format!("no {selector}")))
}

/// Fixed in-memory list of devices.
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    /// Known devices, in priority order.
    devices: Vec<DeviceInfo>,
}

impl StaticResolver {
    /// Creates a resolver over `devices`.
    pub const fn new(devices: Vec<DeviceInfo>) -> Self {
        Self { devices }
    }
}

impl Resolver for StaticResolver {
    fn resolve(&self, selector: &Selector) -> Result<DeviceInfo> {
        pick(self.devices.clone(), selector)
    }

    fn devices(&self) -> Result<Vec<DeviceInfo>> {
        Ok(self.devices.clone())
    }
}

/// Reads `<name>.json` device info files from a directory.
///
/// For [`Selector::Default`], `active_connection.json` is preferred when
/// present.
#[derive(Debug, Clone)]
pub struct FileResolver {
    /// Directory holding the info files.
    dir: PathBuf,
}

impl FileResolver {
    /// Creates a resolver over `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory scanned by this resolver.
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl Resolver for FileResolver {
    fn resolve(&self, selector: &Selector) -> Result<DeviceInfo> {
        if *selector == Selector::Default {
            let active = self.dir.join(ACTIVE_CONNECTION);
            if active.exists() {
                return DeviceInfo::load(&active)
                    .map_err(|e| Error::Resolution(format!("{}: {e}", active.display())));
            }
        }
        let devices = self
            .devices()
            .map_err(|e| Error::Resolution(format!("{}: {e}", self.dir.display())))?;
        pick(devices, selector)
    }

    fn devices(&self) -> Result<Vec<DeviceInfo>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut paths: Vec<PathBuf> = entries
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .filter(|p| p.file_name().is_some_and(|n| n != ACTIVE_CONNECTION))
            .collect();
        paths.sort();

        let mut devices = Vec::with_capacity(paths.len());
        for path in paths {
            match DeviceInfo::load(&path) {
                Ok(info) => devices.push(info),
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable device info"),
            }
        }
        Ok(devices)
    }
}

/// Tries several sources in priority order.
#[derive(Debug, Clone, Default)]
pub struct ChainResolver {
    /// Sources, highest priority first.
    sources: Vec<Arc<dyn Resolver>>,
}

impl ChainResolver {
    /// Creates an empty chain.
    pub const fn new() -> Self {
        Self {
            sources: Vec::new(),
        }
    }

    /// Appends a lower-priority source.
    #[must_use]
    pub fn source(mut self, resolver: Arc<dyn Resolver>) -> Self {
        self.sources.push(resolver);
        self
    }
}

impl Resolver for ChainResolver {
    fn resolve(&self, selector: &Selector) -> Result<DeviceInfo> {
        for source in &self.sources {
            match source.resolve(selector) {
                Ok(info) => return Ok(info),
                Err(e) => debug!(?source, error = %e, "source could not resolve"),
            }
        }
        Err(Error::Resolution(format!("no source knows the {selector}")))
    }

    fn devices(&self) -> Result<Vec<DeviceInfo>> {
        let mut all: Vec<DeviceInfo> = Vec::new();
        for source in &self.sources {
            match source.devices() {
                Ok(found) => {
                    for info in found {
                        if !all.iter().any(|d| d.name.eq_ignore_ascii_case(&info.name)) {
                            all.push(info);
                        }
                    }
                }
                Err(e) => debug!(?source, error = %e, "source could not list devices"),
            }
        }
        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(name: &str, path: &str) -> DeviceInfo {
        let mut info = DeviceInfo::new(name);
        info.object_path = Some(path.into());
        info
    }

    #[test]
    fn selector_matching_ignores_case() {
        let info = device("PocketPC", "/org/synce/dccm/Device/1");
        assert!(Selector::Default.matches(&info));
        assert!(Selector::Name("pocketpc".into()).matches(&info));
        assert!(Selector::ObjectPath("/ORG/synce/dccm/device/1".into()).matches(&info));
        assert!(!Selector::Name("other".into()).matches(&info));
        assert!(!Selector::ObjectPath("/x".into()).matches(&DeviceInfo::new("bare")));
    }

    #[test]
    fn static_resolver_default_is_first() {
        let resolver = StaticResolver::new(vec![device("a", "/a"), device("b", "/b")]);
        assert_eq!(resolver.resolve(&Selector::Default).unwrap().name, "a");
        assert_eq!(
            resolver.resolve(&Selector::ObjectPath("/b".into())).unwrap().name,
            "b"
        );
        assert!(matches!(
            resolver.resolve(&Selector::Name("c".into())),
            Err(Error::Resolution(_))
        ));
        assert!(StaticResolver::default().resolve(&Selector::Default).is_err());
    }

    #[test]
    fn file_resolver_prefers_active_connection() {
        let dir = tempfile::tempdir().unwrap();
        device("alpha", "/a").save(&dir.path().join("alpha.json")).unwrap();
        device("beta", "/b").save(&dir.path().join("beta.json")).unwrap();

        let resolver = FileResolver::new(dir.path());
        assert_eq!(resolver.resolve(&Selector::Default).unwrap().name, "alpha");
        assert_eq!(resolver.devices().unwrap().len(), 2);

        device("beta", "/b")
            .save(&dir.path().join(ACTIVE_CONNECTION))
            .unwrap();
        assert_eq!(resolver.resolve(&Selector::Default).unwrap().name, "beta");
        assert_eq!(resolver.devices().unwrap().len(), 2);
    }

    #[test]
    fn file_resolver_skips_garbage_and_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("broken.json"), "{").unwrap();
        fs::write(dir.path().join("notes.txt"), "hi").unwrap();
        device("ok", "/ok").save(&dir.path().join("ok.json")).unwrap();

        let resolver = FileResolver::new(dir.path());
        let names: Vec<String> = resolver.devices().unwrap().into_iter().map(|d| d.name).collect();
        assert_eq!(names, ["ok"]);

        let missing = FileResolver::new(dir.path().join("absent"));
        assert!(missing.devices().unwrap().is_empty());
        assert!(matches!(
            missing.resolve(&Selector::Default),
            Err(Error::Resolution(_))
        ));
    }

    #[test]
    fn corrupt_active_connection_is_a_resolution_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(ACTIVE_CONNECTION), "{\"name\":").unwrap();
        device("ok", "/ok").save(&dir.path().join("ok.json")).unwrap();

        let resolver = FileResolver::new(dir.path());
        assert!(matches!(
            resolver.resolve(&Selector::Default),
            Err(Error::Resolution(_))
        ));
        assert_eq!(resolver.resolve(&Selector::Name("ok".into())).unwrap().name, "ok");
    }

    #[test]
    fn unreadable_info_dir_is_a_resolution_error() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("not-a-dir");
        fs::write(&file, "").unwrap();

        assert!(matches!(
            FileResolver::new(&file).resolve(&Selector::Default),
            Err(Error::Resolution(_))
        ));
    }

    #[test]
    fn chain_uses_priority_order() {
        let high: Arc<dyn Resolver> = Arc::new(StaticResolver::new(vec![device("dev", "/high")]));
        let low: Arc<dyn Resolver> = Arc::new(StaticResolver::new(vec![
            device("DEV", "/low"),
            device("extra", "/extra"),
        ]));
        let chain = ChainResolver::new().source(high).source(low);

        let info = chain.resolve(&Selector::Name("dev".into())).unwrap();
        assert_eq!(info.object_path.as_deref(), Some("/high"));
        let info = chain.resolve(&Selector::Name("extra".into())).unwrap();
        assert_eq!(info.object_path.as_deref(), Some("/extra"));
        assert_eq!(chain.devices().unwrap().len(), 2);
        assert!(matches!(
            chain.resolve(&Selector::Name("none".into())),
            Err(Error::Resolution(_))
        ));
    }
}
