//! Connection settings shared by every call context.
//!
//! Stored as JSON, by default at `$XDG_CONFIG_HOME/synce/rapi.json`.
//! Missing fields take their defaults.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::Result;

/// Transport and resolution settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
#[non_exhaustive]
pub struct Config {
    /// TCP port for direct (legacy) connections.
    pub rapi_port: u16,
    /// Directory holding proxy sockets named `<identifier>.sock`.
    pub proxy_dir: PathBuf,
    /// Directory holding device info files.
    pub info_dir: PathBuf,
    /// Deadline for establishing a TCP connection, in milliseconds.
    pub connect_timeout_ms: Option<u64>,
    /// Deadline for each send or receive, in milliseconds.
    pub io_timeout_ms: Option<u64>,
    /// Largest reply frame accepted from a device.
    pub max_frame: u32,
}

impl Default for Config {
    fn default() -> Self {
        let base = dirs::config_dir().unwrap_or_else(std::env::temp_dir);
        let runtime = dirs::runtime_dir().unwrap_or_else(std::env::temp_dir);
        Self {
            rapi_port: rapi_proto::RAPI_PORT,
            proxy_dir: runtime.join("synce"),
            info_dir: base.join("synce"),
            connect_timeout_ms: None,
            io_timeout_ms: None,
            max_frame: rapi_proto::MAX_FRAME,
        }
    }
}

impl Config {
    /// Default config file location.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("synce").join("rapi.json"))
    }

    /// Reads a config file.
    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }

    /// Reads `path`, or the default location if `None`.
    ///
    /// An explicit path must exist. A missing file at the default location
    /// yields the defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Writes the config as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = fs::File::create(path)?;
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }

    /// TCP connect deadline.
    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_ms.map(Duration::from_millis)
    }

    /// Per-operation send/receive deadline.
    pub fn io_timeout(&self) -> Option<Duration> {
        self.io_timeout_ms.map(Duration::from_millis)
    }
}
