// SPDX-License-Identifier: MPL-2.0

//! Configurations consumed when setting up an NBD device.
//!
//! A configuration can be built in code or loaded from a TOML file such as:
//!
//! ```toml
//! devpath = "/dev/nbd3"
//! timeout = 30
//! try-netlink = false
//! ```
//!
//! Missing keys take their default values.

use std::fs;

use serde::{Deserialize, Serialize};

use crate::prelude::*;

/// The configuration of one NBD device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct NbdConfig {
    /// The device path, e.g. `/dev/nbd0`.
    ///
    /// An empty path lets the controller pick a free device. A successful
    /// set-up writes the path of the attached device back here.
    pub devpath: String,
    /// The I/O timeout in seconds. A negative value keeps the kernel default.
    pub timeout: i64,
    /// Whether the generic netlink interface may be tried before ioctl.
    pub try_netlink: bool,
}

impl Default for NbdConfig {
    fn default() -> Self {
        Self {
            devpath: String::new(),
            timeout: -1,
            try_netlink: true,
        }
    }
}

impl NbdConfig {
    /// Parses a configuration from TOML.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|err| {
            error!("invalid nbd configuration: {}", err);
            Error::with_message(Errno::EINVAL, "invalid nbd configuration")
        })
    }

    /// Loads a configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).inspect_err(|err| {
            error!("failed to read nbd configuration {}: {}", path.display(), err);
        })?;
        Self::from_toml_str(&content)
    }

    /// Returns the timeout to apply, if any.
    pub fn timeout(&self) -> Option<u64> {
        u64::try_from(self.timeout).ok()
    }
}
