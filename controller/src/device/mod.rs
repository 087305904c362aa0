// SPDX-License-Identifier: MPL-2.0

//! NBD device nodes.
//!
//! An NBD device is identified either by its index `N` or by its path
//! `/dev/nbdN`. [`NbdDevices`] converts between both representations and
//! locates the sysfs entries of a device, and [`DeviceHandle`] owns an
//! attached device node.

mod flags;
mod id;
pub mod validate;

use std::{fs, os::unix::fs::FileTypeExt};

pub use flags::ServerFlags;
pub use id::{DeviceId, NBD_MAJOR};

use crate::prelude::*;

/// The prefix of NBD device paths on the host.
pub const NBD_DEVICE_PREFIX: &str = "/dev/nbd";

/// The mount point of sysfs on the host.
pub const SYSFS_ROOT: &str = "/sys";

/// The number of devices the `nbd` module creates when `nbds_max` is unknown.
///
/// Reference: <https://elixir.bootlin.com/linux/v6.13/source/drivers/block/nbd.c#L163>.
const DEFAULT_NBDS_MAX: u32 = 16;

/// Resolves NBD device paths, indexes and sysfs entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NbdDevices {
    prefix: String,
    sysfs_root: PathBuf,
}

impl NbdDevices {
    /// Creates a resolver for device paths starting with `prefix` and
    /// sysfs mounted at `sysfs_root`.
    pub fn new(prefix: impl Into<String>, sysfs_root: impl Into<PathBuf>) -> Self {
        Self {
            prefix: prefix.into(),
            sysfs_root: sysfs_root.into(),
        }
    }

    /// Creates a resolver for the devices of the host.
    pub fn host() -> Self {
        Self::new(NBD_DEVICE_PREFIX, SYSFS_ROOT)
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Returns the path of the device with `index`.
    pub fn path_of(&self, index: u32) -> String {
        format!("{}{}", self.prefix, index)
    }

    /// Extracts the index from a device path.
    ///
    /// The index must be written in canonical decimal form, so that
    /// `path_of(index_of(path)?) == path` holds for every accepted path.
    /// This is stricter than a `scanf("%d")` style parser: leading zeros
    /// (`/dev/nbd01`), signs and trailing characters are rejected with
    /// `EINVAL` instead of being read as the index they start with.
    pub fn index_of(&self, devpath: &str) -> Result<u32> {
        let Some(digits) = devpath.strip_prefix(self.prefix.as_str()) else {
            warn!("invalid nbd device path: {}", devpath);
            return_errno_with_message!(Errno::EINVAL, "the path does not name an nbd device");
        };

        let is_canonical = !digits.is_empty()
            && digits.bytes().all(|byte| byte.is_ascii_digit())
            && (digits == "0" || !digits.starts_with('0'));
        if !is_canonical {
            warn!("invalid nbd device path: {}", devpath);
            return_errno_with_message!(Errno::EINVAL, "the nbd device path has no valid index");
        }

        digits.parse::<u32>().map_err(|_| {
            warn!("invalid nbd device path: {}", devpath);
            Error::with_message(Errno::EINVAL, "the nbd device index is out of range")
        })
    }

    /// Returns the number of NBD devices the kernel module created.
    pub fn max_count(&self) -> u32 {
        let path = self.sysfs_root.join("module/nbd/parameters/nbds_max");
        match fs::read_to_string(&path) {
            Ok(content) => match content.trim().parse::<u32>() {
                Ok(count) => count,
                Err(_) => {
                    warn!("invalid content in {}: {:?}", path.display(), content);
                    DEFAULT_NBDS_MAX
                }
            },
            Err(err) => {
                debug!("failed to read {}: {}", path.display(), err);
                DEFAULT_NBDS_MAX
            }
        }
    }

    /// Returns the sysfs directory of the block device with `index`.
    pub fn sysfs_dir_of(&self, index: u32) -> PathBuf {
        self.sysfs_root.join("block").join(format!("nbd{}", index))
    }

    /// Checks that `devpath` is a block device node driven by `nbd`.
    pub fn check_device_node(&self, devpath: &str) -> Result<()> {
        let metadata = fs::metadata(devpath).inspect_err(|err| {
            warn!("failed to stat device {}: {}", devpath, err);
        })?;

        if !metadata.file_type().is_block_device() {
            warn!("{} is not a block device", devpath);
            return_errno_with_message!(Errno::ENOTBLK, "the nbd device path is not a block device");
        }

        let id = DeviceId::from_metadata(&metadata);
        if !id.is_nbd() {
            warn!("{} has major number {}, not {}", devpath, id.major(), NBD_MAJOR);
            return_errno_with_message!(Errno::ENODEV, "the block device is not an nbd device");
        }

        Ok(())
    }
}

impl Default for NbdDevices {
    fn default() -> Self {
        Self::host()
    }
}

/// An attached NBD device node.
///
/// The node and the index always travel together, so a controller either
/// holds a complete handle or none at all.
#[derive(Debug)]
pub struct DeviceHandle {
    file: File,
    index: u32,
}

impl DeviceHandle {
    pub(crate) fn new(file: File, index: u32) -> Self {
        Self { file, index }
    }

    /// Returns the device index, i.e. `N` in `/dev/nbdN`.
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn file(&self) -> &File {
        &self.file
    }
}

impl AsFd for DeviceHandle {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.file.as_fd()
    }
}

/// Opens a device node for reading and writing.
pub(crate) fn open_device(devpath: &str) -> Result<File> {
    let file = File::options().read(true).write(true).open(devpath)?;
    Ok(file)
}
