// SPDX-License-Identifier: MPL-2.0

//! Post-attach validation of NBD devices.
//!
//! After a device is attached, the size and the block size that the kernel
//! reports must match the ones that were requested, and the node that is
//! about to be opened must be an NBD block device.

use std::fs;

use super::NbdDevices;
use crate::prelude::*;

/// The unit of `/sys/block/<dev>/size`.
const SECTOR_SIZE: u64 = 512;

/// Confirms the geometry that the kernel reports for an attached device.
pub trait DeviceValidator: Send + Sync + Debug {
    /// Checks that the device with `index` has `size` bytes.
    fn check_device_size(&self, index: u32, size: u64) -> Result<()>;

    /// Checks that the device with `index` uses blocks of `block_size` bytes.
    fn check_block_size(&self, index: u32, block_size: u32) -> Result<()>;

    /// Checks that `devpath` is a block device node driven by `nbd`.
    fn check_device_node(&self, devpath: &str) -> Result<()>;
}

/// A validator that reads the block device attributes from sysfs.
#[derive(Debug, Clone)]
pub struct SysfsValidator {
    devices: NbdDevices,
}

impl SysfsValidator {
    pub fn new(devices: NbdDevices) -> Self {
        Self { devices }
    }

    fn read_attr(&self, index: u32, name: &str) -> Result<u64> {
        let path = self.devices.sysfs_dir_of(index).join(name);
        let content = fs::read_to_string(&path).inspect_err(|err| {
            warn!("failed to read {}: {}", path.display(), err);
        })?;
        content.trim().parse::<u64>().map_err(|_| {
            warn!("invalid content in {}: {:?}", path.display(), content);
            Error::with_message(Errno::EINVAL, "invalid block device attribute")
        })
    }
}

impl Default for SysfsValidator {
    fn default() -> Self {
        Self::new(NbdDevices::host())
    }
}

impl DeviceValidator for SysfsValidator {
    fn check_device_size(&self, index: u32, size: u64) -> Result<()> {
        let sectors = self.read_attr(index, "size")?;
        let actual = sectors.saturating_mul(SECTOR_SIZE);
        // The kernel rounds the size down to a whole number of sectors.
        let expected = size / SECTOR_SIZE * SECTOR_SIZE;
        if actual != expected {
            error!(
                "size of nbd{} mismatched: expected {}, got {}",
                index, expected, actual
            );
            return_errno_with_message!(Errno::EINVAL, "the nbd device size does not match");
        }
        Ok(())
    }

    fn check_block_size(&self, index: u32, block_size: u32) -> Result<()> {
        let actual = self.read_attr(index, "queue/logical_block_size")?;
        if actual != u64::from(block_size) {
            error!(
                "block size of nbd{} mismatched: expected {}, got {}",
                index, block_size, actual
            );
            return_errno_with_message!(Errno::EINVAL, "the nbd block size does not match");
        }
        Ok(())
    }

    fn check_device_node(&self, devpath: &str) -> Result<()> {
        self.devices.check_device_node(devpath)
    }
}
