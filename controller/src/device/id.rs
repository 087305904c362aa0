// SPDX-License-Identifier: MPL-2.0

use std::{fs::Metadata, os::unix::fs::MetadataExt};

/// The major number of NBD block devices.
///
/// Reference: <https://elixir.bootlin.com/linux/v6.13/source/include/uapi/linux/major.h#L56>.
pub const NBD_MAJOR: u32 = 43;

/// The device number of a device node, split into its major and minor parts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeviceId {
    major: u32,
    minor: u32,
}

impl DeviceId {
    pub fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    /// Returns the ID of the device that a node refers to.
    pub fn from_metadata(metadata: &Metadata) -> Self {
        Self::from_encoded_u64(metadata.rdev())
    }

    /// Decodes a `dev_t` as encoded by glibc.
    ///
    /// Reference: <https://github.com/bminor/glibc/blob/632d895f3e5d98162f77b9c3c1da4ec19968b671/bits/sysmacros.h#L26-L34>.
    pub fn from_encoded_u64(raw: u64) -> Self {
        let major = ((raw >> 32) & 0xffff_f000 | (raw >> 8) & 0x0000_0fff) as u32;
        let minor = ((raw >> 12) & 0xffff_ff00 | raw & 0x0000_00ff) as u32;
        Self::new(major, minor)
    }

    pub fn major(&self) -> u32 {
        self.major
    }

    pub fn minor(&self) -> u32 {
        self.minor
    }

    /// Returns whether the device is driven by `nbd`.
    pub fn is_nbd(&self) -> bool {
        self.major == NBD_MAJOR
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn decode_nbd_device_numbers() {
        // makedev(43, 0) and makedev(43, 32) as the kernel reports them.
        assert_eq!(DeviceId::from_encoded_u64(0x2b00), DeviceId::new(NBD_MAJOR, 0));
        assert_eq!(DeviceId::from_encoded_u64(0x2b20), DeviceId::new(NBD_MAJOR, 32));
        assert!(DeviceId::from_encoded_u64(0x2b20).is_nbd());

        // makedev(259, 0), an extended block device.
        let extended = DeviceId::from_encoded_u64(0x10300);
        assert_eq!(extended.major(), 259);
        assert_eq!(extended.minor(), 0);
        assert!(!extended.is_nbd());
    }

    #[test]
    fn large_minor_numbers() {
        // makedev(43, 0x1234).
        let id = DeviceId::from_encoded_u64(0x0120_2b34);
        assert_eq!(id, DeviceId::new(NBD_MAJOR, 0x1234));
    }
}
