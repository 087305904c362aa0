// SPDX-License-Identifier: MPL-2.0

//! The lifecycle contract shared by both control paths.

use crate::{
    config::NbdConfig,
    device::{
        DeviceHandle, NbdDevices, ServerFlags,
        validate::{DeviceValidator, SysfsValidator},
    },
    ioctl::{IoctlController, KernelIoctl, NbdIoctl},
    netlink::{GenlConnector, KernelConnector, NetlinkController},
    prelude::*,
};

/// A controller of one NBD device.
///
/// A controller attaches at most one device at a time. While attached, it
/// owns the device node through a [`DeviceHandle`].
pub trait NbdController: Debug {
    /// Attaches a device that serves requests through `sock`.
    ///
    /// If `config.devpath` is empty, any free device is picked. On success,
    /// the path of the attached device is written back to `config.devpath`
    /// and its index is returned. On failure, the controller stays
    /// unattached, every resource acquired on the way is released and
    /// `config.devpath` keeps the value of the caller. This holds even when
    /// the kernel had already connected a device, which is disconnected
    /// again before returning.
    ///
    /// Only the bits of `flags` that [`ServerFlags`] defines reach the
    /// kernel. Unknown bits are dropped when the flags are parsed, e.g. by
    /// [`ServerFlags::from_bits_truncate`].
    fn set_up(
        &mut self,
        config: &mut NbdConfig,
        sock: BorrowedFd<'_>,
        size: u64,
        block_size: u32,
        flags: ServerFlags,
    ) -> Result<u32>;

    /// Disconnects the device at `devpath`, which need not be attached by
    /// this controller.
    fn disconnect_by_path(&self, devpath: &str) -> Result<()>;

    /// Changes the size of the attached device.
    fn resize(&self, size: u64) -> Result<()>;

    /// Returns the attached device, if any.
    fn handle(&self) -> Option<&DeviceHandle>;

    /// Releases the attached device. Does nothing if unattached.
    fn clear_up(&mut self);

    /// Returns whether the controller talks generic netlink.
    fn is_netlink(&self) -> bool {
        false
    }

    /// Returns the index of the attached device, i.e. `N` in `/dev/nbdN`.
    fn nbd_index(&self) -> Option<u32> {
        self.handle().map(DeviceHandle::index)
    }

    /// Blocks until the attached device is disconnected.
    ///
    /// Returns immediately if unattached.
    fn run_until_quit(&self) -> Result<()>;
}

/// Marks the device read-only if the server flags ask for it, and
/// writable otherwise.
pub fn check_set_read_only(
    ioctl: &dyn NbdIoctl,
    fd: BorrowedFd<'_>,
    flags: ServerFlags,
) -> Result<()> {
    ioctl.set_read_only(fd, flags.is_read_only()).inspect_err(|err| {
        error!("failed to set the read-only flag: {}", err);
    })
}

/// The host interfaces that the controllers work with.
#[derive(Debug, Clone)]
pub struct Platform {
    pub devices: NbdDevices,
    pub validator: Arc<dyn DeviceValidator>,
    pub connector: Arc<dyn GenlConnector>,
    pub ioctl: Arc<dyn NbdIoctl>,
}

impl Platform {
    /// Returns the interfaces of the running host.
    pub fn host() -> Self {
        let devices = NbdDevices::host();
        Self {
            validator: Arc::new(SysfsValidator::new(devices.clone())),
            connector: Arc::new(KernelConnector),
            ioctl: Arc::new(KernelIoctl),
            devices,
        }
    }
}

impl Default for Platform {
    fn default() -> Self {
        Self::host()
    }
}

/// A controller using either of the control paths.
#[derive(Debug)]
pub enum Controller {
    Ioctl(IoctlController),
    Netlink(NetlinkController),
}

impl Controller {
    /// Picks the netlink path if it is allowed and the kernel supports it,
    /// and the ioctl path otherwise.
    pub fn probe_and_select(config: &NbdConfig, platform: Platform) -> Self {
        if config.try_netlink {
            let netlink = NetlinkController::new(platform.clone());
            if netlink.support() {
                info!("using the netlink interface");
                return Self::Netlink(netlink);
            }
        }
        Self::Ioctl(IoctlController::new(platform))
    }

    fn inner(&self) -> &dyn NbdController {
        match self {
            Self::Ioctl(controller) => controller,
            Self::Netlink(controller) => controller,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn NbdController {
        match self {
            Self::Ioctl(controller) => controller,
            Self::Netlink(controller) => controller,
        }
    }
}

impl NbdController for Controller {
    fn set_up(
        &mut self,
        config: &mut NbdConfig,
        sock: BorrowedFd<'_>,
        size: u64,
        block_size: u32,
        flags: ServerFlags,
    ) -> Result<u32> {
        self.inner_mut().set_up(config, sock, size, block_size, flags)
    }

    fn disconnect_by_path(&self, devpath: &str) -> Result<()> {
        self.inner().disconnect_by_path(devpath)
    }

    fn resize(&self, size: u64) -> Result<()> {
        self.inner().resize(size)
    }

    fn handle(&self) -> Option<&DeviceHandle> {
        self.inner().handle()
    }

    fn run_until_quit(&self) -> Result<()> {
        self.inner().run_until_quit()
    }

    fn clear_up(&mut self) {
        self.inner_mut().clear_up()
    }

    fn is_netlink(&self) -> bool {
        self.inner().is_netlink()
    }
}
