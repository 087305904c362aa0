// SPDX-License-Identifier: MPL-2.0

//! The generic netlink control path.
//!
//! Devices are attached by sending `NBD_CMD_CONNECT` to the `nbd` family,
//! which picks or claims the device and reports its index. Every public
//! operation talks to the kernel through its own [`GenlSession`].

mod channel;
mod message;
mod session;

pub use channel::{GenlChannel, GenlConnector, KernelConnector, NetlinkSocket};
pub use message::{NbdAttr, NbdCmd, NbdSockAttr, NbdSockItemAttr};

use self::{
    message::{ConnectParams, disconnect_attrs, index_of, reconfigure_attrs},
    session::GenlSession,
};
use crate::{
    config::NbdConfig,
    controller::{NbdController, Platform, check_set_read_only},
    device::{self, DeviceHandle, ServerFlags},
    prelude::*,
};

/// A controller that attaches devices through the `nbd` netlink family.
#[derive(Debug)]
pub struct NetlinkController {
    platform: Platform,
    handle: Option<DeviceHandle>,
}

impl NetlinkController {
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            handle: None,
        }
    }

    /// Returns whether the running kernel exposes the `nbd` family.
    pub fn support(&self) -> bool {
        match self.open_session() {
            Ok(_session) => true,
            Err(_) => {
                info!("netlink interface not supported, using the ioctl interface");
                false
            }
        }
    }

    fn open_session(&self) -> Result<GenlSession> {
        GenlSession::open(self.platform.connector.as_ref())
    }

    fn connect(&self, params: ConnectParams) -> Result<u32> {
        let mut session = self.open_session()?;
        let reply = session.transact(NbdCmd::CONNECT, params.into_attrs())?;

        let attrs = match reply {
            Some(reply) => reply.attrs::<NbdAttr>()?,
            None => Vec::new(),
        };
        match index_of(&attrs) {
            Some(index) => Ok(index),
            None => {
                error!("netlink connect reply missing device index");
                return_errno_with_message!(Errno::ENODATA, "missing attribute");
            }
        }
    }

    fn disconnect_index(&self, index: u32) -> Result<()> {
        let mut session = self.open_session()?;
        session.transact(NbdCmd::DISCONNECT, disconnect_attrs(index))?;
        Ok(())
    }

    /// Opens the device that the kernel has just connected.
    fn attach(
        &self,
        devpath: &str,
        size: u64,
        block_size: u32,
        flags: ServerFlags,
    ) -> Result<DeviceHandle> {
        let devices = &self.platform.devices;
        let validator = &self.platform.validator;

        let index = devices.index_of(devpath)?;
        validator.check_block_size(index, block_size)?;
        validator.check_device_size(index, size)?;
        validator.check_device_node(devpath)?;

        let file = device::open_device(devpath).inspect_err(|err| {
            error!("failed to open device {}: {}", devpath, err);
        })?;
        check_set_read_only(self.platform.ioctl.as_ref(), file.as_fd(), flags)?;

        Ok(DeviceHandle::new(file, index))
    }
}

impl NbdController for NetlinkController {
    fn set_up(
        &mut self,
        config: &mut NbdConfig,
        sock: BorrowedFd<'_>,
        size: u64,
        block_size: u32,
        flags: ServerFlags,
    ) -> Result<u32> {
        if let Some(handle) = &self.handle {
            warn!("nbd{} is already attached", handle.index());
            return_errno_with_message!(Errno::EBUSY, "the controller is already attached");
        }

        let requested = if config.devpath.is_empty() {
            None
        } else {
            Some(self.platform.devices.index_of(&config.devpath)?)
        };

        let params = ConnectParams {
            index: requested,
            timeout: config.timeout(),
            size,
            block_size,
            flags,
            sock: sock.as_raw_fd(),
        };
        let index = self.connect(params)?;
        let devpath = self.platform.devices.path_of(index);

        let handle = match self.attach(&devpath, size, block_size, flags) {
            Ok(handle) => handle,
            Err(err) => {
                error!("failed to attach {}: {}", devpath, err);
                if let Err(disconnect_err) = self.disconnect_index(index) {
                    warn!("failed to disconnect {}: {}", devpath, disconnect_err);
                }
                return Err(err);
            }
        };

        debug!("attached {} through netlink", devpath);
        config.devpath = devpath;
        self.handle = Some(handle);
        Ok(index)
    }

    fn disconnect_by_path(&self, devpath: &str) -> Result<()> {
        let index = self.platform.devices.index_of(devpath)?;
        self.disconnect_index(index)
    }

    fn resize(&self, size: u64) -> Result<()> {
        let Some(handle) = &self.handle else {
            error!("resize failed: nbd controller is not set up");
            return_errno_with_message!(Errno::ENODEV, "the controller is not attached");
        };

        let mut session = self.open_session()?;
        session.transact(NbdCmd::RECONFIGURE, reconfigure_attrs(handle.index(), size))?;
        Ok(())
    }

    fn run_until_quit(&self) -> Result<()> {
        match &self.handle {
            Some(handle) => self.platform.ioctl.do_it(handle.as_fd()),
            None => Ok(()),
        }
    }

    fn handle(&self) -> Option<&DeviceHandle> {
        self.handle.as_ref()
    }

    fn clear_up(&mut self) {
        if let Some(handle) = self.handle.take() {
            debug!("released nbd{}", handle.index());
        }
    }

    fn is_netlink(&self) -> bool {
        true
    }
}
