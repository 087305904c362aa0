// SPDX-License-Identifier: MPL-2.0

//! The legacy control path, which configures NBD devices with ioctls.

mod defs;
#[cfg(test)]
pub(crate) mod fake;

use crate::{
    config::NbdConfig,
    controller::{NbdController, Platform, check_set_read_only},
    device::{self, DeviceHandle, ServerFlags},
    prelude::*,
};

/// The NBD and block device ioctls that the controllers issue.
///
/// Every method acts on the device node `fd`.
pub trait NbdIoctl: Send + Sync + Debug {
    /// Hands the connected socket `sock` to the device.
    fn set_sock(&self, fd: BorrowedFd<'_>, sock: BorrowedFd<'_>) -> Result<()>;

    fn set_blksize(&self, fd: BorrowedFd<'_>, block_size: u32) -> Result<()>;

    fn set_size(&self, fd: BorrowedFd<'_>, size: u64) -> Result<()>;

    fn set_flags(&self, fd: BorrowedFd<'_>, flags: u64) -> Result<()>;

    /// Sets the I/O timeout in seconds.
    fn set_timeout(&self, fd: BorrowedFd<'_>, timeout: u64) -> Result<()>;

    /// Marks the block device as read-only or writable.
    fn set_read_only(&self, fd: BorrowedFd<'_>, read_only: bool) -> Result<()>;

    fn clear_sock(&self, fd: BorrowedFd<'_>) -> Result<()>;

    fn disconnect(&self, fd: BorrowedFd<'_>) -> Result<()>;

    /// Serves the device until it is disconnected.
    ///
    /// This blocks in the kernel for as long as the device stays connected.
    fn do_it(&self, fd: BorrowedFd<'_>) -> Result<()>;
}

/// Issues the ioctls to the running kernel.
#[derive(Debug, Clone, Copy, Default)]
pub struct KernelIoctl;

impl NbdIoctl for KernelIoctl {
    fn set_sock(&self, fd: BorrowedFd<'_>, sock: BorrowedFd<'_>) -> Result<()> {
        defs::set_sock(fd, sock)
    }

    fn set_blksize(&self, fd: BorrowedFd<'_>, block_size: u32) -> Result<()> {
        defs::set_blksize(fd, block_size)
    }

    fn set_size(&self, fd: BorrowedFd<'_>, size: u64) -> Result<()> {
        defs::set_size(fd, size)
    }

    fn set_flags(&self, fd: BorrowedFd<'_>, flags: u64) -> Result<()> {
        defs::set_flags(fd, flags)
    }

    fn set_timeout(&self, fd: BorrowedFd<'_>, timeout: u64) -> Result<()> {
        defs::set_timeout(fd, timeout)
    }

    fn set_read_only(&self, fd: BorrowedFd<'_>, read_only: bool) -> Result<()> {
        defs::set_read_only(fd, read_only)
    }

    fn clear_sock(&self, fd: BorrowedFd<'_>) -> Result<()> {
        defs::clear_sock(fd)
    }

    fn disconnect(&self, fd: BorrowedFd<'_>) -> Result<()> {
        defs::disconnect(fd)
    }

    fn do_it(&self, fd: BorrowedFd<'_>) -> Result<()> {
        defs::do_it(fd)
    }
}

/// A controller that attaches devices through the ioctl interface.
#[derive(Debug)]
pub struct IoctlController {
    platform: Platform,
    handle: Option<DeviceHandle>,
}

impl IoctlController {
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            handle: None,
        }
    }

    /// Claims the first device that accepts the socket.
    fn map_on_unused_device(&self, sock: BorrowedFd<'_>) -> Result<(DeviceHandle, String)> {
        let devices = &self.platform.devices;
        let max_count = devices.max_count();
        let mut last_try = None;

        for index in 0..max_count {
            let devpath = devices.path_of(index);
            match self.map_on_device_by_path(sock, &devpath, false) {
                Ok(handle) => return Ok((handle, devpath)),
                Err(err) => last_try = Some((index, err)),
            }
        }

        match last_try {
            Some((index, err)) => error!(
                "failed to map on unused device, max nbd index: {}, last try nbd index: {}, last error: {}",
                max_count - 1,
                index,
                err
            ),
            None => error!("failed to map on unused device, no nbd device exists"),
        }
        return_errno_with_message!(Errno::ENODEV, "no free nbd device");
    }

    /// Claims the device at `devpath`.
    fn map_on_device_by_path(
        &self,
        sock: BorrowedFd<'_>,
        devpath: &str,
        log_when_error: bool,
    ) -> Result<DeviceHandle> {
        let index = self.platform.devices.index_of(devpath)?;

        let file = device::open_device(devpath).inspect_err(|err| {
            if log_when_error {
                error!("failed to open device {}: {}", devpath, err);
            }
        })?;

        self.platform.ioctl.set_sock(file.as_fd(), sock).inspect_err(|err| {
            if log_when_error {
                error!("NBD_SET_SOCK failed on {}: {}", devpath, err);
            }
        })?;

        Ok(DeviceHandle::new(file, index))
    }

    fn init_dev_attr(
        &self,
        handle: &DeviceHandle,
        config: &NbdConfig,
        size: u64,
        block_size: u32,
        flags: ServerFlags,
    ) -> Result<()> {
        let ioctl = self.platform.ioctl.as_ref();
        let fd = handle.as_fd();
        ioctl.set_blksize(fd, block_size)?;
        ioctl.set_size(fd, size)?;
        ioctl.set_flags(fd, flags.bits())?;
        check_set_read_only(ioctl, fd, flags)?;
        if let Some(timeout) = config.timeout() {
            ioctl.set_timeout(fd, timeout).inspect_err(|err| {
                error!("failed to set timeout: {}", err);
            })?;
        }
        Ok(())
    }

    fn configure(
        &self,
        handle: &DeviceHandle,
        config: &NbdConfig,
        size: u64,
        block_size: u32,
        flags: ServerFlags,
    ) -> Result<()> {
        self.init_dev_attr(handle, config, size, block_size, flags)?;
        let validator = &self.platform.validator;
        validator.check_device_size(handle.index(), size)?;
        validator.check_block_size(handle.index(), block_size)?;
        Ok(())
    }

    /// Detaches the socket from a partially configured device and closes it.
    fn unwind(&self, handle: DeviceHandle) {
        if let Err(err) = self.platform.ioctl.clear_sock(handle.as_fd()) {
            warn!("NBD_CLEAR_SOCK failed on nbd{}: {}", handle.index(), err);
        }
    }
}

impl NbdController for IoctlController {
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

        let (handle, devpath) = if config.devpath.is_empty() {
            self.map_on_unused_device(sock)?
        } else {
            let handle = self.map_on_device_by_path(sock, &config.devpath, true)?;
            (handle, config.devpath.clone())
        };

        if let Err(err) = self.configure(&handle, config, size, block_size, flags) {
            error!("failed to map {}: {}", devpath, err);
            self.unwind(handle);
            return Err(err);
        }

        let index = handle.index();
        debug!("attached {} through ioctl", devpath);
        config.devpath = devpath;
        self.handle = Some(handle);
        Ok(index)
    }

    fn disconnect_by_path(&self, devpath: &str) -> Result<()> {
        let file = device::open_device(devpath).inspect_err(|err| {
            error!("failed to open device {}: {}", devpath, err);
        })?;

        if let Err(err) = self.platform.ioctl.disconnect(file.as_fd()) {
            warn!("the device {} is not used: {}", devpath, err);
        }
        Ok(())
    }

    fn resize(&self, size: u64) -> Result<()> {
        let Some(handle) = &self.handle else {
            error!("resize failed: nbd controller is not set up");
            return_errno_with_message!(Errno::ENODEV, "the controller is not attached");
        };

        self.platform.ioctl.set_size(handle.as_fd(), size).inspect_err(|err| {
            error!("resize failed: {}", err);
        })
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
}

#[cfg(test)]
mod test {
    use std::{fs, mem::discriminant, os::unix::net::UnixStream};

    use super::{
        fake::{IoctlCall, RecordingIoctl},
        *,
    };
    use crate::device::NbdDevices;

    fn platform_in(dir: &Path) -> Platform {
        let devices = NbdDevices::new(dir.join("nbd").to_str().unwrap(), dir.join("sys"));
        Platform {
            devices: devices.clone(),
            validator: Arc::new(crate::device::validate::SysfsValidator::new(devices)),
            ..Platform::host()
        }
    }

    /// Lays out `count` device nodes whose sysfs entries report `size` and
    /// `block_size`.
    fn fake_host(dir: &Path, count: u32, size: u64, block_size: u32) {
        let params = dir.join("sys/module/nbd/parameters");
        fs::create_dir_all(&params).unwrap();
        fs::write(params.join("nbds_max"), format!("{}\n", count)).unwrap();
        for index in 0..count {
            fs::write(dir.join(format!("nbd{}", index)), b"").unwrap();
            let queue = dir.join(format!("sys/block/nbd{}/queue", index));
            fs::create_dir_all(&queue).unwrap();
            fs::write(queue.parent().unwrap().join("size"), format!("{}\n", size / 512)).unwrap();
            fs::write(queue.join("logical_block_size"), format!("{}\n", block_size)).unwrap();
        }
    }

    fn recording_controller(dir: &Path, ioctl: &Arc<RecordingIoctl>) -> IoctlController {
        IoctlController::new(Platform {
            ioctl: ioctl.clone(),
            ..platform_in(dir)
        })
    }

    #[test]
    fn set_up_claims_first_free_slot() {
        let dir = tempfile::tempdir().unwrap();
        fake_host(dir.path(), 4, 1 << 30, 4096);
        let ioctl = RecordingIoctl::new();
        ioctl.busy_devices(1);
        let mut controller = recording_controller(dir.path(), &ioctl);

        let (sock, _peer) = UnixStream::pair().unwrap();
        let mut config = NbdConfig {
            timeout: 30,
            ..NbdConfig::default()
        };
        let flags = ServerFlags::HAS_FLAGS | ServerFlags::SEND_FLUSH;
        let index = controller
            .set_up(&mut config, sock.as_fd(), 1 << 30, 4096, flags)
            .unwrap();

        assert_eq!(index, 1);
        assert_eq!(config.devpath, dir.path().join("nbd1").to_str().unwrap());
        assert_eq!(controller.nbd_index(), Some(1));
        assert_eq!(
            ioctl.calls(),
            vec![
                IoctlCall::SetSock,
                IoctlCall::SetSock,
                IoctlCall::SetBlksize(4096),
                IoctlCall::SetSize(1 << 30),
                IoctlCall::SetFlags(flags.bits()),
                IoctlCall::SetReadOnly(false),
                IoctlCall::SetTimeout(30),
            ]
        );

        controller.resize(2 << 30).unwrap();
        controller.run_until_quit().unwrap();
        controller.disconnect_by_path(&config.devpath).unwrap();
        assert_eq!(
            ioctl.calls()[7..],
            [
                IoctlCall::SetSize(2 << 30),
                IoctlCall::DoIt,
                IoctlCall::Disconnect
            ]
        );

        controller.clear_up();
        assert!(controller.handle().is_none());
    }

    #[test]
    fn negative_timeout_is_not_applied() {
        let dir = tempfile::tempdir().unwrap();
        fake_host(dir.path(), 1, 1 << 20, 512);
        let ioctl = RecordingIoctl::new();
        let mut controller = recording_controller(dir.path(), &ioctl);

        let (sock, _peer) = UnixStream::pair().unwrap();
        let mut config = NbdConfig {
            timeout: -1,
            ..NbdConfig::default()
        };
        controller
            .set_up(&mut config, sock.as_fd(), 1 << 20, 512, ServerFlags::READ_ONLY)
            .unwrap();

        let calls = ioctl.calls();
        assert_eq!(calls.last(), Some(&IoctlCall::SetReadOnly(true)));
        assert!(!calls.iter().any(|call| matches!(call, IoctlCall::SetTimeout(_))));
    }

    #[test]
    fn failed_attribute_unwinds() {
        for failing in [
            IoctlCall::SetBlksize(0),
            IoctlCall::SetSize(0),
            IoctlCall::SetFlags(0),
            IoctlCall::SetReadOnly(false),
            IoctlCall::SetTimeout(0),
        ] {
            let dir = tempfile::tempdir().unwrap();
            fake_host(dir.path(), 2, 1 << 20, 512);
            let ioctl = RecordingIoctl::new();
            ioctl.fail_on(failing, Errno::EIO);
            let mut controller = recording_controller(dir.path(), &ioctl);

            let (sock, _peer) = UnixStream::pair().unwrap();
            let mut config = NbdConfig {
                timeout: 30,
                ..NbdConfig::default()
            };
            let error = controller
                .set_up(&mut config, sock.as_fd(), 1 << 20, 512, ServerFlags::empty())
                .unwrap_err();

            assert_eq!(error.error(), Errno::EIO, "failing {:?}", failing);
            assert!(controller.handle().is_none());
            assert!(config.devpath.is_empty());

            // The failed request is the last one before the socket is cleared.
            let calls = ioctl.calls();
            let [.., failed, last] = calls.as_slice() else {
                panic!("too few ioctls: {:?}", calls);
            };
            assert_eq!(discriminant(failed), discriminant(&failing));
            assert_eq!(*last, IoctlCall::ClearSock);
            assert_eq!(calls.iter().filter(|call| **call == IoctlCall::SetSock).count(), 1);
        }
    }

    #[test]
    fn geometry_mismatch_unwinds() {
        let dir = tempfile::tempdir().unwrap();
        fake_host(dir.path(), 1, 1 << 20, 512);
        let ioctl = RecordingIoctl::new();
        let mut controller = recording_controller(dir.path(), &ioctl);

        let (sock, _peer) = UnixStream::pair().unwrap();
        let mut config = NbdConfig::default();
        let error = controller
            .set_up(&mut config, sock.as_fd(), 2 << 20, 512, ServerFlags::empty())
            .unwrap_err();

        assert_eq!(error.error(), Errno::EINVAL);
        assert!(controller.handle().is_none());
        assert!(config.devpath.is_empty());
        assert_eq!(ioctl.calls().last(), Some(&IoctlCall::ClearSock));
    }

    #[test]
    fn busy_explicit_path_is_not_unwound() {
        let dir = tempfile::tempdir().unwrap();
        fake_host(dir.path(), 4, 1 << 20, 512);
        let ioctl = RecordingIoctl::new();
        ioctl.busy_devices(1);
        let mut controller = recording_controller(dir.path(), &ioctl);

        let (sock, _peer) = UnixStream::pair().unwrap();
        let devpath = dir.path().join("nbd2").to_str().unwrap().to_string();
        let mut config = NbdConfig {
            devpath: devpath.clone(),
            ..NbdConfig::default()
        };
        let error = controller
            .set_up(&mut config, sock.as_fd(), 1 << 20, 512, ServerFlags::empty())
            .unwrap_err();

        assert_eq!(error.error(), Errno::EBUSY);
        assert_eq!(config.devpath, devpath);
        assert_eq!(ioctl.calls(), vec![IoctlCall::SetSock]);
    }

    #[test]
    fn scan_without_claimable_device() {
        let dir = tempfile::tempdir().unwrap();
        let params = dir.path().join("sys/module/nbd/parameters");
        fs::create_dir_all(&params).unwrap();
        fs::write(params.join("nbds_max"), "4\n").unwrap();
        // Regular files can be opened but refuse `NBD_SET_SOCK`.
        fs::write(dir.path().join("nbd1"), b"").unwrap();

        let mut controller = IoctlController::new(platform_in(dir.path()));
        let (sock, _peer) = UnixStream::pair().unwrap();
        let mut config = NbdConfig::default();

        let error = controller
            .set_up(&mut config, sock.as_fd(), 1 << 20, 512, ServerFlags::HAS_FLAGS)
            .unwrap_err();
        assert_eq!(error.error(), Errno::ENODEV);
        assert!(controller.handle().is_none());
        assert!(config.devpath.is_empty());
    }

    #[test]
    fn explicit_path_that_refuses_the_socket() {
        let dir = tempfile::tempdir().unwrap();
        let devpath = dir.path().join("nbd2");
        fs::write(&devpath, b"").unwrap();

        let mut controller = IoctlController::new(platform_in(dir.path()));
        let (sock, _peer) = UnixStream::pair().unwrap();
        let mut config = NbdConfig {
            devpath: devpath.to_str().unwrap().to_string(),
            ..NbdConfig::default()
        };

        let error = controller
            .set_up(&mut config, sock.as_fd(), 1 << 20, 512, ServerFlags::empty())
            .unwrap_err();
        assert_eq!(error.error(), Errno::ENOTTY);
        assert_eq!(controller.nbd_index(), None);
    }

    #[test]
    fn disconnect_missing_device() {
        let controller = IoctlController::new(Platform::host());
        let error = controller.disconnect_by_path("/dev/xxx99").unwrap_err();
        assert_eq!(error.error(), Errno::ENOENT);
    }

    #[test]
    fn disconnect_unused_node_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let devpath = dir.path().join("nbd0");
        fs::write(&devpath, b"").unwrap();

        let controller = IoctlController::new(platform_in(dir.path()));
        controller
            .disconnect_by_path(devpath.to_str().unwrap())
            .unwrap();
    }

    #[test]
    fn resize_before_set_up() {
        let controller = IoctlController::new(Platform::host());
        let error = controller.resize(1 << 30).unwrap_err();
        assert_eq!(error.error(), Errno::ENODEV);
    }

    #[test]
    fn unattached_controller() {
        let mut controller = IoctlController::new(Platform::host());
        assert!(!controller.is_netlink());
        controller.run_until_quit().unwrap();
        controller.clear_up();
        controller.clear_up();
        assert!(controller.handle().is_none());
    }
}
