// SPDX-License-Identifier: MPL-2.0

//! Attaching Linux NBD devices to the block layer.
//!
//! A process that serves an NBD export owns one end of a connected socket.
//! This crate hands the other end to the kernel, configures the resulting
//! `/dev/nbdN` device and tears it down again. Two control paths exist:
//!
//! - the legacy ioctl interface, see [`IoctlController`];
//! - the `nbd` generic netlink family, see [`NetlinkController`].
//!
//! [`Controller::probe_and_select`] prefers netlink and falls back to ioctl
//! on kernels without the `nbd` family.
//!
//! The crate emits log records through [`log`] and never installs a logger.

pub mod config;
pub mod controller;
pub mod device;
pub mod error;
mod ioctl;
pub mod netlink;
mod prelude;

pub use self::{
    config::NbdConfig,
    controller::{Controller, NbdController, Platform, check_set_read_only},
    device::{
        DeviceHandle, NbdDevices, ServerFlags,
        validate::{DeviceValidator, SysfsValidator},
    },
    error::{Errno, Error},
    ioctl::{IoctlController, KernelIoctl, NbdIoctl},
    netlink::{GenlChannel, GenlConnector, NetlinkController},
};

/// The result type of this crate.
pub type Result<T> = core::result::Result<T, Error>;
