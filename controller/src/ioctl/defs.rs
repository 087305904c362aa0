// SPDX-License-Identifier: MPL-2.0

//! Raw NBD and block device ioctls.

use nix::{
    errno::Errno as NixErrno,
    libc::{self, c_int, c_ulong},
    request_code_none,
    sys::ioctl::ioctl_num_type,
};

use crate::prelude::*;

// Reference: <https://elixir.bootlin.com/linux/v6.13/source/include/uapi/linux/nbd.h#L24>

const NBD_SET_SOCK:    ioctl_num_type = request_code_none!(0xab, 0);
const NBD_SET_BLKSIZE: ioctl_num_type = request_code_none!(0xab, 1);
const NBD_SET_SIZE:    ioctl_num_type = request_code_none!(0xab, 2);
const NBD_DO_IT:       ioctl_num_type = request_code_none!(0xab, 3);
const NBD_CLEAR_SOCK:  ioctl_num_type = request_code_none!(0xab, 4);
const NBD_DISCONNECT:  ioctl_num_type = request_code_none!(0xab, 8);
const NBD_SET_TIMEOUT: ioctl_num_type = request_code_none!(0xab, 9);
const NBD_SET_FLAGS:   ioctl_num_type = request_code_none!(0xab, 10);

// Reference: <https://elixir.bootlin.com/linux/v6.13/source/include/uapi/linux/fs.h#L185>

const BLKROSET:        ioctl_num_type = request_code_none!(0x12, 93);

/// Issues an ioctl that carries its argument by value.
fn ioctl_with_val(fd: BorrowedFd<'_>, request: ioctl_num_type, val: u64) -> Result<c_int> {
    let arg = c_ulong::try_from(val).map_err(|_| Error::new(Errno::EOVERFLOW))?;
    // SAFETY: The descriptor is borrowed for the duration of the call and the
    // request interprets `arg` as an integer, so no memory is accessed.
    let ret = unsafe { libc::ioctl(fd.as_raw_fd(), request, arg) };
    Ok(NixErrno::result(ret)?)
}

/// Issues an ioctl without argument.
fn ioctl_without_val(fd: BorrowedFd<'_>, request: ioctl_num_type) -> Result<c_int> {
    ioctl_with_val(fd, request, 0)
}

/// Hands the connected socket `sock` to the device.
pub(super) fn set_sock(fd: BorrowedFd<'_>, sock: BorrowedFd<'_>) -> Result<()> {
    ioctl_with_val(fd, NBD_SET_SOCK, sock.as_raw_fd() as u64)?;
    Ok(())
}

pub(super) fn set_blksize(fd: BorrowedFd<'_>, block_size: u32) -> Result<()> {
    ioctl_with_val(fd, NBD_SET_BLKSIZE, u64::from(block_size))?;
    Ok(())
}

pub(super) fn set_size(fd: BorrowedFd<'_>, size: u64) -> Result<()> {
    ioctl_with_val(fd, NBD_SET_SIZE, size)?;
    Ok(())
}

pub(super) fn set_flags(fd: BorrowedFd<'_>, flags: u64) -> Result<()> {
    ioctl_with_val(fd, NBD_SET_FLAGS, flags)?;
    Ok(())
}

/// Sets the I/O timeout in seconds.
pub(super) fn set_timeout(fd: BorrowedFd<'_>, timeout: u64) -> Result<()> {
    ioctl_with_val(fd, NBD_SET_TIMEOUT, timeout)?;
    Ok(())
}

pub(super) fn clear_sock(fd: BorrowedFd<'_>) -> Result<()> {
    ioctl_without_val(fd, NBD_CLEAR_SOCK)?;
    Ok(())
}

pub(super) fn disconnect(fd: BorrowedFd<'_>) -> Result<()> {
    ioctl_without_val(fd, NBD_DISCONNECT)?;
    Ok(())
}

/// Runs the device until it is disconnected.
pub(super) fn do_it(fd: BorrowedFd<'_>) -> Result<()> {
    ioctl_without_val(fd, NBD_DO_IT)?;
    Ok(())
}

/// Marks the block device as read-only or writable.
pub(super) fn set_read_only(fd: BorrowedFd<'_>, read_only: bool) -> Result<()> {
    let arg: c_int = read_only.into();
    // SAFETY: `BLKROSET` reads one `int` through the pointer, which refers to
    // `arg` and stays valid until the call returns.
    let ret = unsafe { libc::ioctl(fd.as_raw_fd(), BLKROSET, &arg as *const c_int) };
    NixErrno::result(ret)?;
    Ok(())
}
