// SPDX-License-Identifier: MPL-2.0

//! An [`NbdIoctl`] that records requests instead of issuing them.

use std::{
    mem::{Discriminant, discriminant},
    sync::Mutex,
};

use super::NbdIoctl;
use crate::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum IoctlCall {
    SetSock,
    SetBlksize(u32),
    SetSize(u64),
    SetFlags(u64),
    SetTimeout(u64),
    SetReadOnly(bool),
    ClearSock,
    Disconnect,
    DoIt,
}

#[derive(Debug, Default)]
struct RecorderState {
    calls: Vec<IoctlCall>,
    busy_devices: usize,
    failing: Option<(Discriminant<IoctlCall>, Errno)>,
}

#[derive(Debug, Default)]
pub(crate) struct RecordingIoctl {
    state: Mutex<RecorderState>,
}

impl RecordingIoctl {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Makes the next `count` devices refuse the socket with `EBUSY`.
    pub(crate) fn busy_devices(&self, count: usize) {
        self.state.lock().unwrap().busy_devices = count;
    }

    /// Makes every request of the same kind as `call` fail with `errno`.
    pub(crate) fn fail_on(&self, call: IoctlCall, errno: Errno) {
        self.state.lock().unwrap().failing = Some((discriminant(&call), errno));
    }

    pub(crate) fn calls(&self) -> Vec<IoctlCall> {
        self.state.lock().unwrap().calls.clone()
    }

    fn record(&self, call: IoctlCall) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call);

        if call == IoctlCall::SetSock && state.busy_devices > 0 {
            state.busy_devices -= 1;
            return_errno!(Errno::EBUSY);
        }
        match state.failing {
            Some((kind, errno)) if kind == discriminant(&call) => Err(Error::new(errno)),
            _ => Ok(()),
        }
    }
}

impl NbdIoctl for RecordingIoctl {
    fn set_sock(&self, _fd: BorrowedFd<'_>, _sock: BorrowedFd<'_>) -> Result<()> {
        self.record(IoctlCall::SetSock)
    }

    fn set_blksize(&self, _fd: BorrowedFd<'_>, block_size: u32) -> Result<()> {
        self.record(IoctlCall::SetBlksize(block_size))
    }

    fn set_size(&self, _fd: BorrowedFd<'_>, size: u64) -> Result<()> {
        self.record(IoctlCall::SetSize(size))
    }

    fn set_flags(&self, _fd: BorrowedFd<'_>, flags: u64) -> Result<()> {
        self.record(IoctlCall::SetFlags(flags))
    }

    fn set_timeout(&self, _fd: BorrowedFd<'_>, timeout: u64) -> Result<()> {
        self.record(IoctlCall::SetTimeout(timeout))
    }

    fn set_read_only(&self, _fd: BorrowedFd<'_>, read_only: bool) -> Result<()> {
        self.record(IoctlCall::SetReadOnly(read_only))
    }

    fn clear_sock(&self, _fd: BorrowedFd<'_>) -> Result<()> {
        self.record(IoctlCall::ClearSock)
    }

    fn disconnect(&self, _fd: BorrowedFd<'_>) -> Result<()> {
        self.record(IoctlCall::Disconnect)
    }

    fn do_it(&self, _fd: BorrowedFd<'_>) -> Result<()> {
        self.record(IoctlCall::DoIt)
    }
}
