// SPDX-License-Identifier: MPL-2.0

//! Datagram channels to the generic netlink bus.

use std::os::fd::OwnedFd;

use nix::{
    errno::Errno as NixErrno,
    sys::{
        socket::{
            AddressFamily, MsgFlags, SockFlag, SockProtocol, SockType, recv, send, setsockopt,
            socket, sockopt,
        },
        time::{TimeVal, TimeValLike},
    },
};

use crate::prelude::*;

/// How long a request may wait for the kernel to answer.
const RECV_TIMEOUT_SECS: i64 = 5;

/// A bidirectional datagram channel carrying netlink messages.
pub trait GenlChannel: Debug {
    /// Sends one message.
    fn send(&mut self, bytes: &[u8]) -> Result<()>;

    /// Receives one datagram into `buf` and returns its length.
    fn recv(&mut self, buf: &mut [u8]) -> Result<usize>;
}

/// Opens [`GenlChannel`]s.
pub trait GenlConnector: Debug + Send + Sync {
    fn connect(&self) -> Result<Box<dyn GenlChannel>>;
}

/// A `NETLINK_GENERIC` socket.
#[derive(Debug)]
pub struct NetlinkSocket {
    fd: OwnedFd,
}

impl NetlinkSocket {
    /// Opens a generic netlink socket bound to a kernel-assigned port.
    pub fn open() -> Result<Self> {
        let fd = socket(
            AddressFamily::Netlink,
            SockType::Raw,
            SockFlag::SOCK_CLOEXEC,
            SockProtocol::NetlinkGeneric,
        )
        .inspect_err(|err| {
            warn!("failed to create netlink socket: {}", err);
        })?;

        setsockopt(
            &fd,
            sockopt::ReceiveTimeout,
            &TimeVal::seconds(RECV_TIMEOUT_SECS),
        )
        .inspect_err(|err| {
            warn!("failed to set netlink receive timeout: {}", err);
        })?;

        Ok(Self { fd })
    }
}

impl GenlChannel for NetlinkSocket {
    fn send(&mut self, bytes: &[u8]) -> Result<()> {
        let sent = send(self.fd.as_raw_fd(), bytes, MsgFlags::empty())?;
        if sent != bytes.len() {
            return_errno!(Errno::EMSGSIZE);
        }
        Ok(())
    }

    fn recv(&mut self, buf: &mut [u8]) -> Result<usize> {
        loop {
            match recv(self.fd.as_raw_fd(), buf, MsgFlags::empty()) {
                Err(NixErrno::EINTR) => continue,
                res => return Ok(res?),
            }
        }
    }
}

/// Connects to the generic netlink bus of the running kernel.
#[derive(Debug, Clone, Copy, Default)]
pub struct KernelConnector;

impl GenlConnector for KernelConnector {
    fn connect(&self) -> Result<Box<dyn GenlChannel>> {
        Ok(Box::new(NetlinkSocket::open()?))
    }
}

#[cfg(test)]
mod test {
    use nix::sys::socket::getsockopt;

    use super::*;

    #[test]
    fn socket_waits_a_bounded_time() {
        // Sandboxes may forbid netlink sockets entirely.
        let Ok(socket) = NetlinkSocket::open() else {
            return;
        };
        let timeout = getsockopt(&socket.fd, sockopt::ReceiveTimeout).unwrap();
        assert_eq!(timeout.tv_sec(), RECV_TIMEOUT_SECS);
        assert_eq!(timeout.tv_usec(), 0);
    }
}
