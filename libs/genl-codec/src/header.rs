// SPDX-License-Identifier: MPL-2.0

use bitflags::bitflags;
use int_to_c_enum::TryFromInt;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// `nlmsghdr` in Linux.
///
/// Reference: <https://elixir.bootlin.com/linux/v6.13/source/include/uapi/linux/netlink.h#L52>.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct CMsgSegHdr {
    /// Length of the segment, including the header.
    pub len: u32,
    /// Segment type, either a [`CSegmentType`] or a family ID.
    pub type_: u16,
    /// Flags, see [`SegHdrCommonFlags`].
    pub flags: u16,
    /// Sequence number.
    pub seq: u32,
    /// Sending port ID.
    pub pid: u32,
}

impl CMsgSegHdr {
    pub fn common_flags(&self) -> SegHdrCommonFlags {
        SegHdrCommonFlags::from_bits_truncate(self.flags)
    }
}

/// Segment types reserved by netlink itself.
///
/// Types from [`MIN_FAMILY_ID`] upwards belong to protocol families.
#[repr(u16)]
#[derive(Debug, Clone, Copy, TryFromInt, PartialEq, Eq)]
#[expect(clippy::upper_case_acronyms)]
pub enum CSegmentType {
    NOOP = 1,
    ERROR = 2,
    DONE = 3,
    OVERRUN = 4,
}

/// `NLMSG_MIN_TYPE` in Linux.
pub const MIN_FAMILY_ID: u16 = 0x10;

bitflags! {
    /// Flags shared by all segment types.
    ///
    /// Reference: <https://elixir.bootlin.com/linux/v6.13/source/include/uapi/linux/netlink.h#L62>.
    pub struct SegHdrCommonFlags: u16 {
        /// It is a request message.
        const REQUEST = 0x01;
        /// Multipart message, terminated by DONE.
        const MULTI = 0x02;
        /// Reply with an acknowledgment, with zero or an error code.
        const ACK = 0x04;
        /// Echo this request.
        const ECHO = 0x08;
        /// Dump was inconsistent due to sequence change.
        const DUMP_INTR = 0x10;
        /// Dump was filtered as requested.
        const DUMP_FILTERED = 0x20;
    }
}

/// `genlmsghdr` in Linux.
///
/// Reference: <https://elixir.bootlin.com/linux/v6.13/source/include/uapi/linux/genetlink.h#L13>.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct CGenlMsgHdr {
    pub cmd: u8,
    pub version: u8,
    pub reserved: u16,
}

impl CGenlMsgHdr {
    pub const fn new(cmd: u8, version: u8) -> Self {
        Self {
            cmd,
            version,
            reserved: 0,
        }
    }
}
