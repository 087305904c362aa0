// SPDX-License-Identifier: MPL-2.0

//! The generic netlink controller family (`nlctrl`).
//!
//! Every other generic netlink family is looked up by name through this
//! family, which owns the fixed ID [`GENL_ID_CTRL`].

use alloc::{ffi::CString, vec};

use int_to_c_enum::TryFromInt;

use crate::{
    CGenlMsgHdr, Error, GenlSegment, MessageReader, MessageWriter, Result, SegHdrCommonFlags,
    attr::{Attribute, CAttrHeader, read_cstring, read_scalar, write_scalar},
};

/// The family ID of `nlctrl`.
pub const GENL_ID_CTRL: u16 = 0x10;

/// The protocol version spoken to `nlctrl`.
pub const CTRL_VERSION: u8 = 0x1;

/// Reference: <https://elixir.bootlin.com/linux/v6.13/source/include/uapi/linux/genetlink.h#L46>.
#[repr(u8)]
#[derive(Debug, Clone, Copy, TryFromInt, PartialEq, Eq)]
#[expect(non_camel_case_types)]
#[expect(clippy::upper_case_acronyms)]
pub enum CtrlCmd {
    UNSPEC = 0,
    NEWFAMILY = 1,
    DELFAMILY = 2,
    GETFAMILY = 3,
    NEWOPS = 4,
    DELOPS = 5,
    GETOPS = 6,
    NEWMCAST_GRP = 7,
    DELMCAST_GRP = 8,
    GETMCAST_GRP = 9,
    GETPOLICY = 10,
}

/// Reference: <https://elixir.bootlin.com/linux/v6.13/source/include/uapi/linux/genetlink.h#L64>.
#[repr(u16)]
#[derive(Debug, Clone, Copy, TryFromInt)]
#[expect(non_camel_case_types)]
#[expect(clippy::upper_case_acronyms)]
enum CtrlAttrClass {
    UNSPEC = 0,
    FAMILY_ID = 1,
    FAMILY_NAME = 2,
    VERSION = 3,
    HDRSIZE = 4,
    MAXATTR = 5,
    OPS = 6,
    MCAST_GROUPS = 7,
    POLICY = 8,
    OP_POLICY = 9,
    OP = 10,
}

/// The attributes of `nlctrl` that this crate understands.
///
/// Operation, multicast and policy lists are skipped while decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CtrlAttr {
    FamilyId(u16),
    FamilyName(CString),
    Version(u32),
    HdrSize(u32),
    MaxAttr(u32),
}

impl CtrlAttr {
    fn class(&self) -> CtrlAttrClass {
        match self {
            CtrlAttr::FamilyId(_) => CtrlAttrClass::FAMILY_ID,
            CtrlAttr::FamilyName(_) => CtrlAttrClass::FAMILY_NAME,
            CtrlAttr::Version(_) => CtrlAttrClass::VERSION,
            CtrlAttr::HdrSize(_) => CtrlAttrClass::HDRSIZE,
            CtrlAttr::MaxAttr(_) => CtrlAttrClass::MAXATTR,
        }
    }
}

impl Attribute for CtrlAttr {
    fn type_(&self) -> u16 {
        self.class() as u16
    }

    fn payload_len(&self) -> usize {
        match self {
            CtrlAttr::FamilyId(_) => size_of::<u16>(),
            CtrlAttr::FamilyName(name) => name.as_bytes_with_nul().len(),
            CtrlAttr::Version(_) | CtrlAttr::HdrSize(_) | CtrlAttr::MaxAttr(_) => {
                size_of::<u32>()
            }
        }
    }

    fn write_payload_to(&self, writer: &mut MessageWriter) -> Result<()> {
        match self {
            CtrlAttr::FamilyId(id) => write_scalar(id, writer),
            CtrlAttr::FamilyName(name) => writer.write_bytes(name.as_bytes_with_nul()),
            CtrlAttr::Version(val) | CtrlAttr::HdrSize(val) | CtrlAttr::MaxAttr(val) => {
                write_scalar(val, writer)
            }
        }
    }

    fn read_from(header: &CAttrHeader, reader: &mut MessageReader) -> Result<Option<Self>> {
        // Unknown attributes should be ignored.
        // Reference: <https://docs.kernel.org/userspace-api/netlink/intro.html#unknown-attributes>.
        let Ok(class) = CtrlAttrClass::try_from(header.type_()) else {
            return Ok(None);
        };

        let res = match class {
            CtrlAttrClass::FAMILY_ID => Self::FamilyId(read_scalar(header, reader)?),
            CtrlAttrClass::FAMILY_NAME => Self::FamilyName(read_cstring(reader)?),
            CtrlAttrClass::VERSION => Self::Version(read_scalar(header, reader)?),
            CtrlAttrClass::HDRSIZE => Self::HdrSize(read_scalar(header, reader)?),
            CtrlAttrClass::MAXATTR => Self::MaxAttr(read_scalar(header, reader)?),
            _ => return Ok(None),
        };

        Ok(Some(res))
    }
}

/// Builds the request that looks up the family called `name`.
pub fn get_family_request(name: &str) -> Result<GenlSegment<CtrlAttr>> {
    let name = CString::new(name).map_err(|_| Error::InvalidString)?;

    Ok(GenlSegment::new(
        GENL_ID_CTRL,
        SegHdrCommonFlags::REQUEST | SegHdrCommonFlags::ACK,
        CGenlMsgHdr::new(CtrlCmd::GETFAMILY as u8, CTRL_VERSION),
        vec![CtrlAttr::FamilyName(name)],
    ))
}

/// Extracts the family ID from the attributes of a `GETFAMILY` reply.
pub fn family_id_of(attrs: &[CtrlAttr]) -> Option<u16> {
    attrs.iter().find_map(|attr| match attr {
        CtrlAttr::FamilyId(id) => Some(*id),
        _ => None,
    })
}
