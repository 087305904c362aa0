// SPDX-License-Identifier: MPL-2.0

//! Netlink attributes.
//!
//! Netlink attributes carry the parameters of each segment.
//! Each netlink attribute consists of two components:
//! 1. Header: The attribute header is of type [`CAttrHeader`],
//!    which specifies the type and length of the attribute. The attribute
//!    type is interpreted by the family and command of the segment.
//! 2. Payload: The attribute's payload, which can vary in type.
//!    Currently, payload types include primitive types and C strings.
//!    The payload can also include one or multiple other attributes,
//!    known as nested attributes.
//!
//! Both the header and payload must be aligned to [`NLMSG_ALIGN`].
//!
//! The layout of a netlink attribute is depicted as follows:
//!
//! ┌────────┬─────────┬─────────┬─────────┐
//! │ Header │ Padding │ Payload │ Padding │
//! └────────┴─────────┴─────────┴─────────┘

use alloc::{borrow::ToOwned, ffi::CString, vec::Vec};
use core::{ffi::CStr, fmt::Debug};

use align_ext::AlignExt;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::{Error, MessageReader, MessageWriter, NLMSG_ALIGN, Result};

/// Netlink attribute header.
///
/// Reference: <https://elixir.bootlin.com/linux/v6.13/source/include/uapi/linux/netlink.h#L229>.
//
// The layout of the `type_` field is structured as follows:
// ┌────────┬───────────────┬──────────┐
// │ Nested │ Net Byteorder │ Payload  │
// └────────┴───────────────┴──────────┘
//   bit 15      bit 14       bits 13-0
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct CAttrHeader {
    len: u16,
    type_: u16,
}

impl CAttrHeader {
    pub const LEN: usize = size_of::<Self>();

    pub fn type_(&self) -> u16 {
        self.type_ & ATTRIBUTE_TYPE_MASK
    }

    pub fn is_nested(&self) -> bool {
        self.type_ & IS_NESTED_MASK != 0
    }

    /// Returns the total length (header + payload, excluding padding).
    pub fn total_len(&self) -> usize {
        self.len as usize
    }

    pub fn payload_len(&self) -> usize {
        self.total_len().saturating_sub(Self::LEN)
    }
}

const IS_NESTED_MASK: u16 = 1u16 << 15;
const IS_NET_BYTEORDER_MASK: u16 = 1u16 << 14;
const ATTRIBUTE_TYPE_MASK: u16 = !(IS_NESTED_MASK | IS_NET_BYTEORDER_MASK);

/// Netlink Attribute.
pub trait Attribute: Debug + Sized {
    /// Returns the type of the attribute.
    fn type_(&self) -> u16;

    /// Returns whether the payload is a list of attributes.
    fn is_nested(&self) -> bool {
        false
    }

    /// Returns the payload length (excluding padding).
    fn payload_len(&self) -> usize;

    /// Writes the payload (excluding padding) to the `writer`.
    fn write_payload_to(&self, writer: &mut MessageWriter) -> Result<()>;

    /// Returns the total length of the attribute (header + payload, excluding padding).
    fn total_len(&self) -> usize {
        CAttrHeader::LEN + self.payload_len()
    }

    /// Returns the total length of the attribute (header + payload, including padding).
    fn total_len_with_padding(&self) -> usize {
        self.total_len().align_up(NLMSG_ALIGN)
    }

    /// Returns the length of the padding bytes.
    fn padding_len(&self) -> usize {
        self.total_len_with_padding() - self.total_len()
    }

    /// Reads the attribute payload described by `header` from the `reader`.
    ///
    /// The `reader` covers exactly the payload. Attributes of unknown types
    /// are ignored by returning `None`.
    fn read_from(header: &CAttrHeader, reader: &mut MessageReader) -> Result<Option<Self>>;

    /// Reads all attributes from the reader.
    ///
    /// The cumulative length of the read attributes must not exceed `total_len`.
    fn read_all_from(reader: &mut MessageReader, mut total_len: usize) -> Result<Vec<Self>> {
        let mut res = Vec::new();

        while total_len > 0 {
            if total_len < CAttrHeader::LEN {
                return Err(Error::InvalidLength);
            }
            let header = reader.read_val::<CAttrHeader>()?;
            let attr_len = header.total_len();
            if attr_len < CAttrHeader::LEN || attr_len > total_len {
                return Err(Error::InvalidLength);
            }

            let mut payload = reader.split_reader(header.payload_len())?;
            if let Some(attr) = Self::read_from(&header, &mut payload)? {
                res.push(attr);
            }
            total_len -= attr_len;

            let padding_len = (attr_len.align_up(NLMSG_ALIGN) - attr_len).min(total_len);
            reader.skip_some(padding_len);
            total_len -= padding_len;
        }

        Ok(res)
    }

    /// Writes the attribute to the `writer`.
    fn write_to(&self, writer: &mut MessageWriter) -> Result<()> {
        let len = u16::try_from(self.total_len()).map_err(|_| Error::AttributeTooLong)?;
        let mut type_ = self.type_() & ATTRIBUTE_TYPE_MASK;
        if self.is_nested() {
            type_ |= IS_NESTED_MASK;
        }

        writer.write_val(&CAttrHeader { len, type_ })?;
        self.write_payload_to(writer)?;
        writer.skip(self.padding_len())?;

        Ok(())
    }
}

/// Returns the payload length of a nested attribute holding `attrs`.
pub fn nested_len<A: Attribute>(attrs: &[A]) -> usize {
    attrs.iter().map(Attribute::total_len_with_padding).sum()
}

/// Writes `attrs` as the payload of a nested attribute.
pub fn write_nested<A: Attribute>(attrs: &[A], writer: &mut MessageWriter) -> Result<()> {
    for attr in attrs {
        attr.write_to(writer)?;
    }
    Ok(())
}

/// Reads the payload of a nested attribute.
pub fn read_nested<A: Attribute>(reader: &mut MessageReader) -> Result<Vec<A>> {
    let len = reader.remain();
    A::read_all_from(reader, len)
}

/// Reads a fixed-size payload, rejecting payloads of any other size.
pub fn read_scalar<T: FromBytes>(header: &CAttrHeader, reader: &mut MessageReader) -> Result<T> {
    if header.payload_len() != size_of::<T>() {
        return Err(Error::InvalidAttribute(header.type_()));
    }
    reader.read_val::<T>()
}

/// Writes a fixed-size payload.
pub fn write_scalar<T: IntoBytes + Immutable>(val: &T, writer: &mut MessageWriter) -> Result<()> {
    writer.write_val(val)
}

/// Reads a NUL-terminated string payload.
pub fn read_cstring(reader: &mut MessageReader) -> Result<CString> {
    let bytes = reader.read_bytes(reader.remain())?;
    let cstr = CStr::from_bytes_until_nul(bytes).map_err(|_| Error::InvalidString)?;
    Ok(cstr.to_owned())
}
