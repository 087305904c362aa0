// SPDX-License-Identifier: MPL-2.0

//! The vocabulary of the `nbd` generic netlink family.

use genl_codec::{
    MessageReader, MessageWriter,
    attr::{
        Attribute, CAttrHeader, nested_len, read_nested, read_scalar, write_nested, write_scalar,
    },
};

use crate::{device::ServerFlags, prelude::*};

/// The name that the `nbd` family registers under.
pub const NBD_GENL_FAMILY_NAME: &str = "nbd";

/// The protocol version of the `nbd` family.
pub const NBD_GENL_VERSION: u8 = 0x1;

/// Reference: <https://elixir.bootlin.com/linux/v6.13/source/include/uapi/linux/nbd-netlink.h#L73>.
#[repr(u8)]
#[derive(Debug, Clone, Copy, TryFromInt, PartialEq, Eq)]
#[expect(non_camel_case_types)]
#[expect(clippy::upper_case_acronyms)]
pub enum NbdCmd {
    UNSPEC = 0,
    CONNECT = 1,
    DISCONNECT = 2,
    RECONFIGURE = 3,
    LINK_DEAD = 4,
    STATUS = 5,
}

/// Reference: <https://elixir.bootlin.com/linux/v6.13/source/include/uapi/linux/nbd-netlink.h#L24>.
#[repr(u16)]
#[derive(Debug, Clone, Copy, TryFromInt)]
#[expect(non_camel_case_types)]
#[expect(clippy::upper_case_acronyms)]
enum NbdAttrClass {
    UNSPEC = 0,
    INDEX = 1,
    SIZE_BYTES = 2,
    BLOCK_SIZE_BYTES = 3,
    TIMEOUT = 4,
    SERVER_FLAGS = 5,
    CLIENT_FLAGS = 6,
    SOCKETS = 7,
    DEAD_CONN_TIMEOUT = 8,
    DEVICE_LIST = 9,
}

/// The top-level attributes of `nbd` segments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NbdAttr {
    Index(u32),
    SizeBytes(u64),
    BlockSizeBytes(u64),
    Timeout(u64),
    ServerFlags(u64),
    ClientFlags(u64),
    Sockets(Vec<NbdSockItemAttr>),
    DeadConnTimeout(u64),
}

impl NbdAttr {
    fn class(&self) -> NbdAttrClass {
        match self {
            NbdAttr::Index(_) => NbdAttrClass::INDEX,
            NbdAttr::SizeBytes(_) => NbdAttrClass::SIZE_BYTES,
            NbdAttr::BlockSizeBytes(_) => NbdAttrClass::BLOCK_SIZE_BYTES,
            NbdAttr::Timeout(_) => NbdAttrClass::TIMEOUT,
            NbdAttr::ServerFlags(_) => NbdAttrClass::SERVER_FLAGS,
            NbdAttr::ClientFlags(_) => NbdAttrClass::CLIENT_FLAGS,
            NbdAttr::Sockets(_) => NbdAttrClass::SOCKETS,
            NbdAttr::DeadConnTimeout(_) => NbdAttrClass::DEAD_CONN_TIMEOUT,
        }
    }
}

impl Attribute for NbdAttr {
    fn type_(&self) -> u16 {
        self.class() as u16
    }

    fn is_nested(&self) -> bool {
        matches!(self, NbdAttr::Sockets(_))
    }

    fn payload_len(&self) -> usize {
        match self {
            NbdAttr::Index(_) => size_of::<u32>(),
            NbdAttr::Sockets(items) => nested_len(items),
            NbdAttr::SizeBytes(_)
            | NbdAttr::BlockSizeBytes(_)
            | NbdAttr::Timeout(_)
            | NbdAttr::ServerFlags(_)
            | NbdAttr::ClientFlags(_)
            | NbdAttr::DeadConnTimeout(_) => size_of::<u64>(),
        }
    }

    fn write_payload_to(&self, writer: &mut MessageWriter) -> genl_codec::Result<()> {
        match self {
            NbdAttr::Index(index) => write_scalar(index, writer),
            NbdAttr::Sockets(items) => write_nested(items, writer),
            NbdAttr::SizeBytes(val)
            | NbdAttr::BlockSizeBytes(val)
            | NbdAttr::Timeout(val)
            | NbdAttr::ServerFlags(val)
            | NbdAttr::ClientFlags(val)
            | NbdAttr::DeadConnTimeout(val) => write_scalar(val, writer),
        }
    }

    fn read_from(
        header: &CAttrHeader,
        reader: &mut MessageReader,
    ) -> genl_codec::Result<Option<Self>> {
        let Ok(class) = NbdAttrClass::try_from(header.type_()) else {
            return Ok(None);
        };

        let res = match class {
            NbdAttrClass::INDEX => Self::Index(read_scalar(header, reader)?),
            NbdAttrClass::SIZE_BYTES => Self::SizeBytes(read_scalar(header, reader)?),
            NbdAttrClass::BLOCK_SIZE_BYTES => Self::BlockSizeBytes(read_scalar(header, reader)?),
            NbdAttrClass::TIMEOUT => Self::Timeout(read_scalar(header, reader)?),
            NbdAttrClass::SERVER_FLAGS => Self::ServerFlags(read_scalar(header, reader)?),
            NbdAttrClass::CLIENT_FLAGS => Self::ClientFlags(read_scalar(header, reader)?),
            NbdAttrClass::SOCKETS => Self::Sockets(read_nested(reader)?),
            NbdAttrClass::DEAD_CONN_TIMEOUT => Self::DeadConnTimeout(read_scalar(header, reader)?),
            NbdAttrClass::UNSPEC | NbdAttrClass::DEVICE_LIST => return Ok(None),
        };

        Ok(Some(res))
    }
}

/// The entries of [`NbdAttr::Sockets`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NbdSockItemAttr {
    Item(Vec<NbdSockAttr>),
}

const NBD_SOCK_ITEM: u16 = 1;

impl Attribute for NbdSockItemAttr {
    fn type_(&self) -> u16 {
        NBD_SOCK_ITEM
    }

    fn is_nested(&self) -> bool {
        true
    }

    fn payload_len(&self) -> usize {
        let NbdSockItemAttr::Item(attrs) = self;
        nested_len(attrs)
    }

    fn write_payload_to(&self, writer: &mut MessageWriter) -> genl_codec::Result<()> {
        let NbdSockItemAttr::Item(attrs) = self;
        write_nested(attrs, writer)
    }

    fn read_from(
        header: &CAttrHeader,
        reader: &mut MessageReader,
    ) -> genl_codec::Result<Option<Self>> {
        if header.type_() != NBD_SOCK_ITEM {
            return Ok(None);
        }
        Ok(Some(Self::Item(read_nested(reader)?)))
    }
}

/// The attributes of one socket entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NbdSockAttr {
    Fd(u32),
}

const NBD_SOCK_FD: u16 = 1;

impl Attribute for NbdSockAttr {
    fn type_(&self) -> u16 {
        NBD_SOCK_FD
    }

    fn payload_len(&self) -> usize {
        size_of::<u32>()
    }

    fn write_payload_to(&self, writer: &mut MessageWriter) -> genl_codec::Result<()> {
        let NbdSockAttr::Fd(fd) = self;
        write_scalar(fd, writer)
    }

    fn read_from(
        header: &CAttrHeader,
        reader: &mut MessageReader,
    ) -> genl_codec::Result<Option<Self>> {
        if header.type_() != NBD_SOCK_FD {
            return Ok(None);
        }
        Ok(Some(Self::Fd(read_scalar(header, reader)?)))
    }
}

/// The parameters of a `CONNECT` request.
#[derive(Debug)]
pub(super) struct ConnectParams {
    pub(super) index: Option<u32>,
    pub(super) timeout: Option<u64>,
    pub(super) size: u64,
    pub(super) block_size: u32,
    pub(super) flags: ServerFlags,
    pub(super) sock: RawFd,
}

impl ConnectParams {
    pub(super) fn into_attrs(self) -> Vec<NbdAttr> {
        let mut attrs = Vec::with_capacity(6);
        if let Some(index) = self.index {
            attrs.push(NbdAttr::Index(index));
        }
        if let Some(timeout) = self.timeout {
            attrs.push(NbdAttr::Timeout(timeout));
        }
        attrs.push(NbdAttr::SizeBytes(self.size));
        attrs.push(NbdAttr::BlockSizeBytes(u64::from(self.block_size)));
        attrs.push(NbdAttr::ServerFlags(self.flags.bits()));
        attrs.push(NbdAttr::Sockets(vec![NbdSockItemAttr::Item(vec![
            NbdSockAttr::Fd(self.sock as u32),
        ])]));
        attrs
    }
}

pub(super) fn disconnect_attrs(index: u32) -> Vec<NbdAttr> {
    vec![NbdAttr::Index(index)]
}

pub(super) fn reconfigure_attrs(index: u32, size: u64) -> Vec<NbdAttr> {
    vec![NbdAttr::Index(index), NbdAttr::SizeBytes(size)]
}

/// Extracts the device index from the attributes of a reply.
pub(super) fn index_of(attrs: &[NbdAttr]) -> Option<u32> {
    attrs.iter().find_map(|attr| match attr {
        NbdAttr::Index(index) => Some(*index),
        _ => None,
    })
}

#[cfg(test)]
mod test {
    use super::*;

    fn encode(attrs: &[NbdAttr]) -> Vec<u8> {
        let mut writer = MessageWriter::new();
        write_nested(attrs, &mut writer).unwrap();
        writer.into_bytes()
    }

    fn decode(bytes: &[u8]) -> Vec<NbdAttr> {
        let mut reader = MessageReader::new(bytes);
        NbdAttr::read_all_from(&mut reader, bytes.len()).unwrap()
    }

    #[test]
    fn connect_attrs_in_kernel_order() {
        let params = ConnectParams {
            index: Some(3),
            timeout: Some(30),
            size: 1 << 30,
            block_size: 4096,
            flags: ServerFlags::HAS_FLAGS | ServerFlags::READ_ONLY,
            sock: 7,
        };
        let attrs = params.into_attrs();
        assert_eq!(
            attrs,
            vec![
                NbdAttr::Index(3),
                NbdAttr::Timeout(30),
                NbdAttr::SizeBytes(1 << 30),
                NbdAttr::BlockSizeBytes(4096),
                NbdAttr::ServerFlags(0x3),
                NbdAttr::Sockets(vec![NbdSockItemAttr::Item(vec![NbdSockAttr::Fd(7)])]),
            ]
        );
        assert_eq!(decode(&encode(&attrs)), attrs);
    }

    #[test]
    fn optional_connect_attrs_are_omitted() {
        let params = ConnectParams {
            index: None,
            timeout: None,
            size: 4096,
            block_size: 512,
            flags: ServerFlags::empty(),
            sock: 4,
        };
        let attrs = params.into_attrs();
        assert_eq!(index_of(&attrs), None);
        assert!(!attrs.iter().any(|attr| matches!(attr, NbdAttr::Timeout(_))));
    }

    #[test]
    fn sockets_layout() {
        let bytes = encode(&[NbdAttr::Sockets(vec![NbdSockItemAttr::Item(vec![
            NbdSockAttr::Fd(5),
        ])])]);
        #[rustfmt::skip]
        let expected = [
            // SOCKETS, nested.
            16, 0, 7, 0x80,
            // ITEM, nested.
            12, 0, 1, 0x80,
            // FD.
            8, 0, 1, 0, 5, 0, 0, 0,
        ];
        assert_eq!(bytes, expected);
    }

    #[test]
    fn reply_with_unknown_attributes() {
        let mut bytes = encode(&[NbdAttr::Index(9)]);
        // NBD_ATTR_DEVICE_LIST and an attribute newer than this table.
        bytes.extend_from_slice(&[4, 0, 9, 0x80, 8, 0, 42, 0, 1, 2, 3, 4]);
        let attrs = decode(&bytes);
        assert_eq!(attrs, vec![NbdAttr::Index(9)]);
        assert_eq!(index_of(&attrs), Some(9));
    }

    #[test]
    fn short_index_is_rejected() {
        let bytes = [6, 0, 1, 0, 9, 0, 0, 0];
        let mut reader = MessageReader::new(&bytes);
        let error = NbdAttr::read_all_from(&mut reader, bytes.len()).unwrap_err();
        assert_eq!(error, genl_codec::Error::InvalidAttribute(1));
    }

    #[test]
    fn small_commands() {
        assert_eq!(disconnect_attrs(2), vec![NbdAttr::Index(2)]);
        assert_eq!(
            reconfigure_attrs(2, 8192),
            vec![NbdAttr::Index(2), NbdAttr::SizeBytes(8192)]
        );
    }
}
