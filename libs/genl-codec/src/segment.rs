// SPDX-License-Identifier: MPL-2.0

use alloc::vec::Vec;

use align_ext::AlignExt;

use crate::{
    CGenlMsgHdr, CMsgSegHdr, CSegmentType, Error, MIN_FAMILY_ID, MessageReader, MessageWriter,
    NLMSG_ALIGN, Result, SegHdrCommonFlags, attr::Attribute,
};

/// A segment addressed to a generic netlink family.
#[derive(Debug)]
pub struct GenlSegment<Attr> {
    header: CMsgSegHdr,
    body: CGenlMsgHdr,
    attrs: Vec<Attr>,
}

impl<Attr> GenlSegment<Attr> {
    pub const HEADER_LEN: usize = size_of::<CMsgSegHdr>();
    pub const BODY_LEN: usize = size_of::<CGenlMsgHdr>();

    pub fn header(&self) -> &CMsgSegHdr {
        &self.header
    }

    pub fn header_mut(&mut self) -> &mut CMsgSegHdr {
        &mut self.header
    }

    pub fn body(&self) -> &CGenlMsgHdr {
        &self.body
    }

    pub fn attrs(&self) -> &[Attr] {
        &self.attrs
    }
}

impl<Attr: Attribute> GenlSegment<Attr> {
    /// Creates a segment for the family `family_id`.
    ///
    /// The length in the header is computed from the attributes.
    pub fn new(
        family_id: u16,
        flags: SegHdrCommonFlags,
        body: CGenlMsgHdr,
        attrs: Vec<Attr>,
    ) -> Self {
        let mut res = Self {
            header: CMsgSegHdr {
                len: 0,
                type_: family_id,
                flags: flags.bits(),
                seq: 0,
                pid: 0,
            },
            body,
            attrs,
        };
        res.header.len = res.total_len() as u32;
        res
    }

    pub fn total_len(&self) -> usize {
        Self::HEADER_LEN + Self::BODY_LEN + self.attrs_len()
    }

    pub fn attrs_len(&self) -> usize {
        self.attrs
            .iter()
            .map(|attr| attr.total_len_with_padding())
            .sum()
    }

    pub fn write_to(&self, writer: &mut MessageWriter) -> Result<()> {
        writer.write_val(&self.header)?;
        writer.write_val(&self.body)?;
        for attr in self.attrs.iter() {
            attr.write_to(writer)?;
        }

        Ok(())
    }

    /// Encodes the segment as a standalone message.
    ///
    /// Nothing is returned unless every attribute has been encoded.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut writer = MessageWriter::new();
        self.write_to(&mut writer)?;
        Ok(writer.into_bytes())
    }
}

/// `nlmsgerr` in Linux, which also serves as the acknowledgment.
///
/// Reference: <https://elixir.bootlin.com/linux/v6.13/source/include/uapi/linux/netlink.h#L119>.
#[derive(Debug, Clone, Copy)]
pub struct ErrorSegment {
    header: CMsgSegHdr,
    /// Zero for an acknowledgment, otherwise a negated errno.
    error: i32,
    request_header: CMsgSegHdr,
}

impl ErrorSegment {
    const BODY_LEN: usize = size_of::<i32>() + size_of::<CMsgSegHdr>();

    /// Creates the reply to the request with `request_header`.
    pub fn new_from_request(request_header: &CMsgSegHdr, error: i32) -> Self {
        let header = CMsgSegHdr {
            len: (size_of::<CMsgSegHdr>() + Self::BODY_LEN) as u32,
            type_: CSegmentType::ERROR as u16,
            flags: 0,
            seq: request_header.seq,
            pid: request_header.pid,
        };
        Self {
            header,
            error,
            request_header: *request_header,
        }
    }

    pub fn header(&self) -> &CMsgSegHdr {
        &self.header
    }

    pub fn error(&self) -> i32 {
        self.error
    }

    pub fn is_ack(&self) -> bool {
        self.error == 0
    }

    pub fn request_header(&self) -> &CMsgSegHdr {
        &self.request_header
    }

    fn read_from(header: CMsgSegHdr, reader: &mut MessageReader) -> Result<Self> {
        let error = reader.read_val::<i32>()?;
        let request_header = reader.read_val::<CMsgSegHdr>()?;
        Ok(Self {
            header,
            error,
            request_header,
        })
    }

    pub fn write_to(&self, writer: &mut MessageWriter) -> Result<()> {
        writer.write_val(&self.header)?;
        writer.write_val(&self.error)?;
        writer.write_val(&self.request_header)?;
        Ok(())
    }
}

/// A segment sent by a generic netlink family.
#[derive(Debug, Clone)]
pub struct GenlReply {
    header: CMsgSegHdr,
    body: CGenlMsgHdr,
    attr_bytes: Vec<u8>,
}

impl GenlReply {
    pub fn header(&self) -> &CMsgSegHdr {
        &self.header
    }

    pub fn body(&self) -> &CGenlMsgHdr {
        &self.body
    }

    /// Decodes the attributes of the reply.
    pub fn attrs<Attr: Attribute>(&self) -> Result<Vec<Attr>> {
        let mut reader = MessageReader::new(&self.attr_bytes);
        Attr::read_all_from(&mut reader, self.attr_bytes.len())
    }
}

/// A segment of a received message.
#[derive(Debug, Clone)]
pub enum ReplySegment {
    Genl(GenlReply),
    Error(ErrorSegment),
    Done(CMsgSegHdr),
    /// `NOOP`, `OVERRUN` and unknown control segments.
    Other(CMsgSegHdr),
}

impl ReplySegment {
    pub fn header(&self) -> &CMsgSegHdr {
        match self {
            ReplySegment::Genl(reply) => reply.header(),
            ReplySegment::Error(error) => error.header(),
            ReplySegment::Done(header) | ReplySegment::Other(header) => header,
        }
    }
}

/// Splits a received datagram into segments.
pub fn parse_reply(bytes: &[u8]) -> Result<Vec<ReplySegment>> {
    let mut reader = MessageReader::new(bytes);
    let mut segments = Vec::new();

    while reader.remain() > 0 {
        let header = reader.read_val::<CMsgSegHdr>()?;
        let seg_len = header.len as usize;
        let header_len = size_of::<CMsgSegHdr>();
        if seg_len < header_len || seg_len - header_len > reader.remain() {
            return Err(Error::InvalidLength);
        }
        let mut payload = reader.split_reader(seg_len - header_len)?;

        let segment = if header.type_ >= MIN_FAMILY_ID {
            let body = payload.read_val::<CGenlMsgHdr>()?;
            let attr_bytes = payload.read_bytes(payload.remain())?.to_vec();
            ReplySegment::Genl(GenlReply {
                header,
                body,
                attr_bytes,
            })
        } else {
            match CSegmentType::try_from(header.type_) {
                Ok(CSegmentType::ERROR) => {
                    ReplySegment::Error(ErrorSegment::read_from(header, &mut payload)?)
                }
                Ok(CSegmentType::DONE) => ReplySegment::Done(header),
                _ => ReplySegment::Other(header),
            }
        };
        segments.push(segment);

        reader.skip_some(seg_len.align_up(NLMSG_ALIGN) - seg_len);
    }

    Ok(segments)
}

#[cfg(test)]
mod test {
    use alloc::vec;

    use super::*;
    use crate::ctrl::{CtrlAttr, GENL_ID_CTRL};

    #[test]
    fn segment_length_covers_attributes() {
        let segment = GenlSegment::new(
            GENL_ID_CTRL,
            SegHdrCommonFlags::REQUEST | SegHdrCommonFlags::ACK,
            CGenlMsgHdr::new(3, 1),
            vec![CtrlAttr::FamilyId(0x1a)],
        );
        let bytes = segment.to_bytes().unwrap();

        // 16 header + 4 genl header + 8 attribute.
        assert_eq!(bytes.len(), 28);
        assert_eq!(segment.header().len, 28);
        assert_eq!(&bytes[4..6], &GENL_ID_CTRL.to_ne_bytes());
        assert_eq!(
            segment.header().common_flags(),
            SegHdrCommonFlags::REQUEST | SegHdrCommonFlags::ACK
        );
    }

    #[test]
    fn parse_reply_then_ack() {
        let mut request = GenlSegment::new(
            0x20,
            SegHdrCommonFlags::REQUEST,
            CGenlMsgHdr::new(1, 1),
            Vec::<CtrlAttr>::new(),
        );
        request.header_mut().seq = 7;

        let mut reply = GenlSegment::new(
            0x20,
            SegHdrCommonFlags::empty(),
            CGenlMsgHdr::new(1, 1),
            vec![CtrlAttr::Version(2)],
        );
        reply.header_mut().seq = 7;

        let mut writer = MessageWriter::new();
        reply.write_to(&mut writer).unwrap();
        ErrorSegment::new_from_request(request.header(), 0)
            .write_to(&mut writer)
            .unwrap();

        let segments = parse_reply(writer.as_bytes()).unwrap();
        assert_eq!(segments.len(), 2);

        let ReplySegment::Genl(genl) = &segments[0] else {
            panic!("the first segment should be a generic netlink reply");
        };
        assert_eq!(genl.header().seq, 7);
        assert_eq!(genl.attrs::<CtrlAttr>().unwrap(), vec![CtrlAttr::Version(2)]);

        let ReplySegment::Error(ack) = &segments[1] else {
            panic!("the second segment should be an acknowledgment");
        };
        assert!(ack.is_ack());
        assert_eq!(ack.header().seq, 7);
        assert_eq!(ack.request_header().type_, 0x20);
    }

    #[test]
    fn error_segment_carries_errno() {
        let request = CMsgSegHdr {
            len: 20,
            type_: 0x10,
            flags: 0,
            seq: 3,
            pid: 0,
        };
        let mut writer = MessageWriter::new();
        ErrorSegment::new_from_request(&request, -2)
            .write_to(&mut writer)
            .unwrap();

        let segments = parse_reply(writer.as_bytes()).unwrap();
        let ReplySegment::Error(error) = &segments[0] else {
            panic!("expected an error segment");
        };
        assert!(!error.is_ack());
        assert_eq!(error.error(), -2);
    }

    #[test]
    fn truncated_segment_is_rejected() {
        let header = CMsgSegHdr {
            len: 64,
            type_: CSegmentType::DONE as u16,
            flags: 0,
            seq: 0,
            pid: 0,
        };
        let mut writer = MessageWriter::new();
        writer.write_val(&header).unwrap();
        writer.skip(4).unwrap();

        assert_eq!(parse_reply(writer.as_bytes()).unwrap_err(), Error::InvalidLength);
    }
}
