// SPDX-License-Identifier: MPL-2.0

use genl_codec::{
    CGenlMsgHdr, GenlReply, GenlSegment, MAX_MESSAGE_LEN, ReplySegment, SegHdrCommonFlags,
    attr::Attribute,
    ctrl::{self, CtrlAttr},
    parse_reply,
};

use super::{
    channel::{GenlChannel, GenlConnector},
    message::{NBD_GENL_FAMILY_NAME, NBD_GENL_VERSION, NbdAttr, NbdCmd},
};
use crate::prelude::*;

/// A conversation with the `nbd` family.
///
/// A session lives for one public operation. The channel is closed when
/// the session is dropped.
#[derive(Debug)]
pub(super) struct GenlSession {
    channel: Box<dyn GenlChannel>,
    family_id: u16,
    seq: u32,
}

impl GenlSession {
    /// Connects to the bus and resolves the `nbd` family.
    ///
    /// Every failure is reported as `EPROTONOSUPPORT`, which tells the
    /// caller to fall back to the ioctl interface.
    pub(super) fn open(connector: &dyn GenlConnector) -> Result<Self> {
        let channel = connector.connect().map_err(|err| {
            warn!("could not connect netlink socket: {}", err);
            Self::unsupported()
        })?;

        let mut session = Self {
            channel,
            family_id: 0,
            seq: 0,
        };
        session.family_id = session.resolve_family().map_err(|err| {
            warn!(
                "could not resolve netlink family {}: {}",
                NBD_GENL_FAMILY_NAME, err
            );
            Self::unsupported()
        })?;
        debug!(
            "resolved netlink family {} to {}",
            NBD_GENL_FAMILY_NAME, session.family_id
        );

        Ok(session)
    }

    fn unsupported() -> Error {
        Error::with_message(Errno::EPROTONOSUPPORT, "netlink interface not supported")
    }

    fn resolve_family(&mut self) -> Result<u16> {
        let request = ctrl::get_family_request(NBD_GENL_FAMILY_NAME)?;
        let Some(reply) = self.exchange(request)? else {
            return_errno_with_message!(Errno::ENODATA, "no reply to the family lookup");
        };
        let attrs = reply.attrs::<CtrlAttr>()?;
        match ctrl::family_id_of(&attrs) {
            Some(family_id) => Ok(family_id),
            None => return_errno_with_message!(Errno::ENODATA, "missing family id"),
        }
    }

    /// Sends an `nbd` command and waits until the kernel acknowledges it.
    ///
    /// Returns the reply that the command produced, if any.
    pub(super) fn transact(
        &mut self,
        cmd: NbdCmd,
        attrs: Vec<NbdAttr>,
    ) -> Result<Option<GenlReply>> {
        let request = GenlSegment::new(
            self.family_id,
            SegHdrCommonFlags::REQUEST | SegHdrCommonFlags::ACK,
            CGenlMsgHdr::new(cmd as u8, NBD_GENL_VERSION),
            attrs,
        );
        self.exchange(request).inspect_err(|err| {
            warn!("netlink {:?} failed: {}", cmd, err);
        })
    }

    fn exchange<A: Attribute>(&mut self, mut request: GenlSegment<A>) -> Result<Option<GenlReply>> {
        self.seq = self.seq.wrapping_add(1);
        let seq = self.seq;
        request.header_mut().seq = seq;

        // Nothing is sent unless the whole request encodes.
        let bytes = request.to_bytes()?;
        self.channel.send(&bytes)?;

        let mut reply = None;
        let mut buf = vec![0u8; MAX_MESSAGE_LEN];
        loop {
            let len = self.channel.recv(&mut buf)?;
            if len == 0 {
                return_errno_with_message!(Errno::EIO, "the netlink channel was closed");
            }

            for segment in parse_reply(&buf[..len])? {
                if segment.header().seq != seq {
                    debug!("skipped netlink segment of sequence {}", segment.header().seq);
                    continue;
                }
                match segment {
                    ReplySegment::Genl(genl) => {
                        reply = Some(genl);
                    }
                    ReplySegment::Error(error) if error.is_ack() => return Ok(reply),
                    ReplySegment::Error(error) => {
                        let raw = error.error().saturating_neg();
                        return Err(Error::from_raw(raw, "the kernel rejected the request"));
                    }
                    ReplySegment::Done(_) => return Ok(reply),
                    ReplySegment::Other(_) => {}
                }
            }
        }
    }
}

impl Drop for GenlSession {
    fn drop(&mut self) {
        debug!("closed netlink session of family {}", self.family_id);
    }
}
