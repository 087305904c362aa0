// SPDX-License-Identifier: MPL-2.0

//! Generic netlink messages as seen from user space.
//!
//! A netlink message is a sequence of segments. Each segment starts with a
//! [`CMsgSegHdr`]; segments of a generic netlink family continue with a
//! [`CGenlMsgHdr`] followed by a stream of [attributes].
//!
//! ┌────────────┬─────────────┬────────────┬────────────┬─────┐
//! │ Seg header │ Genl header │ Attribute  │ Attribute  │ ... │
//! └────────────┴─────────────┴────────────┴────────────┴─────┘
//!
//! Every part is aligned to [`NLMSG_ALIGN`] bytes.
//!
//! This crate only builds and parses bytes. Sending them is the job of the
//! caller, which keeps the codec usable in tests without a kernel.
//!
//! [attributes]: attr

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]

extern crate alloc;

pub mod attr;
mod buf;
pub mod ctrl;
mod error;
mod header;
mod segment;

pub use buf::{MAX_MESSAGE_LEN, MessageReader, MessageWriter};
pub use error::{Error, Result};
pub use header::{CGenlMsgHdr, CMsgSegHdr, CSegmentType, MIN_FAMILY_ID, SegHdrCommonFlags};
pub use segment::{ErrorSegment, GenlReply, GenlSegment, ReplySegment, parse_reply};

/// The alignment of segments and attributes.
pub const NLMSG_ALIGN: usize = 4;
