// SPDX-License-Identifier: MPL-2.0

use core::fmt;

/// Errors raised while building or parsing netlink messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The message would grow beyond the limit of the writer.
    MessageTooLong,
    /// The attribute does not fit in the 16-bit length field.
    AttributeTooLong,
    /// The buffer ends before the value being read.
    Truncated,
    /// A header declares a length inconsistent with the bytes around it.
    InvalidLength,
    /// A known attribute carries a payload of the wrong size.
    InvalidAttribute(u16),
    /// A string is not NUL-terminated, contains an inner NUL or is not UTF-8.
    InvalidString,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::MessageTooLong => write!(f, "the netlink message is too long"),
            Error::AttributeTooLong => write!(f, "the netlink attribute is too long"),
            Error::Truncated => write!(f, "the netlink message is truncated"),
            Error::InvalidLength => write!(f, "the netlink message has an invalid length"),
            Error::InvalidAttribute(type_) => {
                write!(f, "the netlink attribute {} has an invalid payload", type_)
            }
            Error::InvalidString => write!(f, "the netlink string attribute is invalid"),
        }
    }
}

pub type Result<T> = core::result::Result<T, Error>;
