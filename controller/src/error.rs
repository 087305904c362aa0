// SPDX-License-Identifier: MPL-2.0

use core::fmt;

use int_to_c_enum::TryFromInt;

/// Error number.
///
/// Only the numbers that opening device nodes, issuing block or NBD ioctls
/// and talking generic netlink can produce are listed. Anything else is
/// reported as [`Errno::EIO`].
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, TryFromInt)]
pub enum Errno {
    EPERM = 1,    /* Operation not permitted */
    ENOENT = 2,   /* No such file or directory */
    EINTR = 4,    /* Interrupted system call */
    EIO = 5,      /* I/O error */
    ENXIO = 6,    /* No such device or address */
    EBADF = 9,    /* Bad file number */
    EAGAIN = 11,  /* Try again */
    ENOMEM = 12,  /* Out of memory */
    EACCES = 13,  /* Permission denied */
    EFAULT = 14,  /* Bad address */
    ENOTBLK = 15, /* Block device required */
    EBUSY = 16,   /* Device or resource busy */
    EEXIST = 17,  /* File exists */
    ENODEV = 19,  /* No such device */
    ENOTDIR = 20, /* Not a directory */
    EISDIR = 21,  /* Is a directory */
    EINVAL = 22,  /* Invalid argument */
    ENFILE = 23,  /* File table overflow */
    EMFILE = 24,  /* Too many open files */
    ENOTTY = 25,  /* Not a typewriter */
    EFBIG = 27,   /* File too large */
    ENOSPC = 28,  /* No space left on device */
    EROFS = 30,   /* Read-only file system */
    ERANGE = 34,  /* Math result not representable */

    ENAMETOOLONG = 36, /* File name too long */
    ENOSYS = 38,       /* Invalid system call number */
    ELOOP = 40,        /* Too many symbolic links encountered */
    ENODATA = 61,      /* No data available */
    ETIME = 62,        /* Timer expired */
    ENOLINK = 67,      /* Link has been severed */
    EPROTO = 71,       /* Protocol error */
    EBADMSG = 74,      /* Not a data message */
    EOVERFLOW = 75,    /* Value too large for defined data type */
    ENOTSOCK = 88,     /* Socket operation on non-socket */
    EMSGSIZE = 90,     /* Message too long */
    EPROTOTYPE = 91,   /* Protocol wrong type for socket */
    ENOPROTOOPT = 92,  /* Protocol not available */
    EPROTONOSUPPORT = 93, /* Protocol not supported */
    EOPNOTSUPP = 95,      /* Operation not supported on transport endpoint */
    EAFNOSUPPORT = 97,    /* Address family not supported by protocol */
    ECONNRESET = 104,     /* Connection reset by peer */
    ENOBUFS = 105,        /* No buffer space available */
    EISCONN = 106,        /* Transport endpoint is already connected */
    ENOTCONN = 107,       /* Transport endpoint is not connected */
    ESHUTDOWN = 108,      /* Cannot send after transport endpoint shutdown */
    ETIMEDOUT = 110,      /* Connection timed out */
    EALREADY = 114,       /* Operation already in progress */
    EINPROGRESS = 115,    /* Operation now in progress */
}

/// error used in this crate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Error {
    errno: Errno,
    msg: Option<&'static str>,
}

impl Error {
    pub const fn new(errno: Errno) -> Self {
        Error { errno, msg: None }
    }

    pub const fn with_message(errno: Errno, msg: &'static str) -> Self {
        Error {
            errno,
            msg: Some(msg),
        }
    }

    /// Creates an error from a raw, positive errno value.
    pub fn from_raw(raw: i32, msg: &'static str) -> Self {
        let errno = Errno::try_from(raw).unwrap_or(Errno::EIO);
        Error::with_message(errno, msg)
    }

    pub const fn error(&self) -> Errno {
        self.errno
    }

    pub const fn message(&self) -> Option<&'static str> {
        self.msg
    }

    /// Returns whether the error asks the caller to fall back to the ioctl interface.
    pub fn is_unsupported(&self) -> bool {
        self.errno == Errno::EPROTONOSUPPORT
    }

    /// Returns the error as a negative return code.
    pub const fn to_return_code(&self) -> i32 {
        -(self.errno as i32)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.msg {
            Some(msg) => write!(f, "{:?}: {}", self.errno, msg),
            None => write!(f, "{:?}", self.errno),
        }
    }
}

impl std::error::Error for Error {}

impl From<Errno> for Error {
    fn from(errno: Errno) -> Self {
        Error::new(errno)
    }
}

impl AsRef<Error> for Error {
    fn as_ref(&self) -> &Error {
        self
    }
}

impl From<nix::Error> for Error {
    fn from(errno: nix::Error) -> Self {
        Error::new(Errno::try_from(errno as i32).unwrap_or(Errno::EIO))
    }
}

impl From<std::io::Error> for Error {
    fn from(io_error: std::io::Error) -> Self {
        let errno = io_error
            .raw_os_error()
            .and_then(|raw| Errno::try_from(raw).ok())
            .unwrap_or(Errno::EIO);
        Error::new(errno)
    }
}

impl From<core::num::ParseIntError> for Error {
    fn from(_: core::num::ParseIntError) -> Self {
        Error::with_message(Errno::EINVAL, "Invalid integer")
    }
}

impl From<int_to_c_enum::TryFromIntError> for Error {
    fn from(_: int_to_c_enum::TryFromIntError) -> Self {
        Error::with_message(Errno::EINVAL, "Invalid enum value")
    }
}

impl From<genl_codec::Error> for Error {
    fn from(codec_error: genl_codec::Error) -> Self {
        match codec_error {
            genl_codec::Error::MessageTooLong | genl_codec::Error::AttributeTooLong => {
                Error::with_message(Errno::EMSGSIZE, "the netlink message cannot be encoded")
            }
            genl_codec::Error::Truncated | genl_codec::Error::InvalidLength => {
                Error::with_message(Errno::EBADMSG, "the netlink message is malformed")
            }
            genl_codec::Error::InvalidAttribute(_) => {
                Error::with_message(Errno::EBADMSG, "the netlink attribute is malformed")
            }
            genl_codec::Error::InvalidString => {
                Error::with_message(Errno::EINVAL, "Invalid netlink string")
            }
        }
    }
}

#[macro_export]
macro_rules! return_errno {
    ($errno: expr) => {
        return Err($crate::error::Error::new($errno))
    };
}

#[macro_export]
macro_rules! return_errno_with_message {
    ($errno: expr, $message: expr) => {
        return Err($crate::error::Error::with_message($errno, $message))
    };
}
