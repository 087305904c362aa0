// SPDX-License-Identifier: MPL-2.0

pub(crate) use std::{
    fmt::Debug,
    fs::File,
    os::fd::{AsFd, AsRawFd, BorrowedFd, RawFd},
    path::{Path, PathBuf},
    sync::Arc,
};

pub(crate) use bitflags::bitflags;
pub(crate) use int_to_c_enum::TryFromInt;
pub(crate) use log::{debug, error, info, warn};

pub(crate) use crate::error::{Errno, Error};
pub(crate) use crate::{Result, return_errno, return_errno_with_message};
