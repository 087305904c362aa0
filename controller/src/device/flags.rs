// SPDX-License-Identifier: MPL-2.0

use crate::prelude::*;

bitflags! {
    /// The transmission flags that the server announced for an export.
    ///
    /// Bits without a name here are not carried: parse raw flags with
    /// `from_bits_truncate` and the unknown bits are dropped.
    ///
    /// Reference: <https://elixir.bootlin.com/linux/v6.13/source/include/uapi/linux/nbd.h#L45>.
    pub struct ServerFlags: u64 {
        const HAS_FLAGS         = 1 << 0;
        const READ_ONLY         = 1 << 1;
        const SEND_FLUSH        = 1 << 2;
        const SEND_FUA          = 1 << 3;
        const ROTATIONAL        = 1 << 4;
        const SEND_TRIM         = 1 << 5;
        const SEND_WRITE_ZEROES = 1 << 6;
        const CAN_MULTI_CONN    = 1 << 8;
    }
}

impl ServerFlags {
    pub fn is_read_only(&self) -> bool {
        self.contains(Self::READ_ONLY)
    }
}
