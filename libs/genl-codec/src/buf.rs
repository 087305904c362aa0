// SPDX-License-Identifier: MPL-2.0

use alloc::vec::Vec;

use zerocopy::{FromBytes, Immutable, IntoBytes};

use crate::{Error, Result};

/// The maximum length of a message built by [`MessageWriter::new`].
pub const MAX_MESSAGE_LEN: usize = 8192;

/// An append-only buffer that refuses to grow past its limit.
#[derive(Debug)]
pub struct MessageWriter {
    buf: Vec<u8>,
    limit: usize,
}

impl MessageWriter {
    /// Creates a writer limited to [`MAX_MESSAGE_LEN`] bytes.
    pub fn new() -> Self {
        Self::with_limit(MAX_MESSAGE_LEN)
    }

    /// Creates a writer limited to `limit` bytes.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            buf: Vec::new(),
            limit,
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Writes the bytes of a plain value.
    pub fn write_val<T: IntoBytes + Immutable>(&mut self, val: &T) -> Result<()> {
        self.write_bytes(val.as_bytes())
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.reserve(bytes.len())?;
        self.buf.extend_from_slice(bytes);
        Ok(())
    }

    /// Skips `len` bytes, filling them with zeros.
    pub fn skip(&mut self, len: usize) -> Result<()> {
        self.reserve(len)?;
        self.buf.resize(self.buf.len() + len, 0);
        Ok(())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    fn reserve(&self, len: usize) -> Result<()> {
        match self.buf.len().checked_add(len) {
            Some(new_len) if new_len <= self.limit => Ok(()),
            _ => Err(Error::MessageTooLong),
        }
    }
}

impl Default for MessageWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// A cursor over received bytes.
#[derive(Debug, Clone)]
pub struct MessageReader<'a> {
    bytes: &'a [u8],
}

impl<'a> MessageReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    /// Returns the number of bytes left.
    pub fn remain(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Reads a plain value.
    pub fn read_val<T: FromBytes>(&mut self) -> Result<T> {
        let bytes = self.read_bytes(size_of::<T>())?;
        T::read_from_bytes(bytes).map_err(|_| Error::Truncated)
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        if len > self.bytes.len() {
            return Err(Error::Truncated);
        }
        let (head, tail) = self.bytes.split_at(len);
        self.bytes = tail;
        Ok(head)
    }

    /// Splits off a reader for the next `len` bytes.
    ///
    /// Reads from the returned reader can never go past those `len` bytes.
    pub fn split_reader(&mut self, len: usize) -> Result<MessageReader<'a>> {
        self.read_bytes(len).map(MessageReader::new)
    }

    /// Skips at most `len` bytes.
    pub fn skip_some(&mut self, len: usize) {
        let len = len.min(self.bytes.len());
        self.bytes = &self.bytes[len..];
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn writer_enforces_limit() {
        let mut writer = MessageWriter::with_limit(6);
        writer.write_val(&0x1234_5678u32).unwrap();
        assert_eq!(writer.write_val(&0u32), Err(Error::MessageTooLong));
        writer.skip(2).unwrap();
        assert_eq!(writer.as_bytes(), &[0x78, 0x56, 0x34, 0x12, 0, 0]);
        assert_eq!(writer.skip(1), Err(Error::MessageTooLong));
    }

    #[test]
    fn split_reader_is_bounded() {
        let bytes = [1u8, 0, 0, 0, 2, 0, 0, 0];
        let mut reader = MessageReader::new(&bytes);
        let mut first = reader.split_reader(4).unwrap();

        assert_eq!(first.read_val::<u32>().unwrap(), 1);
        assert_eq!(first.read_val::<u8>(), Err(Error::Truncated));
        assert_eq!(reader.read_val::<u32>().unwrap(), 2);
        assert!(reader.is_empty());
    }
}
