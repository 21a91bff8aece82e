//! Caller-space buffers.
//!
//! Device operations never touch caller memory directly: reads hand bytes to a
//! [`UserSliceWriter`] and writes pull bytes from a [`UserSliceReader`]. Either side may fault, in
//! which case the operation reports [`DeviceError::CopyFailure`](crate::DeviceError::CopyFailure)
//! with no bytes transferred.

use crate::error::CopyFault;

/// Destination of a device read.
pub trait UserSliceWriter {
    /// Maximum number of bytes the destination accepts.
    fn len(&self) -> usize;

    /// Deliver `data` to the caller. `data.len()` never exceeds [`Self::len`].
    fn write_bytes(&mut self, data: &[u8]) -> Result<(), CopyFault>;
}

/// Source of a device write.
pub trait UserSliceReader {
    /// Number of bytes the caller offers.
    fn len(&self) -> usize;

    /// Fill `dst` with the first `dst.len()` bytes offered. `dst.len()` never exceeds
    /// [`Self::len`].
    fn read_bytes(&mut self, dst: &mut [u8]) -> Result<(), CopyFault>;
}

impl UserSliceWriter for [u8] {
    fn len(&self) -> usize {
        <[u8]>::len(self)
    }

    fn write_bytes(&mut self, data: &[u8]) -> Result<(), CopyFault> {
        self.get_mut(..data.len())
            .ok_or(CopyFault)?
            .copy_from_slice(data);
        Ok(())
    }
}

impl UserSliceReader for &[u8] {
    fn len(&self) -> usize {
        <[u8]>::len(*self)
    }

    fn read_bytes(&mut self, dst: &mut [u8]) -> Result<(), CopyFault> {
        dst.copy_from_slice(self.get(..dst.len()).ok_or(CopyFault)?);
        Ok(())
    }
}

/// Growable destination that accepts up to `limit` bytes.
#[derive(Debug, Default)]
pub struct VecWriter {
    buf: Vec<u8>,
    limit: usize,
}

impl VecWriter {
    pub fn with_limit(limit: usize) -> Self {
        Self {
            buf: Vec::new(),
            limit,
        }
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

impl UserSliceWriter for VecWriter {
    fn len(&self) -> usize {
        self.limit - self.buf.len()
    }

    fn write_bytes(&mut self, data: &[u8]) -> Result<(), CopyFault> {
        if data.len() > UserSliceWriter::len(self) {
            return Err(CopyFault);
        }
        self.buf.extend_from_slice(data);
        Ok(())
    }
}
