//! Open sessions on a device instance.

use std::io::SeekFrom;

use crate::control::ControlCommand;
use crate::error::{DeviceError, Result};
use crate::region::Region;
use crate::uaccess::{UserSliceReader, UserSliceWriter};

bitflags::bitflags! {
    /// Access mode a handle was opened with.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct AccessMode: u8 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
        const READ_WRITE = Self::READ.bits() | Self::WRITE.bits();
    }
}

/// A session bound to one region, carrying its own stream cursor.
///
/// The cursor is private to the handle; other handles on the same index see the same bytes but
/// keep independent positions. `0 <= position <= capacity` holds between calls.
///
/// A handle borrows the table it was opened from, so it cannot outlive the device set. Closing
/// consumes it, which makes use-after-close unrepresentable.
#[derive(Debug)]
pub struct Handle<'a> {
    region: &'a Region,
    index: usize,
    position: usize,
    mode: AccessMode,
}

impl<'a> Handle<'a> {
    pub(crate) fn new(region: &'a Region, index: usize, mode: AccessMode) -> Self {
        tracing::debug!(index, ?mode, "device opened");
        Self {
            region,
            index,
            position: 0,
            mode,
        }
    }

    /// Index of the bound device instance.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn mode(&self) -> AccessMode {
        self.mode
    }

    /// Capacity of the bound region.
    pub fn capacity(&self) -> usize {
        self.region.capacity()
    }

    /// Reads up to `buf.len()` bytes at the cursor into `buf`.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.read_to(buf)
    }

    /// Reads up to `dst.len()` bytes at the cursor and hands them to `dst`.
    ///
    /// The request is clamped to the bytes left in the region; a cursor at (or past) the end reads
    /// nothing. If `dst` faults, nothing is reported as read and the cursor stays put.
    pub fn read_to<W>(&mut self, dst: &mut W) -> Result<usize>
    where
        W: UserSliceWriter + ?Sized,
    {
        self.require(AccessMode::READ)?;

        let offset = self.position;
        let Some(range) = self.region.span(offset, dst.len()) else {
            return Ok(0);
        };
        let count = range.len();
        if count == 0 {
            return Ok(0);
        }

        let mut bounce = vec![0u8; count];
        self.region.load(range, &mut bounce);
        if let Err(fault) = dst.write_bytes(&bounce) {
            tracing::warn!(index = self.index, offset, count, "copy to caller failed");
            return Err(fault.into());
        }

        self.position += count;
        tracing::trace!(index = self.index, offset, count, "read");
        Ok(count)
    }

    /// Writes `data` at the cursor, dropping whatever does not fit.
    pub fn write(&mut self, data: &[u8]) -> Result<usize> {
        let mut src = data;
        self.write_from(&mut src)
    }

    /// Writes up to `src.len()` bytes at the cursor.
    ///
    /// Bytes past the end of the region are discarded and the short count is returned; this is
    /// not an error. If `src` faults, the region is untouched and the cursor stays put.
    pub fn write_from<R>(&mut self, src: &mut R) -> Result<usize>
    where
        R: UserSliceReader + ?Sized,
    {
        self.require(AccessMode::WRITE)?;

        let offset = self.position;
        let Some(range) = self.region.span(offset, src.len()) else {
            return Ok(0);
        };
        let count = range.len();
        if count == 0 {
            return Ok(0);
        }

        let mut bounce = vec![0u8; count];
        if let Err(fault) = src.read_bytes(&mut bounce) {
            tracing::warn!(index = self.index, offset, count, "copy from caller failed");
            return Err(fault.into());
        }
        self.region.store(range, &bounce);

        self.position += count;
        tracing::trace!(index = self.index, offset, count, "write");
        Ok(count)
    }

    /// Moves the cursor and returns the new position.
    ///
    /// `SeekFrom::End` is relative to the region capacity. Targets outside `[0, capacity]` are
    /// rejected without moving the cursor.
    pub fn seek(&mut self, pos: SeekFrom) -> Result<usize> {
        let target = match pos {
            SeekFrom::Start(off) => i128::from(off),
            SeekFrom::Current(delta) => self.position as i128 + i128::from(delta),
            SeekFrom::End(delta) => self.capacity() as i128 + i128::from(delta),
        };
        if target < 0 || target > self.capacity() as i128 {
            return Err(DeviceError::InvalidSeek { target });
        }
        self.position = target as usize;
        Ok(self.position)
    }

    /// Runs the control command encoded as `code`.
    ///
    /// Unknown codes fail with [`DeviceError::UnsupportedCommand`] and change nothing.
    pub fn control(&self, code: u32) -> Result<()> {
        let cmd = ControlCommand::try_from(code).inspect_err(|_| {
            tracing::warn!(index = self.index, code, "unsupported control command");
        })?;
        self.command(cmd)
    }

    pub fn command(&self, cmd: ControlCommand) -> Result<()> {
        match cmd {
            ControlCommand::Clear => self.clear(),
        }
    }

    /// Zeroes the bound region. The cursor is left where it is.
    pub fn clear(&self) -> Result<()> {
        self.require(AccessMode::WRITE)?;
        self.region.clear();
        tracing::info!(index = self.index, "device cleared");
        Ok(())
    }

    /// Releases the handle. The region keeps its contents.
    pub fn close(self) {}

    fn require(&self, needed: AccessMode) -> Result<()> {
        if self.mode.contains(needed) {
            Ok(())
        } else {
            Err(DeviceError::AccessDenied { mode: self.mode })
        }
    }
}

impl Drop for Handle<'_> {
    fn drop(&mut self) {
        tracing::debug!(index = self.index, "device released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CopyFault;

    struct FaultingSink;

    impl UserSliceWriter for FaultingSink {
        fn len(&self) -> usize {
            16
        }

        fn write_bytes(&mut self, _data: &[u8]) -> std::result::Result<(), CopyFault> {
            Err(CopyFault)
        }
    }

    #[test]
    fn read_clamps_and_advances() {
        let region = Region::new(8);
        region.store(0..8, &[1, 2, 3, 4, 5, 6, 7, 8]);
        let mut h = Handle::new(&region, 0, AccessMode::READ_WRITE);

        let mut buf = [0u8; 5];
        assert_eq!(h.read(&mut buf).unwrap(), 5);
        assert_eq!(buf, [1, 2, 3, 4, 5]);
        assert_eq!(h.read(&mut buf).unwrap(), 3);
        assert_eq!(&buf[..3], &[6, 7, 8]);
        assert_eq!(h.position(), 8);
        assert_eq!(h.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn cursor_past_end_reads_and_writes_nothing() {
        let region = Region::new(4);
        let mut h = Handle::new(&region, 0, AccessMode::READ_WRITE);
        // Only reachable by constructing the state directly; `seek` refuses it.
        h.position = 5;
        assert_eq!(h.read(&mut [0u8; 4]).unwrap(), 0);
        assert_eq!(h.write(&[1, 2]).unwrap(), 0);
        assert_eq!(h.position(), 5);
        assert_eq!(region.snapshot(), vec![0u8; 4]);
    }

    #[test]
    fn faulting_destination_keeps_cursor() {
        let region = Region::new(32);
        let mut h = Handle::new(&region, 0, AccessMode::READ_WRITE);
        h.seek(SeekFrom::Start(4)).unwrap();
        assert_eq!(h.read_to(&mut FaultingSink), Err(DeviceError::CopyFailure));
        assert_eq!(h.position(), 4);
    }

    #[test]
    fn seek_bounds() {
        let region = Region::new(10);
        let mut h = Handle::new(&region, 0, AccessMode::READ);
        assert_eq!(h.seek(SeekFrom::End(0)).unwrap(), 10);
        assert_eq!(h.seek(SeekFrom::Current(-3)).unwrap(), 7);
        assert_eq!(
            h.seek(SeekFrom::Current(4)),
            Err(DeviceError::InvalidSeek { target: 11 })
        );
        assert_eq!(
            h.seek(SeekFrom::End(-11)),
            Err(DeviceError::InvalidSeek { target: -1 })
        );
        assert_eq!(h.position(), 7);
        assert_eq!(h.seek(SeekFrom::Start(0)).unwrap(), 0);
    }

    #[test]
    fn access_mode_is_enforced() {
        let region = Region::new(4);
        let mut ro = Handle::new(&region, 0, AccessMode::READ);
        assert_eq!(
            ro.write(&[1]),
            Err(DeviceError::AccessDenied {
                mode: AccessMode::READ
            })
        );
        assert!(matches!(ro.clear(), Err(DeviceError::AccessDenied { .. })));

        let mut wo = Handle::new(&region, 0, AccessMode::WRITE);
        assert_eq!(wo.write(&[9]).unwrap(), 1);
        assert!(matches!(
            wo.read(&mut [0u8; 1]),
            Err(DeviceError::AccessDenied { .. })
        ));
        assert_eq!(region.snapshot(), vec![9, 0, 0, 0]);
    }
}
