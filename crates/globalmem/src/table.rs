use crate::config::{ConfigError, DeviceConfig};
use crate::error::{DeviceError, Result};
use crate::handle::{AccessMode, Handle};
use crate::region::Region;

/// The fixed set of device instances.
///
/// All regions are allocated together here and freed together when the table is dropped. Handles
/// borrow the table, so teardown cannot happen while any session is open.
#[derive(Debug)]
pub struct DeviceTable {
    regions: Box<[Region]>,
    capacity: usize,
}

impl DeviceTable {
    /// Builds `count` zeroed regions of `capacity` bytes each.
    pub fn new(count: usize, capacity: usize) -> std::result::Result<Self, ConfigError> {
        Self::from_config(&DeviceConfig::new(count, capacity))
    }

    pub fn from_config(cfg: &DeviceConfig) -> std::result::Result<Self, ConfigError> {
        cfg.validate()?;
        let regions = (0..cfg.count).map(|_| Region::new(cfg.capacity)).collect();
        Ok(Self {
            regions,
            capacity: cfg.capacity,
        })
    }

    /// Number of device instances.
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Per-region capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn region(&self, index: usize) -> Option<&Region> {
        self.regions.get(index)
    }

    /// Opens device `index` for reading and writing.
    pub fn open(&self, index: usize) -> Result<Handle<'_>> {
        self.open_with(index, AccessMode::READ_WRITE)
    }

    pub fn open_with(&self, index: usize, mode: AccessMode) -> Result<Handle<'_>> {
        let region = self.regions.get(index).ok_or(DeviceError::InvalidIndex {
            index,
            count: self.len(),
        })?;
        if mode.is_empty() {
            return Err(DeviceError::AccessDenied { mode });
        }
        Ok(Handle::new(region, index, mode))
    }

    /// Releases `handle`. Equivalent to dropping it.
    pub fn close(&self, handle: Handle<'_>) {
        handle.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_requested_shape() {
        let table = DeviceTable::new(3, 128).unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table.capacity(), 128);
        for i in 0..3 {
            assert_eq!(table.region(i).unwrap().capacity(), 128);
        }
        assert!(table.region(3).is_none());
    }

    #[test]
    fn rejects_degenerate_shapes() {
        assert!(DeviceTable::new(0, 128).is_err());
        assert!(DeviceTable::new(2, 0).is_err());
    }

    #[test]
    fn open_validates_index_and_mode() {
        let table = DeviceTable::new(2, 16).unwrap();
        assert_eq!(
            table.open(2).unwrap_err(),
            DeviceError::InvalidIndex { index: 2, count: 2 }
        );
        assert!(matches!(
            table.open_with(0, AccessMode::empty()),
            Err(DeviceError::AccessDenied { .. })
        ));
        let h = table.open(1).unwrap();
        assert_eq!(h.index(), 1);
        assert_eq!(h.position(), 0);
        table.close(h);
    }
}
