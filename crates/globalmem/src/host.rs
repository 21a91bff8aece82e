//! Host-side registration of a device set.
//!
//! A host hands out device numbers and routes opens on its nodes to a driver. [`CharDevHost`]
//! captures the four calls a driver makes against it; [`Registration`] performs the install and
//! teardown sequence on top of that trait, and [`SimHost`] is an in-process host used by the CLI
//! and tests.

use std::collections::BTreeSet;
use std::fmt;

use thiserror::Error;

use crate::config::DeviceConfig;
use crate::error::{DeviceError, RegistrationError, Result};
use crate::handle::{AccessMode, Handle};
use crate::table::DeviceTable;

/// Bits of a device number used for the minor.
pub const MINOR_BITS: u32 = 20;
/// Number of distinct minors under one major.
pub const MINOR_COUNT: u32 = 1 << MINOR_BITS;
/// Number of distinct majors.
pub const MAJOR_COUNT: u32 = 1 << (32 - MINOR_BITS);

/// Dynamically assigned majors are handed out from this range, highest first.
pub const DYNAMIC_MAJORS: std::ops::RangeInclusive<u32> = 234..=254;

/// A `major:minor` device number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DevNum {
    major: u32,
    minor: u32,
}

impl DevNum {
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    pub const fn major(self) -> u32 {
        self.major
    }

    pub const fn minor(self) -> u32 {
        self.minor
    }
}

impl fmt::Display for DevNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.major, self.minor)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HostError {
    #[error("major {major} is busy")]
    Busy { major: u32 },

    #[error("no free device numbers")]
    NoSpace,

    #[error("device {devno} already registered")]
    AlreadyRegistered { devno: DevNum },

    #[error("device {devno} is outside any reserved range")]
    NotReserved { devno: DevNum },
}

/// Calls a driver makes against the host to publish device nodes.
pub trait CharDevHost {
    /// Reserves `count` consecutive minors starting at `first_minor` under `major`, returning the
    /// major actually used. `major == 0` lets the host choose one.
    fn alloc_region(
        &mut self,
        major: u32,
        first_minor: u32,
        count: u32,
        name: &str,
    ) -> std::result::Result<u32, HostError>;

    /// Makes `devno` visible. It must lie inside a reserved range.
    fn add_device(&mut self, devno: DevNum) -> std::result::Result<(), HostError>;

    fn remove_device(&mut self, devno: DevNum);

    /// Returns a range obtained from [`Self::alloc_region`].
    fn release_region(&mut self, first: DevNum, count: u32);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reservation {
    pub name: String,
    pub first: DevNum,
    pub count: u32,
}

impl Reservation {
    fn contains(&self, devno: DevNum) -> bool {
        devno.major() == self.first.major()
            && devno.minor() >= self.first.minor()
            && devno.minor() - self.first.minor() < self.count
    }
}

/// In-process [`CharDevHost`] with fault injection.
#[derive(Debug, Default)]
pub struct SimHost {
    reservations: Vec<Reservation>,
    nodes: BTreeSet<DevNum>,
    fail_alloc: Option<HostError>,
    fail_add: Option<(usize, HostError)>,
    adds: usize,
}

impl SimHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next [`CharDevHost::alloc_region`] call fail with `err`.
    pub fn fail_next_alloc(&mut self, err: HostError) {
        self.fail_alloc = Some(err);
    }

    /// Makes the `nth` (0-based, counted from now) [`CharDevHost::add_device`] call fail.
    pub fn fail_add_at(&mut self, nth: usize, err: HostError) {
        self.fail_add = Some((self.adds + nth, err));
    }

    pub fn reservations(&self) -> &[Reservation] {
        &self.reservations
    }

    pub fn is_registered(&self, devno: DevNum) -> bool {
        self.nodes.contains(&devno)
    }

    pub fn registered(&self) -> impl Iterator<Item = DevNum> + '_ {
        self.nodes.iter().copied()
    }

    fn major_in_use(&self, major: u32) -> bool {
        self.reservations.iter().any(|r| r.first.major() == major)
    }
}

impl CharDevHost for SimHost {
    fn alloc_region(
        &mut self,
        major: u32,
        first_minor: u32,
        count: u32,
        name: &str,
    ) -> std::result::Result<u32, HostError> {
        if let Some(err) = self.fail_alloc.take() {
            return Err(err);
        }
        let end = u64::from(first_minor) + u64::from(count);
        if count == 0 || end > u64::from(MINOR_COUNT) {
            return Err(HostError::NoSpace);
        }

        let major = if major == 0 {
            DYNAMIC_MAJORS
                .rev()
                .find(|m| !self.major_in_use(*m))
                .ok_or(HostError::NoSpace)?
        } else if major >= MAJOR_COUNT {
            return Err(HostError::NoSpace);
        } else if self.major_in_use(major) {
            return Err(HostError::Busy { major });
        } else {
            major
        };

        self.reservations.push(Reservation {
            name: name.to_owned(),
            first: DevNum::new(major, first_minor),
            count,
        });
        Ok(major)
    }

    fn add_device(&mut self, devno: DevNum) -> std::result::Result<(), HostError> {
        let nth = self.adds;
        self.adds += 1;
        if let Some((at, err)) = self.fail_add.take() {
            if at == nth {
                return Err(err);
            }
            self.fail_add = Some((at, err));
        }

        if !self.reservations.iter().any(|r| r.contains(devno)) {
            return Err(HostError::NotReserved { devno });
        }
        if !self.nodes.insert(devno) {
            return Err(HostError::AlreadyRegistered { devno });
        }
        Ok(())
    }

    fn remove_device(&mut self, devno: DevNum) {
        self.nodes.remove(&devno);
    }

    fn release_region(&mut self, first: DevNum, count: u32) {
        self.reservations
            .retain(|r| !(r.first == first && r.count == count));
    }
}

/// A device set installed on a host.
///
/// Owns the [`DeviceTable`]; dropping the registration removes every node, releases the device
/// numbers and frees the regions, all together.
pub struct Registration<'h, H: CharDevHost> {
    host: &'h mut H,
    table: DeviceTable,
    first: DevNum,
    name: String,
}

impl<'h, H: CharDevHost> Registration<'h, H> {
    /// Allocates device numbers for `cfg.count` instances and publishes one node per instance.
    ///
    /// On any failure every node added so far is removed and the number block is released before
    /// the error is returned.
    pub fn install(
        host: &'h mut H,
        cfg: &DeviceConfig,
    ) -> std::result::Result<Self, RegistrationError> {
        let table = DeviceTable::from_config(cfg)?;
        let count = table.len() as u32;

        let major = host
            .alloc_region(cfg.major, 0, count, &cfg.name)
            .map_err(|err| {
                tracing::error!(name = %cfg.name, %err, "device number allocation failed");
                RegistrationError::AllocRegion(err)
            })?;
        let first = DevNum::new(major, 0);

        for index in 0..count {
            let devno = DevNum::new(major, index);
            if let Err(source) = host.add_device(devno) {
                tracing::error!(name = %cfg.name, %devno, %source, "adding device failed");
                for prior in (0..index).rev() {
                    host.remove_device(DevNum::new(major, prior));
                }
                host.release_region(first, count);
                return Err(RegistrationError::AddDevice {
                    index: index as usize,
                    source,
                });
            }
        }

        tracing::info!(
            name = %cfg.name,
            major,
            count,
            capacity = table.capacity(),
            "installed"
        );
        Ok(Self {
            host,
            table,
            first,
            name: cfg.name.clone(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn major(&self) -> u32 {
        self.first.major()
    }

    pub fn table(&self) -> &DeviceTable {
        &self.table
    }

    pub fn host(&self) -> &H {
        &*self.host
    }

    /// Device number of instance `index`.
    pub fn devno(&self, index: usize) -> Option<DevNum> {
        (index < self.table.len()).then(|| DevNum::new(self.first.major(), index as u32))
    }

    /// Routes an open of node `devno` to its instance.
    pub fn open(&self, devno: DevNum, mode: AccessMode) -> Result<Handle<'_>> {
        if devno.major() != self.first.major() || devno.minor() < self.first.minor() {
            return Err(DeviceError::NoSuchDevice { devno });
        }
        let index = (devno.minor() - self.first.minor()) as usize;
        self.table.open_with(index, mode)
    }
}

impl<H: CharDevHost> Drop for Registration<'_, H> {
    fn drop(&mut self) {
        let count = self.table.len() as u32;
        for minor in 0..count {
            self.host
                .remove_device(DevNum::new(self.first.major(), self.first.minor() + minor));
        }
        self.host.release_region(self.first, count);
        tracing::info!(name = %self.name, major = self.first.major(), "uninstalled");
    }
}

impl<H: CharDevHost> fmt::Debug for Registration<'_, H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("name", &self.name)
            .field("first", &self.first)
            .field("table", &self.table)
            .finish_non_exhaustive()
    }
}
