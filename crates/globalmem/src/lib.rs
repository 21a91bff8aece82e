//! Memory-backed character devices.
//!
//! A [`DeviceTable`] holds a fixed number of equally sized, zero-initialized byte regions. Opening
//! an index yields a [`Handle`] with its own stream cursor:
//!
//! - reads and writes start at the cursor and advance it by the number of bytes moved
//! - transfers are clamped to the end of the region; a short count is not an error
//! - the single control command ([`MEM_CLEAR`]) zeroes the region for every handle bound to it
//!
//! [`Registration`] publishes a table on a [`CharDevHost`] and unwinds cleanly on failure.
//!
//! Handles on the same index share storage without locking. See [`region`] for the resulting
//! interleaving guarantees.

#![forbid(unsafe_code)]

mod config;
mod control;
mod error;
mod handle;
pub mod host;
pub mod region;
mod table;
mod uaccess;

pub use config::{ConfigError, DeviceConfig, DEFAULT_CAPACITY, DEFAULT_COUNT, DEFAULT_NAME};
pub use control::{ControlCommand, MEM_CLEAR};
pub use error::{CopyFault, DeviceError, RegistrationError, Result};
pub use handle::{AccessMode, Handle};
pub use host::{CharDevHost, DevNum, HostError, Registration, SimHost};
pub use region::Region;
pub use table::DeviceTable;
pub use uaccess::{UserSliceReader, UserSliceWriter, VecWriter};

#[cfg(all(test, not(target_arch = "wasm32")))]
mod proptests;
