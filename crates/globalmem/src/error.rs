use thiserror::Error;

use crate::config::ConfigError;
use crate::host::{DevNum, HostError};
use crate::AccessMode;

pub type Result<T> = std::result::Result<T, DeviceError>;

/// Errors returned by device operations on an open [`Handle`](crate::Handle).
///
/// Boundary conditions (zero-length requests, transfers that run into the end of a region) are
/// *not* errors: they complete with a short byte count instead.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("invalid device index {index} (device count {count})")]
    InvalidIndex { index: usize, count: usize },

    #[error("unsupported control command {code:#x}")]
    UnsupportedCommand { code: u32 },

    /// The transfer between caller space and region storage did not complete.
    ///
    /// No bytes were moved and the handle's position is unchanged.
    #[error("copy between caller buffer and device storage failed")]
    CopyFailure,

    #[error("seek target {target} outside device bounds")]
    InvalidSeek { target: i128 },

    #[error("operation not permitted by access mode {mode:?}")]
    AccessDenied { mode: AccessMode },

    #[error("no device registered at {devno}")]
    NoSuchDevice { devno: DevNum },
}

/// Fault raised by a caller-space buffer while bytes are staged in or out of a device.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("bad address in caller buffer")]
pub struct CopyFault;

impl From<CopyFault> for DeviceError {
    fn from(_: CopyFault) -> Self {
        DeviceError::CopyFailure
    }
}

/// Failure to bring up a device set on the host.
///
/// Every variant is reported after the partially-registered set has been fully unwound.
#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("invalid device configuration: {0}")]
    InvalidConfig(#[from] ConfigError),

    #[error("failed to allocate device numbers: {0}")]
    AllocRegion(#[source] HostError),

    #[error("failed to add device {index}: {source}")]
    AddDevice {
        index: usize,
        #[source]
        source: HostError,
    },
}
