use thiserror::Error;

use crate::host::MINOR_COUNT;

/// Device name reported to the host when none is configured.
pub const DEFAULT_NAME: &str = "globalmem";

/// Per-region capacity in bytes when none is configured.
pub const DEFAULT_CAPACITY: usize = 0x1000;

/// Number of device instances when none is configured.
pub const DEFAULT_COUNT: usize = 1;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for env var {0}")]
    InvalidEnv(&'static str),

    #[error("{0}")]
    Invalid(&'static str),
}

/// Shape of a device set: how many instances, how large each region is, and the identity the
/// host registers them under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceConfig {
    pub name: String,
    pub count: usize,
    pub capacity: usize,
    /// Requested major number; `0` asks the host to pick one.
    pub major: u32,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_NAME.to_owned(),
            count: DEFAULT_COUNT,
            capacity: DEFAULT_CAPACITY,
            major: 0,
        }
    }
}

impl DeviceConfig {
    pub fn new(count: usize, capacity: usize) -> Self {
        Self {
            count,
            capacity,
            ..Self::default()
        }
    }

    /// Read the configuration from `GLOBALMEM_*` environment variables.
    ///
    /// Unset variables keep their defaults; set-but-unparsable ones are an error.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`Self::from_env`], with the variable source supplied by the caller.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        if let Some(name) = lookup("GLOBALMEM_NAME") {
            let name = name.trim();
            if name.is_empty() {
                return Err(ConfigError::InvalidEnv("GLOBALMEM_NAME"));
            }
            cfg.name = name.to_owned();
        }
        if let Some(raw) = lookup("GLOBALMEM_COUNT") {
            cfg.count = parse_usize(&raw).ok_or(ConfigError::InvalidEnv("GLOBALMEM_COUNT"))?;
        }
        if let Some(raw) = lookup("GLOBALMEM_CAPACITY") {
            cfg.capacity =
                parse_usize(&raw).ok_or(ConfigError::InvalidEnv("GLOBALMEM_CAPACITY"))?;
        }
        if let Some(raw) = lookup("GLOBALMEM_MAJOR") {
            cfg.major = parse_usize(&raw)
                .and_then(|v| u32::try_from(v).ok())
                .ok_or(ConfigError::InvalidEnv("GLOBALMEM_MAJOR"))?;
        }

        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.count == 0 {
            return Err(ConfigError::Invalid("device count must be non-zero"));
        }
        if self.count > MINOR_COUNT as usize {
            return Err(ConfigError::Invalid("device count exceeds minor number space"));
        }
        if self.capacity == 0 {
            return Err(ConfigError::Invalid("region capacity must be non-zero"));
        }
        if self.name.is_empty() {
            return Err(ConfigError::Invalid("device name must not be empty"));
        }
        Ok(())
    }
}

/// Parses a decimal or `0x`-prefixed hexadecimal size.
pub(crate) fn parse_usize(raw: &str) -> Option<usize> {
    let raw = raw.trim();
    match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(hex) => usize::from_str_radix(hex, 16).ok(),
        None => raw.parse().ok(),
    }
}
