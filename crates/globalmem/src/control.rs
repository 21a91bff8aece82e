use crate::error::DeviceError;

/// Wire code of the clear command.
pub const MEM_CLEAR: u32 = 0x1;

/// Control commands understood by a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    /// Zero the whole region bound to the handle.
    Clear,
}

impl ControlCommand {
    pub const fn code(self) -> u32 {
        match self {
            ControlCommand::Clear => MEM_CLEAR,
        }
    }
}

impl TryFrom<u32> for ControlCommand {
    type Error = DeviceError;

    fn try_from(code: u32) -> Result<Self, Self::Error> {
        match code {
            MEM_CLEAR => Ok(ControlCommand::Clear),
            _ => Err(DeviceError::UnsupportedCommand { code }),
        }
    }
}

impl From<ControlCommand> for u32 {
    fn from(cmd: ControlCommand) -> Self {
        cmd.code()
    }
}
