//! Line-oriented command language for driving an installed device set.
//!
//! ```text
//! open <index> [r|w|rw]     -> handle id
//! write <h> <hex>           -> bytes written
//! fill <h> <byte> <count>   -> bytes written
//! read <h> <len>            -> bytes read, then the bytes as hex
//! seek <h> <pos>            -> new position
//! pos <h>                   -> current position
//! clear <h>
//! ioctl <h> <code>
//! close <h>
//! ```
//!
//! Numbers accept decimal or `0x` hex. Blank lines and lines starting with `#` are ignored.

use std::io::{SeekFrom, Write};

use anyhow::{anyhow, bail, Context, Result};
use globalmem::{
    AccessMode, CharDevHost, CopyFault, DevNum, Handle, Registration, UserSliceReader, VecWriter,
};

pub struct Session<'r, 'h, H: CharDevHost> {
    reg: &'r Registration<'h, H>,
    handles: Vec<Option<Handle<'r>>>,
}

impl<'r, 'h, H: CharDevHost> Session<'r, 'h, H> {
    pub fn new(reg: &'r Registration<'h, H>) -> Self {
        Self {
            reg,
            handles: Vec::new(),
        }
    }

    /// Number of handles currently open.
    pub fn open_handles(&self) -> usize {
        self.handles.iter().filter(|h| h.is_some()).count()
    }

    pub fn execute(&mut self, line: &str, out: &mut dyn Write) -> Result<()> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(());
        }

        let mut words = line.split_whitespace();
        let cmd = words.next().unwrap_or_default();
        let args: Vec<&str> = words.collect();

        match (cmd, args.as_slice()) {
            ("open", [index]) => self.open(index, "rw", out),
            ("open", [index, mode]) => self.open(index, mode, out),
            ("close", [id]) => {
                let handle = self
                    .handles
                    .get_mut(parse_id(id)?)
                    .and_then(Option::take)
                    .ok_or_else(|| anyhow!("no open handle {id}"))?;
                handle.close();
                Ok(())
            }
            ("write", [id, payload]) => {
                let data = hex::decode(payload).context("invalid hex payload")?;
                let n = self.handle(id)?.write(&data)?;
                writeln!(out, "{n}")?;
                Ok(())
            }
            ("fill", [id, byte, count]) => {
                let byte = u8::try_from(parse_number(byte)?).context("fill byte out of range")?;
                let count = usize::try_from(parse_number(count)?).context("count out of range")?;
                let n = self.handle(id)?.write_from(&mut Repeat { byte, len: count })?;
                writeln!(out, "{n}")?;
                Ok(())
            }
            ("read", [id, len]) => {
                let len = usize::try_from(parse_number(len)?).context("length out of range")?;
                let mut dst = VecWriter::with_limit(len);
                let n = self.handle(id)?.read_to(&mut dst)?;
                if n == 0 {
                    writeln!(out, "0")?;
                } else {
                    writeln!(out, "{n} {}", hex::encode(dst.into_inner()))?;
                }
                Ok(())
            }
            ("seek", [id, pos]) => {
                let pos = self.handle(id)?.seek(SeekFrom::Start(parse_number(pos)?))?;
                writeln!(out, "{pos}")?;
                Ok(())
            }
            ("pos", [id]) => {
                let pos = self.handle(id)?.position();
                writeln!(out, "{pos}")?;
                Ok(())
            }
            ("clear", [id]) => {
                self.handle(id)?.clear()?;
                Ok(())
            }
            ("ioctl", [id, code]) => {
                let code = u32::try_from(parse_number(code)?).context("code out of range")?;
                self.handle(id)?.control(code)?;
                Ok(())
            }
            _ => bail!("unrecognized command: {line}"),
        }
    }

    fn open(&mut self, index: &str, mode: &str, out: &mut dyn Write) -> Result<()> {
        let minor = u32::try_from(parse_number(index)?).context("device index out of range")?;
        let mode = parse_mode(mode)?;
        let handle = self.reg.open(DevNum::new(self.reg.major(), minor), mode)?;

        let id = self.handles.len();
        self.handles.push(Some(handle));
        writeln!(out, "{id}")?;
        Ok(())
    }

    fn handle(&mut self, id: &str) -> Result<&mut Handle<'r>> {
        self.handles
            .get_mut(parse_id(id)?)
            .and_then(Option::as_mut)
            .ok_or_else(|| anyhow!("no open handle {id}"))
    }
}

/// `len` copies of `byte`, produced on demand so only the clamped count is ever buffered.
struct Repeat {
    byte: u8,
    len: usize,
}

impl UserSliceReader for Repeat {
    fn len(&self) -> usize {
        self.len
    }

    fn read_bytes(&mut self, dst: &mut [u8]) -> std::result::Result<(), CopyFault> {
        dst.fill(self.byte);
        Ok(())
    }
}

fn parse_id(raw: &str) -> Result<usize> {
    raw.parse()
        .with_context(|| format!("invalid handle id {raw:?}"))
}

fn parse_number(raw: &str) -> Result<u64> {
    let parsed = match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => raw.parse(),
    };
    parsed.with_context(|| format!("invalid number {raw:?}"))
}

fn parse_mode(raw: &str) -> Result<AccessMode> {
    match raw {
        "r" => Ok(AccessMode::READ),
        "w" => Ok(AccessMode::WRITE),
        "rw" => Ok(AccessMode::READ_WRITE),
        _ => bail!("invalid access mode {raw:?} (expected r, w or rw)"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use globalmem::{DeviceConfig, DeviceError, SimHost};

    fn run(session: &mut Session<'_, '_, SimHost>, line: &str) -> Result<String> {
        let mut out = Vec::new();
        session.execute(line, &mut out)?;
        Ok(String::from_utf8(out).unwrap())
    }

    #[test]
    fn write_rewind_read() {
        let mut host = SimHost::new();
        let reg = Registration::install(&mut host, &DeviceConfig::new(2, 8)).unwrap();
        let mut s = Session::new(&reg);

        assert_eq!(run(&mut s, "open 1").unwrap(), "0\n");
        assert_eq!(run(&mut s, "write 0 deadbeef").unwrap(), "4\n");
        assert_eq!(run(&mut s, "pos 0").unwrap(), "4\n");
        assert_eq!(run(&mut s, "seek 0 0").unwrap(), "0\n");
        assert_eq!(run(&mut s, "read 0 0x10").unwrap(), "8 deadbeef00000000\n");
        assert_eq!(run(&mut s, "read 0 1").unwrap(), "0\n");
        assert_eq!(run(&mut s, "fill 0 0xff 3").unwrap(), "0\n");
    }

    #[test]
    fn huge_lengths_are_clamped() {
        let mut host = SimHost::new();
        let reg = Registration::install(&mut host, &DeviceConfig::new(1, 4)).unwrap();
        let mut s = Session::new(&reg);

        run(&mut s, "open 0").unwrap();
        assert_eq!(run(&mut s, "fill 0 0x5a 0xffffffffffff").unwrap(), "4\n");
        assert_eq!(run(&mut s, "fill 0 0x5a 0xffffffffffff").unwrap(), "0\n");
        assert_eq!(run(&mut s, "read 0 0xffffffffffff").unwrap(), "0\n");
        run(&mut s, "seek 0 1").unwrap();
        assert_eq!(
            run(&mut s, "read 0 0xffffffffffff").unwrap(),
            "3 5a5a5a\n"
        );
    }

    #[test]
    fn clear_and_ioctl() {
        let mut host = SimHost::new();
        let reg = Registration::install(&mut host, &DeviceConfig::new(1, 4)).unwrap();
        let mut s = Session::new(&reg);

        run(&mut s, "open 0").unwrap();
        run(&mut s, "open 0 r").unwrap();
        run(&mut s, "fill 0 0xaa 4").unwrap();
        run(&mut s, "ioctl 0 0x1").unwrap();
        assert_eq!(run(&mut s, "read 1 4").unwrap(), "4 00000000\n");

        let err = run(&mut s, "ioctl 0 7").unwrap_err();
        assert_eq!(
            err.downcast_ref::<DeviceError>(),
            Some(&DeviceError::UnsupportedCommand { code: 7 })
        );
        assert!(run(&mut s, "clear 1").is_err());
    }

    #[test]
    fn close_and_bad_input() {
        let mut host = SimHost::new();
        let reg = Registration::install(&mut host, &DeviceConfig::new(1, 4)).unwrap();
        let mut s = Session::new(&reg);

        assert_eq!(run(&mut s, "# comment").unwrap(), "");
        assert_eq!(run(&mut s, "   ").unwrap(), "");
        run(&mut s, "open 0").unwrap();
        assert_eq!(s.open_handles(), 1);
        run(&mut s, "close 0").unwrap();
        assert_eq!(s.open_handles(), 0);

        assert!(run(&mut s, "close 0").is_err());
        assert!(run(&mut s, "read 0 1").is_err());
        assert!(run(&mut s, "open 1").is_err());
        assert!(run(&mut s, "open 0 x").is_err());
        assert!(run(&mut s, "write 1 zz").is_err());
        assert!(run(&mut s, "frobnicate").is_err());
    }
}
