#![forbid(unsafe_code)]

// Native-only tool; keep a stub so `--target wasm32-unknown-unknown --workspace` still builds.
#[cfg(target_arch = "wasm32")]
fn main() {}

#[cfg(not(target_arch = "wasm32"))]
mod script;

#[cfg(not(target_arch = "wasm32"))]
mod native {
    use std::fs::File;
    use std::io::{self, BufRead, BufReader, Write};
    use std::path::PathBuf;

    use anyhow::{Context, Result};
    use clap::Parser;
    use globalmem::{DeviceConfig, Registration, SimHost};
    use tracing_subscriber::EnvFilter;

    use crate::script::Session;

    #[derive(Debug, Parser)]
    #[command(about = "Install an in-process globalmem device set and drive it with a script")]
    pub struct Args {
        /// Number of device instances (overrides GLOBALMEM_COUNT).
        #[arg(long)]
        count: Option<usize>,

        /// Capacity of each region in bytes (overrides GLOBALMEM_CAPACITY).
        #[arg(long)]
        capacity: Option<usize>,

        /// Major number to request; 0 picks one dynamically (overrides GLOBALMEM_MAJOR).
        #[arg(long)]
        major: Option<u32>,

        /// Device name reported to the host (overrides GLOBALMEM_NAME).
        #[arg(long)]
        name: Option<String>,

        /// Abort on the first failing command instead of reporting it and continuing.
        #[arg(long)]
        strict: bool,

        /// Script file to run. Reads stdin when omitted or `-`.
        script: Option<PathBuf>,
    }

    pub fn main() -> Result<()> {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_writer(io::stderr)
            .init();

        let args = Args::parse();

        let mut cfg = DeviceConfig::from_env().context("invalid GLOBALMEM_* environment")?;
        if let Some(count) = args.count {
            cfg.count = count;
        }
        if let Some(capacity) = args.capacity {
            cfg.capacity = capacity;
        }
        if let Some(major) = args.major {
            cfg.major = major;
        }
        if let Some(name) = args.name {
            cfg.name = name;
        }

        let input: Box<dyn BufRead> = match &args.script {
            Some(path) if path.as_os_str() != "-" => Box::new(BufReader::new(
                File::open(path)
                    .with_context(|| format!("failed to open script: {}", path.display()))?,
            )),
            _ => Box::new(BufReader::new(io::stdin())),
        };

        let mut host = SimHost::new();
        let reg = Registration::install(&mut host, &cfg).context("failed to install devices")?;
        tracing::info!(
            name = reg.name(),
            major = reg.major(),
            count = reg.table().len(),
            capacity = reg.table().capacity(),
            "device set ready"
        );

        let stdout = io::stdout();
        let mut out = stdout.lock();
        let mut session = Session::new(&reg);
        let mut failures = 0usize;

        for (lineno, line) in input.lines().enumerate() {
            let line = line.context("failed to read script")?;
            if let Err(err) = session.execute(&line, &mut out) {
                if args.strict {
                    out.flush()?;
                    return Err(err.context(format!("line {}", lineno + 1)));
                }
                failures += 1;
                eprintln!("line {}: {err:#}", lineno + 1);
            }
        }
        out.flush()?;

        if failures > 0 {
            tracing::warn!(failures, "script finished with failing commands");
        }
        Ok(())
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn main() -> anyhow::Result<()> {
    native::main()
}
