use std::time::Duration;

use clap::{Args, ValueEnum};
use log::debug;

pub use self::platform::{Invocation, Platform};
pub use self::runner::{ExitKind, RunExit, Runner, SystemRunner};

mod platform;
mod runner;

/// No probe process is allowed to run for longer than this, whatever the configuration says.
pub const MAX_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Args, Clone, Debug)]
#[group(id = "binaries")]
pub struct Params {
    /// Path or name of the ping binary
    #[arg(long, default_value = "ping", env = "PING_BIN")]
    pub ping_bin: String,

    /// Path or name of the traceroute binary (Unix platforms)
    #[arg(long, default_value = "traceroute", env = "TRACEROUTE_BIN")]
    pub traceroute_bin: String,

    /// Path or name of the tracert binary (Windows)
    #[arg(long, default_value = "tracert", env = "TRACERT_BIN")]
    pub tracert_bin: String,

    /// Which flavour of command line & output to expect. Detected from the build target if
    /// not given, useful to drive e.g. a Windows-style wrapper script.
    #[arg(long, value_enum, env = "PROBE_PLATFORM")]
    pub platform: Option<PlatformChoice>,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlatformChoice {
    Unix,
    Windows,
}

impl Params {
    /// Resolves the platform once; the result is meant to be kept for the whole process lifetime.
    pub fn to_platform(&self) -> Platform {
        let platform = match self.platform {
            Some(PlatformChoice::Unix) => Platform::unix(&self.ping_bin, &self.traceroute_bin),
            Some(PlatformChoice::Windows) => Platform::windows(&self.ping_bin, &self.tracert_bin),
            None if cfg!(windows) => Platform::windows(&self.ping_bin, &self.tracert_bin),
            None => Platform::unix(&self.ping_bin, &self.traceroute_bin),
        };
        debug!("Using probe platform: {:?}", platform);
        platform
    }
}
