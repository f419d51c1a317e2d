use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use clap_verbosity_flag::{InfoLevel, Verbosity};
use flexi_logger::{
    colored_default_format, detailed_format, Cleanup, Criterion, Duplicate, FileSpec, Logger,
    LoggerHandle, Naming, WriteMode,
};
use log::Level;

/// Rotated log files are cut at this size.
const LOG_FILE_BYTES: u64 = 10 * 1024 * 1024;
const LOG_FILES_KEPT: usize = 5;

#[derive(Args, Debug)]
#[group(id = "logging")]
pub struct Params {
    #[clap(flatten)]
    verbose: Verbosity<InfoLevel>,

    /// flexi_logger spec file (TOML), watched for changes while running
    #[arg(long = "log-spec", value_name = "TOML FILE", env = "LOG_SPEC")]
    log_spec_file: Option<PathBuf>,

    /// Write logs to rotated files in this directory. Warnings and errors still go to stderr.
    #[arg(long, value_name = "DIR", env = "LOG_DIR")]
    log_dir: Option<PathBuf>,
}

impl Params {
    fn level(&self) -> Level {
        // log_level() returns None iff verbosity < 0, i.e. being most quiet seems reasonable
        self.verbose.log_level().unwrap_or(Level::Error)
    }
}

pub fn configure_from(params: &Params, binary: &str) -> Result<LoggerHandle> {
    let mut log_builder = Logger::try_with_env_or_str(params.level().to_string())
        .context("Failed to parse logger spec from env RUST_LOG or cli level")?
        .write_mode(WriteMode::Async)
        .format_for_stderr(colored_default_format)
        .format_for_files(detailed_format);

    // stdout carries results as JSON lines, logs never go there
    log_builder = match &params.log_dir {
        Some(dir) => log_builder
            .log_to_file(FileSpec::default().directory(dir).basename(binary))
            .rotate(
                Criterion::Size(LOG_FILE_BYTES),
                Naming::Numbers,
                Cleanup::KeepLogFiles(LOG_FILES_KEPT),
            )
            .duplicate_to_stderr(Duplicate::Warn),
        None => log_builder.log_to_stderr(),
    };

    match &params.log_spec_file {
        Some(specfile_path) => log_builder
            .start_with_specfile(specfile_path)
            .with_context(|| format!("Failed to start logger with specfile {:?}", specfile_path)),
        None => log_builder
            .start()
            .context("Failed to start logger handle w/o specfile"),
    }
}

#[cfg(test)]
mod tests {
    use assertor::*;
    use clap::Parser;

    use super::*;

    #[derive(Parser)]
    struct TestCli {
        #[clap(flatten)]
        logging: Params,
    }

    #[test]
    fn quiet_and_verbose_levels() {
        let quiet = TestCli::parse_from(["test", "-qq"]);
        let default = TestCli::parse_from(["test"]);
        let verbose = TestCli::parse_from(["test", "-vv"]);

        assert_that!(quiet.logging.level()).is_equal_to(Level::Error);
        assert_that!(default.logging.level()).is_equal_to(Level::Info);
        assert_that!(verbose.logging.level()).is_equal_to(Level::Trace);
    }

    #[test]
    fn files_are_opt_in() {
        let cli = TestCli::parse_from(["test", "--log-dir", "/var/log/netdiag"]);

        assert_that!(cli.logging.log_dir).is_equal_to(Some(PathBuf::from("/var/log/netdiag")));
        assert_that!(cli.logging.log_spec_file).is_none();
    }
}
