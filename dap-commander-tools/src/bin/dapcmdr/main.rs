mod cmd;
mod config;
mod util;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use crate::config::{Config, Configs};
use crate::util::logging::{setup_logging, LogLevel};

#[derive(clap::Parser)]
#[clap(
    name = "dapcmdr",
    about = "Offline fault analysis for Cortex-M firmware",
    version
)]
struct Cli {
    /// Location for log file
    ///
    /// If no location is specified, log messages are only printed to stderr.
    #[clap(long, global = true, help_heading = "LOG CONFIGURATION")]
    log_file: Option<PathBuf>,
    /// Log level on stderr. Takes precedence over `RUST_LOG` and the configuration.
    #[clap(long, global = true, value_enum, help_heading = "LOG CONFIGURATION")]
    log_level: Option<LogLevel>,
    /// Additional configuration file, applied on top of `dapcmdr.toml`
    #[clap(long, global = true, env = "DAPCMDR_CONFIG")]
    config: Option<PathBuf>,

    #[clap(subcommand)]
    subcommand: Subcommand,
}

impl Cli {
    fn run(self, config: &Config) -> Result<()> {
        match self.subcommand {
            Subcommand::Callgraph(cmd) => cmd.run(config),
            Subcommand::Unwind(cmd) => cmd.run(config),
            Subcommand::Registers(cmd) => cmd.run(),
        }
    }
}

#[derive(clap::Subcommand)]
enum Subcommand {
    /// Print the call graph recovered from a disassembly listing
    Callgraph(cmd::callgraph::Cmd),
    /// Reconstruct a call stack from a stack dump
    Unwind(cmd::unwind::Cmd),
    /// List the core registers
    Registers(cmd::registers::Cmd),
}

fn load_config(extra: Option<PathBuf>) -> Result<Config> {
    let working_dir =
        std::env::current_dir().context("Unable to determine the working directory.")?;

    let mut configs = Configs::new(&working_dir);
    if let Some(extra) = extra {
        configs.merge(extra)?;
    }

    configs.extract()
}

fn main() -> Result<()> {
    let matches = Cli::parse();

    let config = load_config(matches.config.clone()).context("Failed to load configuration.")?;

    let _log_guard = setup_logging(
        matches.log_level,
        matches.log_file.as_deref(),
        &config.general,
    )?;

    matches.run(&config)
}
