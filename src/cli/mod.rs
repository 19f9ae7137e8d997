//! CLI Module
//!
//! Provides the command-line interface:
//! - Argument parsing
//! - Log level selection
//! - Program listing and run report output
//! - Exit codes for automation

pub mod exit_codes;

pub use exit_codes::{CliResult, ExitCodes};

use std::io::Write;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tracing::Level;

use crate::config::{AppConfig, DEFAULT_CONFIG_FILE};
use crate::core::runner::{RunReport, ScriptRunner};
use crate::core::script::Program;

/// Default script file name
pub const DEFAULT_SCRIPT_FILE: &str = "script.txt";

/// Output format for `--list` and the run report
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text
    #[default]
    Text,
    /// JSON format for scripting
    Json,
}

/// Hardware test script runner
#[derive(Parser, Debug)]
#[command(
    name = "uscript",
    version,
    about = "Run line-oriented hardware test scripts against dynamically loaded plugins",
    long_about = None
)]
pub struct Cli {
    /// Script to run
    #[arg(short, long, default_value = DEFAULT_SCRIPT_FILE)]
    pub script: PathBuf,

    /// TOML configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE, env = "USCRIPT_CONFIG")]
    pub config: PathBuf,

    /// Validate the script without loading plugins or running it
    #[arg(long)]
    pub validate_only: bool,

    /// Print the validated program
    #[arg(long)]
    pub list: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Errors only
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,
}

impl Cli {
    /// Default log level selected by `-v` / `-q`
    pub fn log_level(&self) -> Level {
        if self.quiet {
            return Level::ERROR;
        }
        match self.verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    }
}

/// Run the command line and map the outcome to an exit code. The `--list`
/// output goes to `out` before the run starts.
pub fn run(cli: &Cli, out: &mut impl Write) -> CliResult {
    match try_run(cli, out) {
        Ok(output) => CliResult::Success(output),
        Err(e) => {
            tracing::error!("{:#}", e);
            e.into()
        }
    }
}

fn try_run(cli: &Cli, out: &mut impl Write) -> anyhow::Result<Option<String>> {
    let config = AppConfig::load(&cli.config)?;
    let runner = ScriptRunner::new(config).validate_only(cli.validate_only);

    let program = runner.validate(&cli.script)?;
    if cli.list {
        writeln!(out, "{}", render_program(&program, cli.format)?)
            .and_then(|()| out.flush())
            .context("cannot write program listing")?;
    }

    let report = runner.execute(program)?;
    render_report(&report, cli.format).map(Some)
}

/// Listing of a validated program
pub fn render_program(program: &Program, format: OutputFormat) -> anyhow::Result<String> {
    match format {
        OutputFormat::Text => Ok(program.to_string().trim_end().to_string()),
        OutputFormat::Json => {
            serde_json::to_string_pretty(program).context("cannot serialize program listing")
        }
    }
}

/// Summary line or JSON document of a run
pub fn render_report(report: &RunReport, format: OutputFormat) -> anyhow::Result<String> {
    match format {
        OutputFormat::Text if report.validate_only => Ok("Validation OK".to_string()),
        OutputFormat::Text => Ok(format!(
            "Run OK: {} command(s), {} jump(s), {} recovered failure(s), {} detached ({} failed)",
            report.executed,
            report.jumps,
            report.recovered_failures,
            report.detached,
            report.detached_failures
        )),
        OutputFormat::Json => {
            serde_json::to_string_pretty(report).context("cannot serialize run report")
        }
    }
}
