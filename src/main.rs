//! uScript - hardware test script runner
//!
//! Validates a line-oriented test script, loads the plugins it declares and
//! executes it. Exits with 0 on success and 1 otherwise.

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;
use uscript_core::cli::{self, Cli};

fn main() -> ExitCode {
    let args = Cli::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(args.log_level().into()))
        .with_target(false)
        .init();

    tracing::info!("Starting {} v{}", uscript_core::NAME, uscript_core::VERSION);

    let result = cli::run(&args, &mut std::io::stdout().lock());
    if let cli::CliResult::Success(Some(output)) = &result {
        println!("{output}");
    }
    result.to_exit_code()
}
