//! `sst`: run or validate a stop-signal task session.

mod args;
mod commands;
mod loader;
mod logging;

use std::process::ExitCode;

use clap::Parser;
use sst_experiment::ConfigError;

use crate::args::Cli;
use crate::logging::init_logging;

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.verbose);

    match commands::dispatch(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            if err.downcast_ref::<ConfigError>().is_some() {
                ExitCode::from(2)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}
