//! Convimg - Command-line tool for converting images for TI-84 Plus CE programs

use std::process::ExitCode;

use convimg::cli;

fn main() -> ExitCode {
    cli::run()
}
